use serde::de::DeserializeOwned;
use serde_json::value::RawValue;

use crate::codec::{self, RawEntries};
use crate::error::{FrameError, Result};
use crate::frame::MessageType;
use crate::model::{
    AccessMethods, AccessMethodsRequest, ConnectionClose, ConnectionHello, ConnectionPinError,
    ConnectionPinInput, ConnectionPinState, Data, MessageProtocolHandshake,
    MessageProtocolHandshakeError,
};

pub const CONNECTION_HELLO: &str = "connectionHello";
pub const MESSAGE_PROTOCOL_HANDSHAKE: &str = "messageProtocolHandshake";
pub const MESSAGE_PROTOCOL_HANDSHAKE_ERROR: &str = "messageProtocolHandshakeError";
pub const CONNECTION_PIN_STATE: &str = "connectionPinState";
pub const CONNECTION_PIN_INPUT: &str = "connectionPinInput";
pub const CONNECTION_PIN_ERROR: &str = "connectionPinError";
pub const CONNECTION_CLOSE: &str = "connectionClose";
pub const ACCESS_METHODS: &str = "accessMethods";
pub const ACCESS_METHODS_REQUEST: &str = "accessMethodsRequest";
pub const DATA: &str = "data";

/// Any SHIP message body, tagged by its top-level key.
#[derive(Debug, Clone, PartialEq)]
pub enum ShipMessage {
    ConnectionHello(ConnectionHello),
    MessageProtocolHandshake(MessageProtocolHandshake),
    MessageProtocolHandshakeError(MessageProtocolHandshakeError),
    ConnectionPinState(ConnectionPinState),
    ConnectionPinInput(ConnectionPinInput),
    ConnectionPinError(ConnectionPinError),
    ConnectionClose(ConnectionClose),
    AccessMethods(AccessMethods),
    AccessMethodsRequest(AccessMethodsRequest),
    Data(Data),
}

impl ShipMessage {
    /// The top-level wire key naming this message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ShipMessage::ConnectionHello(_) => CONNECTION_HELLO,
            ShipMessage::MessageProtocolHandshake(_) => MESSAGE_PROTOCOL_HANDSHAKE,
            ShipMessage::MessageProtocolHandshakeError(_) => MESSAGE_PROTOCOL_HANDSHAKE_ERROR,
            ShipMessage::ConnectionPinState(_) => CONNECTION_PIN_STATE,
            ShipMessage::ConnectionPinInput(_) => CONNECTION_PIN_INPUT,
            ShipMessage::ConnectionPinError(_) => CONNECTION_PIN_ERROR,
            ShipMessage::ConnectionClose(_) => CONNECTION_CLOSE,
            ShipMessage::AccessMethods(_) => ACCESS_METHODS,
            ShipMessage::AccessMethodsRequest(_) => ACCESS_METHODS_REQUEST,
            ShipMessage::Data(_) => DATA,
        }
    }

    /// The frame type this message travels under.
    pub fn message_type(&self) -> MessageType {
        match self {
            ShipMessage::ConnectionClose(_) => MessageType::End,
            ShipMessage::Data(_) => MessageType::Data,
            _ => MessageType::Control,
        }
    }

    /// Encode as `{"<kind>": [ ...fields... ]}`.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let body = match self {
            ShipMessage::ConnectionHello(m) => codec::to_vec(m)?,
            ShipMessage::MessageProtocolHandshake(m) => codec::to_vec(m)?,
            ShipMessage::MessageProtocolHandshakeError(m) => codec::to_vec(m)?,
            ShipMessage::ConnectionPinState(m) => codec::to_vec(m)?,
            ShipMessage::ConnectionPinInput(m) => codec::to_vec(m)?,
            ShipMessage::ConnectionPinError(m) => codec::to_vec(m)?,
            ShipMessage::ConnectionClose(m) => codec::to_vec(m)?,
            ShipMessage::AccessMethods(m) => codec::to_vec(m)?,
            ShipMessage::AccessMethodsRequest(m) => codec::to_vec(m)?,
            ShipMessage::Data(m) => codec::to_vec(m)?,
        };
        let mut envelope = Vec::with_capacity(body.len() + self.kind().len() + 5);
        envelope.push(b'{');
        envelope.extend_from_slice(&serde_json::to_vec(self.kind())?);
        envelope.push(b':');
        envelope.extend_from_slice(&body);
        envelope.push(b'}');
        Ok(envelope)
    }

    /// Decode a JSON body by dispatching on its single top-level key.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let RawEntries(envelope) = serde_json::from_slice(bytes)?;
        if envelope.len() != 1 {
            return Err(FrameError::UnsupportedMessage(format!(
                "expected exactly one top-level key, got {}",
                envelope.len()
            )));
        }
        let Some((kind, body)) = envelope.into_iter().next() else {
            return Err(FrameError::UnsupportedMessage("empty message".to_string()));
        };

        let message = match kind.as_str() {
            CONNECTION_HELLO => ShipMessage::ConnectionHello(body_of(body)?),
            MESSAGE_PROTOCOL_HANDSHAKE => ShipMessage::MessageProtocolHandshake(body_of(body)?),
            MESSAGE_PROTOCOL_HANDSHAKE_ERROR => {
                ShipMessage::MessageProtocolHandshakeError(body_of(body)?)
            }
            CONNECTION_PIN_STATE => ShipMessage::ConnectionPinState(body_of(body)?),
            CONNECTION_PIN_INPUT => ShipMessage::ConnectionPinInput(body_of(body)?),
            CONNECTION_PIN_ERROR => ShipMessage::ConnectionPinError(body_of(body)?),
            CONNECTION_CLOSE => ShipMessage::ConnectionClose(body_of(body)?),
            ACCESS_METHODS => ShipMessage::AccessMethods(body_of(body)?),
            ACCESS_METHODS_REQUEST => ShipMessage::AccessMethodsRequest(body_of(body)?),
            DATA => ShipMessage::Data(body_of(body)?),
            _ => return Err(FrameError::UnsupportedMessage(kind)),
        };
        Ok(message)
    }
}

fn body_of<T: DeserializeOwned>(body: Box<RawValue>) -> Result<T> {
    codec::from_raw(&body)
}

macro_rules! impl_from_body {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for ShipMessage {
                fn from(value: $variant) -> Self {
                    ShipMessage::$variant(value)
                }
            }
        )*
    };
}

impl_from_body!(
    ConnectionHello,
    MessageProtocolHandshake,
    MessageProtocolHandshakeError,
    ConnectionPinState,
    ConnectionPinInput,
    ConnectionPinError,
    ConnectionClose,
    AccessMethods,
    AccessMethodsRequest,
    Data,
);
