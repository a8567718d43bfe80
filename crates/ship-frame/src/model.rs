//! SHIP control and data message bodies.
//!
//! Every type here is encoded with [`crate::codec`]; nested structures are
//! marked with `codec::nested` so they use the same array convention.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::codec::{nested, nested_option};
use crate::error::Result;

/// Protocol identifier carried in every Data header.
pub const PROTOCOL_ID: &str = "ee1.0";

/// The only message format SHIP negotiates.
pub const FORMAT_JSON_UTF8: &str = "JSON-UTF8";

/// The protocol version proposed and selected during the protocol handshake.
pub const PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

/// `connectionPinError` code for a PIN that did not match.
pub const PIN_ERROR_WRONG_PIN: u8 = 1;

fn duration_millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionHelloPhase {
    #[default]
    Pending,
    Ready,
    Aborted,
}

/// `connectionHello`: readiness announcement during the hello phase.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionHello {
    pub phase: ConnectionHelloPhase,
    /// Remaining wait budget in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prolongation_request: Option<bool>,
}

impl ConnectionHello {
    /// `ready` with the given wait budget.
    pub fn ready(waiting: Duration) -> Self {
        Self {
            phase: ConnectionHelloPhase::Ready,
            waiting: Some(duration_millis(waiting)),
            prolongation_request: None,
        }
    }

    /// `pending`, optionally asking the peer for more time.
    pub fn pending(waiting: Duration, prolongation_request: bool) -> Self {
        Self {
            phase: ConnectionHelloPhase::Pending,
            waiting: Some(duration_millis(waiting)),
            prolongation_request: prolongation_request.then_some(true),
        }
    }

    /// `aborted`.
    pub fn aborted() -> Self {
        Self {
            phase: ConnectionHelloPhase::Aborted,
            waiting: None,
            prolongation_request: None,
        }
    }

    /// True if this is a `pending` hello that requests prolongation.
    pub fn requests_prolongation(&self) -> bool {
        self.phase == ConnectionHelloPhase::Pending && self.prolongation_request == Some(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProtocolHandshakeType {
    #[default]
    AnnounceMax,
    Select,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageProtocolFormats {
    pub format: Vec<String>,
}

impl MessageProtocolFormats {
    /// True if `format` is in the list.
    pub fn supports(&self, format: &str) -> bool {
        self.format.iter().any(|candidate| candidate == format)
    }
}

/// `messageProtocolHandshake`: version and format negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageProtocolHandshake {
    pub handshake_type: ProtocolHandshakeType,
    #[serde(with = "nested")]
    pub version: ProtocolVersion,
    #[serde(with = "nested")]
    pub formats: MessageProtocolFormats,
}

impl MessageProtocolHandshake {
    /// The proposal or selection for version 1.0 and `JSON-UTF8`.
    pub fn new(handshake_type: ProtocolHandshakeType) -> Self {
        Self {
            handshake_type,
            version: PROTOCOL_VERSION,
            formats: MessageProtocolFormats {
                format: vec![FORMAT_JSON_UTF8.to_string()],
            },
        }
    }
}

/// Reason code carried by `messageProtocolHandshakeError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum HandshakeErrorCode {
    #[default]
    Rfu,
    Timeout,
    UnexpectedMessage,
    SelectionMismatch,
    Other(u8),
}

impl From<u8> for HandshakeErrorCode {
    fn from(value: u8) -> Self {
        match value {
            0 => HandshakeErrorCode::Rfu,
            1 => HandshakeErrorCode::Timeout,
            2 => HandshakeErrorCode::UnexpectedMessage,
            3 => HandshakeErrorCode::SelectionMismatch,
            other => HandshakeErrorCode::Other(other),
        }
    }
}

impl From<HandshakeErrorCode> for u8 {
    fn from(code: HandshakeErrorCode) -> Self {
        match code {
            HandshakeErrorCode::Rfu => 0,
            HandshakeErrorCode::Timeout => 1,
            HandshakeErrorCode::UnexpectedMessage => 2,
            HandshakeErrorCode::SelectionMismatch => 3,
            HandshakeErrorCode::Other(other) => other,
        }
    }
}

/// `messageProtocolHandshakeError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageProtocolHandshakeError {
    pub error: HandshakeErrorCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PinState {
    Required,
    Optional,
    PinOk,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PinInputPermission {
    Busy,
    #[default]
    Ok,
}

/// `connectionPinState`: what a side requires from its peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionPinState {
    pub pin_state: PinState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_permission: Option<PinInputPermission>,
}

impl ConnectionPinState {
    /// `required`, ready to accept input.
    pub fn required() -> Self {
        Self {
            pin_state: PinState::Required,
            input_permission: Some(PinInputPermission::Ok),
        }
    }

    /// `none`.
    pub fn none() -> Self {
        Self {
            pin_state: PinState::None,
            input_permission: None,
        }
    }
}

/// `connectionPinInput`: a PIN offered to the peer.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPinInput {
    pub pin: String,
}

impl fmt::Debug for ConnectionPinInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPinInput")
            .field("pin", &format_args!("<redacted:{} bytes>", self.pin.len()))
            .finish()
    }
}

/// `connectionPinError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPinError {
    pub error: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionClosePhase {
    #[default]
    Announce,
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionCloseReason {
    Unspecific,
    RemovedConnection,
}

/// `connectionClose`: the two-phase close protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionClose {
    pub phase: ConnectionClosePhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ConnectionCloseReason>,
}

impl ConnectionClose {
    /// `announce`, giving the peer `max_time` to confirm.
    pub fn announce(max_time: Duration) -> Self {
        Self {
            phase: ConnectionClosePhase::Announce,
            max_time: Some(duration_millis(max_time)),
            reason: None,
        }
    }

    /// `confirm`.
    pub fn confirm() -> Self {
        Self {
            phase: ConnectionClosePhase::Confirm,
            max_time: None,
            reason: None,
        }
    }
}

/// `accessMethodsRequest`: carries no fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessMethodsRequest {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DnsSdMdns {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessMethodsDns {
    pub uri: String,
}

/// `accessMethods`: how this node can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessMethods {
    pub id: String,
    #[serde(
        rename = "dnsSd_mDns",
        with = "nested_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub dns_sd_mdns: Option<DnsSdMdns>,
    #[serde(with = "nested_option", skip_serializing_if = "Option::is_none")]
    pub dns: Option<AccessMethodsDns>,
}

impl AccessMethods {
    /// Access methods consisting of the identifier only.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dns_sd_mdns: None,
            dns: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DataHeader {
    pub protocol_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DataExtension {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_id: Option<String>,
    /// Hex-encoded binary content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,
}

/// `data`: the envelope around an opaque application payload.
///
/// The payload is held as raw JSON text and crosses the codec untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Data {
    #[serde(with = "nested")]
    pub header: DataHeader,
    pub payload: Box<RawValue>,
    #[serde(with = "nested_option", skip_serializing_if = "Option::is_none")]
    pub extension: Option<DataExtension>,
}

impl Data {
    /// Wrap `payload` with the `ee1.0` protocol header.
    pub fn new(payload: Box<RawValue>) -> Self {
        Self {
            header: DataHeader {
                protocol_id: PROTOCOL_ID.to_string(),
            },
            payload,
            extension: None,
        }
    }

    /// Wrap encoded JSON bytes after checking they form one JSON value.
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        let raw: Box<RawValue> = serde_json::from_slice(payload)?;
        Ok(Self::new(raw))
    }

    /// Wrap any serializable value.
    pub fn from_value<T: Serialize + ?Sized>(payload: &T) -> Result<Self> {
        Ok(Self::new(serde_json::value::to_raw_value(payload)?))
    }

    /// The payload text exactly as carried on the wire.
    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.get().as_bytes()
    }
}

impl Default for Data {
    fn default() -> Self {
        Self {
            header: DataHeader::default(),
            payload: RawValue::NULL.to_owned(),
            extension: None,
        }
    }
}

impl PartialEq for Data {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
            && self.payload.get() == other.payload.get()
            && self.extension == other.extension
    }
}
