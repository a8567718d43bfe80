//! Post-handshake connection facade: application payloads in and out as
//! raw JSON, plus orderly close.
//!
//! Payload bytes are carried verbatim. Number precision, whitespace and key
//! order survive the trip in both directions.

use std::time::Duration;

use bytes::Bytes;
use serde_json::value::RawValue;
use serde_json::Value;
use ship_frame::{AccessMethods, ConnectionClosePhase, Data, ShipMessage, PROTOCOL_ID};
use tracing::{debug, warn};

use crate::error::{PeerError, Result};
use crate::transport::Transport;

/// Default bound for [`Connection::read`].
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Configuration for an established [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub read_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// An established SHIP connection.
#[derive(Debug)]
pub struct Connection {
    transport: Transport,
    remote_access_methods: AccessMethods,
    config: ConnectionConfig,
}

impl Connection {
    pub(crate) fn new(
        transport: Transport,
        remote_access_methods: AccessMethods,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            transport,
            remote_access_methods,
            config,
        }
    }

    /// What the peer reported during the access methods exchange.
    pub fn remote_access_methods(&self) -> &AccessMethods {
        &self.remote_access_methods
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// Next application payload, or `None` once the peer has closed.
    ///
    /// A close announcement is confirmed before returning `None`. Any other
    /// control message is a protocol violation and closes the connection.
    pub async fn read(&self) -> Result<Option<Bytes>> {
        let message = match self.transport.read_message(self.config.read_timeout).await {
            Ok(message) => message,
            Err(PeerError::Closed) => return Ok(None),
            Err(err) => return Err(err),
        };

        match message {
            ShipMessage::Data(data) => {
                if data.header.protocol_id != PROTOCOL_ID {
                    warn!(
                        transport = self.transport.id(),
                        protocol_id = %data.header.protocol_id,
                        "unexpected data protocol id"
                    );
                }
                Ok(Some(Bytes::copy_from_slice(data.payload_bytes())))
            }
            ShipMessage::ConnectionClose(close) => {
                match close.phase {
                    ConnectionClosePhase::Announce => {
                        debug!(transport = self.transport.id(), "peer announced close");
                        if let Err(err) = self.transport.accept_close().await {
                            debug!(
                                transport = self.transport.id(),
                                error = %err,
                                "close confirm not sent"
                            );
                        }
                    }
                    ConnectionClosePhase::Confirm if self.transport.is_closing() => {
                        // Our own close is in progress and this read took its answer.
                        debug!(transport = self.transport.id(), "close confirmed by peer");
                        self.transport.shutdown().await;
                    }
                    ConnectionClosePhase::Confirm => {
                        warn!(transport = self.transport.id(), "unsolicited close confirmation");
                        self.transport.shutdown().await;
                    }
                }
                Ok(None)
            }
            other => {
                let err = PeerError::unexpected(other.kind(), "data");
                self.transport.close().await?;
                Err(err)
            }
        }
    }

    /// Send `payload` (any JSON value, as bytes) in a data envelope.
    ///
    /// The bytes must form one JSON value and are sent unchanged.
    pub async fn write(&self, payload: &[u8]) -> Result<()> {
        let payload: Box<RawValue> = serde_json::from_slice(payload)?;
        self.transport.send(&Data::new(payload).into()).await
    }

    /// Send an already-parsed JSON value in a data envelope.
    pub async fn write_value(&self, payload: &Value) -> Result<()> {
        let payload = serde_json::value::to_raw_value(payload)?;
        self.transport.send(&Data::new(payload).into()).await
    }

    /// Orderly close. Idempotent.
    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}
