use std::time::Duration;

use ship_transport::tungstenite;

/// Errors that can occur in SHIP peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error (socket, WebSocket).
    #[error("transport error: {0}")]
    Transport(#[from] ship_transport::TransportError),

    /// Frame or message encoding/decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] ship_frame::FrameError),

    /// A bounded wait expired.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The transport is closed; no I/O was attempted.
    #[error("connection closed")]
    Closed,

    /// The peer sent something the current phase does not allow.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A PIN did not match (ours was rejected, or theirs was wrong).
    #[error("pin mismatch")]
    PinMismatch,

    /// The peer requires a PIN and none is configured for it.
    #[error("remote pin required")]
    RemotePinRequired,

    /// The peer aborted the handshake.
    #[error("handshake aborted by peer: {0}")]
    Aborted(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tungstenite::Error> for PeerError {
    fn from(err: tungstenite::Error) -> Self {
        PeerError::Transport(ship_transport::TransportError::WebSocket(err))
    }
}

impl PeerError {
    pub(crate) fn unexpected(kind: &str, expected: &str) -> Self {
        PeerError::ProtocolViolation(format!("unexpected {kind} (expected {expected})"))
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
