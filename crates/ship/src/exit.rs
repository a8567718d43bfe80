use std::fmt;
use std::io;

use ship_frame::FrameError;
use ship_peer::PeerError;
use ship_transport::{tungstenite, TransportError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

fn websocket_error(context: &str, err: tungstenite::Error) -> CliError {
    match err {
        tungstenite::Error::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        TransportError::Connect { source, .. }
        | TransportError::Accept { source, .. }
        | TransportError::WebSocket(source) => websocket_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::NotAStruct(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Transport(err) => transport_error(context, err),
        PeerError::Frame(err) => frame_error(context, err),
        PeerError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PeerError::Json(err) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        PeerError::PinMismatch | PeerError::RemotePinRequired => {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        PeerError::ProtocolViolation(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        PeerError::Closed | PeerError::Aborted(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}
