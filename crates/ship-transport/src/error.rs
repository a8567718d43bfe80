use std::net::SocketAddr;

use tokio_tungstenite::tungstenite;

/// Errors that can occur while establishing or driving a SHIP socket.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified URL.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        source: tungstenite::Error,
    },

    /// Failed to accept or upgrade an incoming connection.
    #[error("failed to accept connection from {peer}: {source}")]
    Accept {
        peer: SocketAddr,
        source: tungstenite::Error,
    },

    /// An I/O error occurred on the underlying stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A WebSocket protocol error occurred on an established socket.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// The peer did not agree on the "ship" sub-protocol.
    #[error("sub-protocol mismatch (expected \"ship\", got {offered:?})")]
    Subprotocol { offered: Option<String> },
}

pub type Result<T> = std::result::Result<T, TransportError>;
