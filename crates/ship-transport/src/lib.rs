//! WebSocket transport for SHIP.
//!
//! SHIP runs over a WebSocket negotiated with the `ship` sub-protocol. This
//! crate provides the socket plumbing only:
//! - [`connect`] dials a server and verifies the sub-protocol
//! - [`ShipListener`] accepts and upgrades incoming connections
//! - [`memory_pair`] wires two endpoints together in memory
//!
//! Everything above (framing, handshake, close protocol) lives in
//! `ship-frame` and `ship-peer`.

pub mod error;
pub mod ws;

pub use error::{Result, TransportError};
pub use ws::{
    connect, memory_pair, memory_pair_with_buffer, socket_config, ClientSocket, MemorySocket,
    ServerSocket, ShipListener, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PAIR_BUFFER, SHIP_SUBPROTOCOL,
};

/// Re-export of the WebSocket message type used on SHIP sockets.
pub use tokio_tungstenite::tungstenite::Message;
/// Re-export of the WebSocket stream type wrapping any duplex byte stream.
pub use tokio_tungstenite::WebSocketStream;
/// Re-export of the underlying WebSocket protocol crate.
pub use tokio_tungstenite::tungstenite;
