//! SHIP connection management.
//!
//! Builds on `ship-transport` (WebSocket sockets) and `ship-frame` (framing
//! and message model):
//! - [`Transport`] moves frames over one socket with deadlines, keep-alive
//!   and a two-phase close
//! - [`handshake`] runs the five-phase SHIP handshake over a transport
//! - [`Connection`] exchanges application payloads once the handshake is done
//! - [`connect`] and [`PeerListener`] put the pieces together for TCP peers

pub mod connection;
pub mod connector;
pub mod error;
pub mod handshake;
pub mod listener;
pub mod transport;

pub use connection::{Connection, ConnectionConfig, DEFAULT_READ_TIMEOUT};
pub use connector::{connect, connect_with_close_handler, connect_with_config};
pub use error::{PeerError, Result};
pub use handshake::pin::{PIN_COMPLETE, PIN_RECEIVED, PIN_SENT};
pub use handshake::{
    handshake, handshake_client, handshake_server, HandshakeConfig, HandshakePhase, Role,
    ServiceDetails,
};
pub use listener::PeerListener;
pub use transport::{CloseHandler, Transport, TransportConfig};
