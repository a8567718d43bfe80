//! SHIP transport and handshake engine.
//!
//! SHIP establishes and frames connections between energy-management devices
//! (an energy manager and a charging station, say) before a higher-level
//! application protocol exchanges data over them.
//!
//! # Crate Structure
//!
//! - [`transport`]: WebSocket sockets negotiated with the `ship` sub-protocol
//! - [`frame`]: message type byte, JSON wire convention and message model
//! - [`peer`]: frame transport, handshake, close protocol and connections
//!   (behind the `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use ship_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ship_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use ship_peer::*;
}
