//! SHIP handshake sequencer.
//!
//! Five phases run in a fixed order over a [`Transport`]:
//!
//! 1. connection mode initialisation (binary Init frame exchange)
//! 2. connection hello (readiness, with optional prolongation)
//! 3. protocol handshake (version and format selection)
//! 4. PIN exchange
//! 5. access methods exchange
//!
//! On success the transport is wrapped in a [`Connection`]. On failure the
//! phase that failed sends its abort message where one exists, the transport
//! is closed, and the error is returned.

pub mod access;
pub mod hello;
pub mod init;
pub mod pin;
pub mod protocol;

use std::fmt;
use std::time::Duration;

use ship_frame::{ConnectionClosePhase, ConnectionHelloPhase, ShipMessage};
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionConfig};
use crate::error::{PeerError, Result};
use crate::transport::{Transport, TransportConfig};

pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HELLO_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_HELLO_PROLONGATION: Duration = Duration::from_secs(60);
pub const DEFAULT_PROTOCOL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PIN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_ACCESS_METHODS_TIMEOUT: Duration = Duration::from_secs(10);

/// Which end of the WebSocket this side is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Opened the WebSocket; sends the Init frame first.
    Client,
    /// Accepted the WebSocket; echoes the Init frame.
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Server => f.write_str("server"),
        }
    }
}

/// Handshake phases, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HandshakePhase {
    Init,
    Hello,
    ProtocolHandshake,
    PinExchange,
    AccessMethods,
}

/// Identity of one side of the handshake.
///
/// For the local side, `pin` is the PIN the peer must present. For the
/// remote side, `pin` is the PIN we present when the peer asks for one.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ServiceDetails {
    /// Empty means "no PIN".
    pub pin: Option<String>,
    pub access_methods: String,
}

impl ServiceDetails {
    pub fn new(access_methods: impl Into<String>) -> Self {
        Self {
            pin: None,
            access_methods: access_methods.into(),
        }
    }

    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }

    /// The configured PIN, treating an empty string as absent.
    pub fn pin(&self) -> Option<&str> {
        self.pin.as_deref().filter(|pin| !pin.is_empty())
    }
}

impl fmt::Debug for ServiceDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("ServiceDetails");
        if let Some(pin) = self.pin() {
            dbg.field("pin", &format_args!("<redacted:{} chars>", pin.len()));
        } else {
            dbg.field("pin", &Option::<String>::None);
        }
        dbg.field("access_methods", &self.access_methods).finish()
    }
}

/// Configuration for the handshake and the connection it produces.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    pub local: ServiceDetails,
    pub remote: ServiceDetails,
    pub init_timeout: Duration,
    /// Initial wait for the peer's ready hello.
    pub hello_timeout: Duration,
    /// Added to the hello deadline each time the peer asks for more time.
    pub hello_prolongation: Duration,
    pub protocol_timeout: Duration,
    pub pin_timeout: Duration,
    pub access_methods_timeout: Duration,
    /// Used by [`connect`](crate::connect) and listeners to start the transport.
    pub transport: TransportConfig,
    pub connection: ConnectionConfig,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            local: ServiceDetails::default(),
            remote: ServiceDetails::default(),
            init_timeout: DEFAULT_INIT_TIMEOUT,
            hello_timeout: DEFAULT_HELLO_TIMEOUT,
            hello_prolongation: DEFAULT_HELLO_PROLONGATION,
            protocol_timeout: DEFAULT_PROTOCOL_TIMEOUT,
            pin_timeout: DEFAULT_PIN_TIMEOUT,
            access_methods_timeout: DEFAULT_ACCESS_METHODS_TIMEOUT,
            transport: TransportConfig::default(),
            connection: ConnectionConfig::default(),
        }
    }
}

/// Run the handshake as the side that opened the WebSocket.
pub async fn handshake_client(
    transport: Transport,
    config: &HandshakeConfig,
) -> Result<Connection> {
    handshake(transport, Role::Client, config).await
}

/// Run the handshake as the side that accepted the WebSocket.
pub async fn handshake_server(
    transport: Transport,
    config: &HandshakeConfig,
) -> Result<Connection> {
    handshake(transport, Role::Server, config).await
}

/// Run all five phases, closing the transport if any of them fails.
pub async fn handshake(
    transport: Transport,
    role: Role,
    config: &HandshakeConfig,
) -> Result<Connection> {
    match run_phases(&transport, role, config).await {
        Ok(remote) => {
            info!(
                transport = transport.id(),
                %role,
                remote_access_methods = %remote.id,
                "ship connection established"
            );
            Ok(Connection::new(transport, remote, config.connection.clone()))
        }
        Err(err) => Err(abandon(&transport, role, err).await),
    }
}

/// Close the transport after a failed phase, unless the peer already did.
async fn abandon(transport: &Transport, role: Role, err: PeerError) -> PeerError {
    warn!(transport = transport.id(), %role, error = %err, "handshake failed");
    if !transport.is_closed() {
        if let Err(close_err) = transport.close().await {
            debug!(error = %close_err, "close after failed handshake");
        }
    }
    err
}

async fn run_phases(
    transport: &Transport,
    role: Role,
    config: &HandshakeConfig,
) -> Result<ship_frame::AccessMethods> {
    enter(transport, role, HandshakePhase::Init);
    init::exchange(transport, role, config.init_timeout).await?;

    enter(transport, role, HandshakePhase::Hello);
    hello::exchange(transport, config.hello_timeout, config.hello_prolongation).await?;

    enter(transport, role, HandshakePhase::ProtocolHandshake);
    protocol::exchange(transport, role, config.protocol_timeout).await?;

    enter(transport, role, HandshakePhase::PinExchange);
    pin::exchange(transport, &config.local, &config.remote, config.pin_timeout).await?;

    enter(transport, role, HandshakePhase::AccessMethods);
    access::exchange(
        transport,
        &config.local,
        &config.remote,
        config.access_methods_timeout,
    )
    .await
}

/// Error for a message the current phase did not expect.
///
/// A close announcement is confirmed and the transport torn down before
/// returning, so the caller's abort path finds it closed.
pub(crate) async fn unexpected(
    transport: &Transport,
    message: &ShipMessage,
    expected: &str,
) -> PeerError {
    match message {
        ShipMessage::ConnectionClose(close) => {
            match close.phase {
                ConnectionClosePhase::Announce => {
                    if let Err(err) = transport.accept_close().await {
                        debug!(transport = transport.id(), error = %err, "close confirm not sent");
                    }
                }
                ConnectionClosePhase::Confirm => transport.shutdown().await,
            }
            PeerError::Aborted("peer closed the connection".to_string())
        }
        ShipMessage::ConnectionPinError(_) => PeerError::PinMismatch,
        ShipMessage::ConnectionHello(hello) if hello.phase == ConnectionHelloPhase::Aborted => {
            PeerError::Aborted("peer aborted connection hello".to_string())
        }
        other => PeerError::unexpected(other.kind(), expected),
    }
}

fn enter(transport: &Transport, role: Role, phase: HandshakePhase) {
    debug!(transport = transport.id(), %role, ?phase, "handshake phase");
}
