use std::net::SocketAddr;

use ship_transport::ShipListener;
use tokio::net::ToSocketAddrs;
use tracing::debug;

use crate::connection::Connection;
use crate::error::Result;
use crate::handshake::{handshake_server, HandshakeConfig};
use crate::transport::Transport;

/// Listens for and accepts SHIP connections.
pub struct PeerListener {
    socket: ShipListener,
    handshake_config: HandshakeConfig,
}

impl PeerListener {
    /// Bind a TCP listener (e.g. `0.0.0.0:4712`).
    pub async fn bind(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<Self> {
        let socket = ShipListener::bind(addr).await?;
        Ok(Self {
            socket,
            handshake_config: HandshakeConfig::default(),
        })
    }

    /// Override handshake config.
    pub fn with_handshake_config(mut self, config: HandshakeConfig) -> Self {
        self.handshake_config = config;
        self
    }

    pub fn handshake_config(&self) -> &HandshakeConfig {
        &self.handshake_config
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    /// Accept the next WebSocket and run the server handshake on it.
    ///
    /// A failed handshake is returned as an error; the listener stays usable.
    pub async fn accept(&self) -> Result<(Connection, SocketAddr)> {
        let (socket, peer) = self.socket.accept().await?;
        debug!(%peer, "websocket accepted");
        let transport = Transport::spawn(socket, self.handshake_config.transport.clone());
        let connection = handshake_server(transport, &self.handshake_config).await?;
        Ok((connection, peer))
    }

    /// Like [`accept`](Self::accept), with a handler fired once when the
    /// accepted connection's transport closes.
    pub async fn accept_with_close_handler<F>(
        &self,
        on_close: F,
    ) -> Result<(Connection, SocketAddr)>
    where
        F: FnOnce() + Send + 'static,
    {
        let (socket, peer) = self.socket.accept().await?;
        debug!(%peer, "websocket accepted");
        let transport = Transport::spawn_with_close_handler(
            socket,
            self.handshake_config.transport.clone(),
            on_close,
        );
        let connection = handshake_server(transport, &self.handshake_config).await?;
        Ok((connection, peer))
    }
}

impl std::fmt::Debug for PeerListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerListener")
            .field("local_addr", &self.local_addr())
            .field("handshake_config", &self.handshake_config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::connector::connect_with_close_handler;
    use crate::handshake::ServiceDetails;

    #[tokio::test]
    async fn accept_exchanges_access_methods_and_closes_once() {
        let server_config = HandshakeConfig {
            local: ServiceDetails::new("EVSE-7"),
            ..HandshakeConfig::default()
        };
        let listener = PeerListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .with_handshake_config(server_config);
        let url = format!("ws://{}/ship/", listener.local_addr());

        let server_closes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&server_closes);
        let server = tokio::spawn(async move {
            let (connection, peer) = listener
                .accept_with_close_handler(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
            assert!(peer.ip().is_loopback());
            assert_eq!(connection.remote_access_methods().id, "CEM-1");
            assert!(connection.read().await.unwrap().is_none());
        });

        let client_closes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&client_closes);
        let client_config = HandshakeConfig {
            local: ServiceDetails::new("CEM-1"),
            ..HandshakeConfig::default()
        };
        let client = connect_with_close_handler(&url, &client_config, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();
        assert_eq!(client.remote_access_methods().id, "EVSE-7");

        client.close().await.unwrap();
        client.close().await.unwrap();
        server.await.unwrap();

        assert_eq!(client_closes.load(Ordering::SeqCst), 1);
        assert_eq!(server_closes.load(Ordering::SeqCst), 1);
    }
}
