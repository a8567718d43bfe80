use std::net::SocketAddr;

use tokio::io::DuplexStream;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{
    Callback, ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};
use tokio_tungstenite::{
    accept_hdr_async_with_config, connect_async_with_config, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// WebSocket sub-protocol every SHIP socket is negotiated with.
pub const SHIP_SUBPROTOCOL: &str = "ship";

const SUBPROTOCOL_HEADER: &str = "Sec-WebSocket-Protocol";

/// Default buffer size of each direction of an in-memory socket pair.
pub const DEFAULT_PAIR_BUFFER: usize = 64 * 1024;

/// Largest inbound WebSocket message (and frame) accepted on a SHIP socket.
/// SHIP messages are small JSON documents.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Socket limits shared by every SHIP WebSocket.
pub fn socket_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(DEFAULT_MAX_MESSAGE_SIZE);
    config.max_frame_size = Some(DEFAULT_MAX_MESSAGE_SIZE);
    config
}

/// A client-side SHIP socket as returned by [`connect`].
pub type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A server-side SHIP socket as returned by [`ShipListener::accept`].
pub type ServerSocket = WebSocketStream<TcpStream>;

/// One end of an in-memory socket pair, see [`memory_pair`].
pub type MemorySocket = WebSocketStream<DuplexStream>;

/// Accepts TCP connections and upgrades them to SHIP WebSockets.
///
/// The upgrade is refused unless the client offers the `ship` sub-protocol.
/// TLS termination is expected to happen in front of this listener (or in a
/// wrapper stream); certificates are not managed here.
pub struct ShipListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ShipListener {
    /// Bind a TCP listener on `addr`.
    pub async fn bind(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<Self> {
        let display = addr.to_string();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: display.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| TransportError::Bind {
            addr: display,
            source,
        })?;

        info!(%local_addr, "listening for ship connections");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept the next connection and complete the WebSocket upgrade.
    pub async fn accept(&self) -> Result<(ServerSocket, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        debug!(%peer, "accepted tcp connection");

        let socket =
            accept_hdr_async_with_config(stream, SubprotocolCallback, Some(socket_config()))
                .await
                .map_err(|source| TransportError::Accept { peer, source })?;
        debug!(%peer, "websocket upgrade complete");

        Ok((socket, peer))
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

struct SubprotocolCallback;

impl Callback for SubprotocolCallback {
    fn on_request(
        self,
        request: &Request,
        mut response: Response,
    ) -> std::result::Result<Response, ErrorResponse> {
        let offered = request
            .headers()
            .get(SUBPROTOCOL_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");

        if !offers_ship(offered) {
            debug!(offered, "rejecting websocket upgrade without ship sub-protocol");
            let mut error = ErrorResponse::new(Some(format!(
                "client must offer sub-protocol '{SHIP_SUBPROTOCOL}'"
            )));
            *error.status_mut() = StatusCode::BAD_REQUEST;
            return Err(error);
        }

        response.headers_mut().insert(
            SUBPROTOCOL_HEADER,
            HeaderValue::from_static(SHIP_SUBPROTOCOL),
        );
        Ok(response)
    }
}

fn offers_ship(header: &str) -> bool {
    header
        .split(',')
        .any(|protocol| protocol.trim() == SHIP_SUBPROTOCOL)
}

/// Connect to a SHIP server at `url` (e.g. `ws://192.168.1.20:4712/ship/`).
///
/// Fails unless the server selects the `ship` sub-protocol.
pub async fn connect(url: &str) -> Result<ClientSocket> {
    let mut request =
        url.into_client_request()
            .map_err(|source| TransportError::Connect {
                url: url.to_string(),
                source,
            })?;
    request.headers_mut().insert(
        SUBPROTOCOL_HEADER,
        HeaderValue::from_static(SHIP_SUBPROTOCOL),
    );

    let (socket, response) = connect_async_with_config(request, Some(socket_config()), false)
        .await
        .map_err(|source| TransportError::Connect {
            url: url.to_string(),
            source,
        })?;

    let selected = response
        .headers()
        .get(SUBPROTOCOL_HEADER)
        .and_then(|value| value.to_str().ok());
    if selected != Some(SHIP_SUBPROTOCOL) {
        return Err(TransportError::Subprotocol {
            offered: selected.map(str::to_string),
        });
    }

    debug!(url, "connected ship websocket");
    Ok(socket)
}

/// Create two connected in-memory WebSocket endpoints.
///
/// The first element plays the client role, the second the server role.
/// Used to wire two transports back-to-back without a network.
pub async fn memory_pair() -> (MemorySocket, MemorySocket) {
    memory_pair_with_buffer(DEFAULT_PAIR_BUFFER).await
}

/// Create an in-memory socket pair with an explicit per-direction buffer.
pub async fn memory_pair_with_buffer(buffer: usize) -> (MemorySocket, MemorySocket) {
    let (left, right) = tokio::io::duplex(buffer);
    let client = WebSocketStream::from_raw_socket(left, Role::Client, Some(socket_config())).await;
    let server = WebSocketStream::from_raw_socket(right, Role::Server, Some(socket_config())).await;
    (client, server)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offers_ship_in_list() {
        assert!(offers_ship("ship"));
        assert!(offers_ship("foo, ship"));
        assert!(!offers_ship("shipx"));
        assert!(!offers_ship(""));
    }

    #[tokio::test]
    async fn test_listener_accepts_ship_client() {
        let listener = ShipListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ship/", listener.local_addr());

        let server = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let client = connect(&url).await;
        assert!(client.is_ok());
        assert!(server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_listener_rejects_missing_subprotocol() {
        let listener = ShipListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ship/", listener.local_addr());

        let server = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let plain = tokio_tungstenite::connect_async(url.as_str()).await;
        assert!(plain.is_err());
        assert!(matches!(
            server.await.unwrap(),
            Err(TransportError::Accept { .. })
        ));
    }

    #[tokio::test]
    async fn test_bind_invalid_address() {
        let result = ShipListener::bind("256.0.0.1:0").await;
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_memory_pair_exchanges_binary() {
        use futures_util::{SinkExt, StreamExt};
        use tokio_tungstenite::tungstenite::Message;

        let (mut client, mut server) = memory_pair().await;
        client.send(Message::Binary(vec![1, 2, 3])).await.unwrap();

        let received = server.next().await.unwrap().unwrap();
        assert_eq!(received, Message::Binary(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_oversized_message_is_refused() {
        use futures_util::{SinkExt, StreamExt};
        use tokio_tungstenite::tungstenite::error::CapacityError;
        use tokio_tungstenite::tungstenite::{Error, Message};

        let (mut client, mut server) = memory_pair().await;
        // The receiver stops reading at the limit, so the send never finishes.
        let _sender = tokio::spawn(async move {
            let _ = client
                .send(Message::Binary(vec![0; DEFAULT_MAX_MESSAGE_SIZE + 1]))
                .await;
        });

        let received = server.next().await.unwrap();
        assert!(matches!(
            received,
            Err(Error::Capacity(CapacityError::MessageTooLong { .. }))
        ));
    }
}
