use crate::connection::Connection;
use crate::error::Result;
use crate::handshake::{handshake_client, HandshakeConfig};
use crate::transport::Transport;

/// Connect to a SHIP server using default configuration.
pub async fn connect(url: &str) -> Result<Connection> {
    connect_with_config(url, &HandshakeConfig::default()).await
}

/// Open the WebSocket, start a transport and run the client handshake.
pub async fn connect_with_config(url: &str, config: &HandshakeConfig) -> Result<Connection> {
    let socket = ship_transport::connect(url).await?;
    let transport = Transport::spawn(socket, config.transport.clone());
    handshake_client(transport, config).await
}

/// Like [`connect_with_config`], with a handler fired once when the
/// connection's transport closes.
pub async fn connect_with_close_handler<F>(
    url: &str,
    config: &HandshakeConfig,
    on_close: F,
) -> Result<Connection>
where
    F: FnOnce() + Send + 'static,
{
    let socket = ship_transport::connect(url).await?;
    let transport = Transport::spawn_with_close_handler(socket, config.transport.clone(), on_close);
    handshake_client(transport, config).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::PeerError;
    use crate::handshake::ServiceDetails;
    use crate::listener::PeerListener;

    #[tokio::test]
    async fn connect_convenience() {
        let listener = PeerListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ship/", listener.local_addr());

        let server = tokio::spawn(async move {
            let (connection, _) = listener.accept().await.unwrap();
            let payload = connection.read().await.unwrap().unwrap();
            connection.write(&payload).await.unwrap();
            assert!(connection.read().await.unwrap().is_none());
        });

        let client = connect(&url).await.unwrap();
        client.write(br#"{"hello":"ship"}"#).await.unwrap();
        let echoed = client.read().await.unwrap().unwrap();
        assert_eq!(echoed.as_ref(), br#"{"hello":"ship"}"#);
        client.close().await.unwrap();

        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_reports_pin_mismatch() {
        let server_config = HandshakeConfig {
            local: ServiceDetails::new("EVSE-7").with_pin("2468"),
            pin_timeout: Duration::from_secs(2),
            ..HandshakeConfig::default()
        };
        let listener = PeerListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .with_handshake_config(server_config);
        let url = format!("ws://{}/ship/", listener.local_addr());

        let server = tokio::spawn(async move { listener.accept().await });

        let client_config = HandshakeConfig {
            remote: ServiceDetails::default().with_pin("1357"),
            ..HandshakeConfig::default()
        };
        assert!(connect_with_config(&url, &client_config).await.is_err());
        assert!(matches!(
            server.await.unwrap().unwrap_err(),
            PeerError::PinMismatch
        ));
    }

    #[tokio::test]
    async fn connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect(&format!("ws://{addr}/ship/")).await.unwrap_err();
        assert!(matches!(err, PeerError::Transport(_)));
    }
}
