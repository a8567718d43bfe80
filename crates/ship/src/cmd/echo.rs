use std::net::SocketAddr;

use ship_peer::{Connection, PeerError, PeerListener};
use ship_transport::TransportError;

use crate::cmd::EchoArgs;
use crate::exit::{peer_error, CliError, CliResult, SUCCESS};
use crate::output::OutputFormat;

enum AcceptDisposition {
    /// One client failed; keep serving.
    Continue,
    Fatal(CliError),
}

pub async fn run(args: EchoArgs, _format: OutputFormat) -> CliResult<i32> {
    let config = args.service.handshake_config()?;
    let listener = PeerListener::bind(&args.addr)
        .await
        .map_err(|err| peer_error("bind failed", err))?
        .with_handshake_config(config);
    tracing::info!(addr = %listener.local_addr(), "echo server ready");

    loop {
        let accepted = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                return Ok(SUCCESS);
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((connection, peer)) => {
                tokio::spawn(echo_session(connection, peer));
            }
            Err(err) => match classify_accept_error(err) {
                AcceptDisposition::Continue => {}
                AcceptDisposition::Fatal(cli_err) => return Err(cli_err),
            },
        }
    }
}

async fn echo_session(connection: Connection, peer: SocketAddr) {
    let remote = connection.remote_access_methods().id.clone();
    tracing::info!(%peer, remote_access_methods = %remote, "session started");

    loop {
        match connection.read().await {
            Ok(Some(payload)) => {
                tracing::info!(%peer, size = payload.len(), "echoing payload");
                if let Err(err) = connection.write(&payload).await {
                    tracing::warn!(%peer, error = %err, "echo send failed");
                    break;
                }
            }
            Ok(None) => {
                tracing::info!(%peer, "peer closed the session");
                break;
            }
            Err(err) => {
                tracing::warn!(%peer, error = %err, "receive failed");
                break;
            }
        }
    }

    if let Err(err) = connection.close().await {
        tracing::debug!(%peer, error = %err, "close failed");
    }
}

fn classify_accept_error(err: PeerError) -> AcceptDisposition {
    match err {
        PeerError::Transport(TransportError::Io(_)) => {
            AcceptDisposition::Fatal(peer_error("accept failed", err))
        }
        other => {
            tracing::warn!(error = %other, "connection rejected");
            AcceptDisposition::Continue
        }
    }
}
