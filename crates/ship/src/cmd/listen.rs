use ship_peer::PeerListener;

use crate::cmd::ListenArgs;
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_payload, OutputFormat};

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.service.handshake_config()?;
    let listener = PeerListener::bind(&args.addr)
        .await
        .map_err(|err| peer_error("bind failed", err))?
        .with_handshake_config(config);
    tracing::info!(addr = %listener.local_addr(), "listening");

    let mut printed = 0usize;
    loop {
        let accepted = tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(SUCCESS),
            accepted = listener.accept() => accepted,
        };
        let (connection, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::warn!(error = %err, "connection rejected");
                continue;
            }
        };
        let peer = peer.to_string();
        let remote = connection.remote_access_methods().id.clone();

        loop {
            let read = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    let _ = connection.close().await;
                    return Ok(SUCCESS);
                }
                read = connection.read() => read,
            };
            let payload = match read {
                Ok(Some(payload)) => payload,
                Ok(None) => break,
                Err(err) => return Err(peer_error("receive failed", err)),
            };

            print_payload(&payload, &peer, &remote, format);
            printed = printed.saturating_add(1);

            if let Some(count) = args.count {
                if printed >= count {
                    connection
                        .close()
                        .await
                        .map_err(|err| peer_error("close failed", err))?;
                    return Ok(SUCCESS);
                }
            }
        }
    }
}
