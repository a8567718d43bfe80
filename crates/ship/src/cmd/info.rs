use std::time::{Duration, Instant};

use serde::Serialize;
use ship_frame::{FORMAT_JSON_UTF8, PROTOCOL_ID, PROTOCOL_VERSION};
use ship_peer::{connect_with_config, Connection, HandshakeConfig, PeerError};
use ship_transport::{tungstenite, TransportError};

use crate::cmd::{parse_duration, InfoArgs};
use crate::exit::{peer_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct InfoOutput {
    url: String,
    remote_access_methods: String,
    remote_dns_uri: Option<String>,
    protocol_version: String,
    message_format: &'static str,
    data_protocol_id: &'static str,
    handshake_ms: f64,
    connected: bool,
}

pub async fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let config = args.service.handshake_config()?;

    let started = Instant::now();
    let connection = connect_with_timeout(&args.url, &config, timeout).await?;
    let handshake_ms = (started.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0;

    let remote = connection.remote_access_methods();
    let out = InfoOutput {
        url: args.url.clone(),
        remote_access_methods: remote.id.clone(),
        remote_dns_uri: remote.dns.as_ref().map(|dns| dns.uri.clone()),
        protocol_version: PROTOCOL_VERSION.to_string(),
        message_format: FORMAT_JSON_UTF8,
        data_protocol_id: PROTOCOL_ID,
        handshake_ms,
        connected: true,
    };

    if let Err(err) = connection.close().await {
        tracing::debug!(error = %err, "close failed");
    }
    print_info(&out, format);
    Ok(SUCCESS)
}

async fn connect_with_timeout(
    url: &str,
    config: &HandshakeConfig,
    timeout: Duration,
) -> CliResult<Connection> {
    let start = Instant::now();
    loop {
        match connect_with_config(url, config).await {
            Ok(connection) => return Ok(connection),
            Err(err) => {
                if !is_retryable_connect_error(&err) {
                    return Err(peer_error("connect failed", err));
                }
                if start.elapsed() >= timeout {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("connect timed out after {timeout:?}"),
                    ));
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

fn is_retryable_connect_error(err: &PeerError) -> bool {
    match err {
        PeerError::Transport(TransportError::Connect {
            source: tungstenite::Error::Io(source),
            ..
        }) => source.kind() == std::io::ErrorKind::ConnectionRefused,
        _ => false,
    }
}

fn print_info(out: &InfoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Connection Info:");
            println!("  URL:              {}", out.url);
            println!("  Access methods:   {}", out.remote_access_methods);
            match &out.remote_dns_uri {
                Some(uri) => println!("  DNS URI:          {uri}"),
                None => println!("  DNS URI:          unavailable"),
            }
            println!(
                "  Protocol:         SHIP {} ({})",
                out.protocol_version, out.message_format
            );
            println!("  Data protocol:    {}", out.data_protocol_id);
            println!("  Handshake:        {:.2}ms", out.handshake_ms);
        }
        OutputFormat::Raw => {
            println!("{}", out.remote_access_methods);
        }
    }
}
