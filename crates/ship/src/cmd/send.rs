use std::fs;

use serde_json::value::RawValue;
use ship_peer::{connect_with_config, ConnectionConfig};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{peer_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS, USAGE};
use crate::output::{print_payload, OutputFormat};

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;

    let mut config = args.service.handshake_config()?;
    config.connection = ConnectionConfig {
        read_timeout: wait_timeout,
    };
    let connection = connect_with_config(&args.url, &config)
        .await
        .map_err(|err| peer_error("connect failed", err))?;

    connection
        .write(payload.get().as_bytes())
        .await
        .map_err(|err| peer_error("send failed", err))?;

    let result = if args.wait {
        match connection.read().await {
            Ok(Some(response)) => {
                let remote = &connection.remote_access_methods().id;
                print_payload(&response, &args.url, remote, format);
                Ok(SUCCESS)
            }
            Ok(None) => Err(CliError::new(
                FAILURE,
                "peer closed the connection before responding",
            )),
            Err(err) => Err(peer_error("receive failed", err)),
        }
    } else {
        Ok(SUCCESS)
    };

    if let Err(err) = connection.close().await {
        tracing::debug!(error = %err, "close failed");
    }
    result
}

/// The payload as JSON text. `--json` and `--file` content is kept verbatim.
fn resolve_payload(args: &SendArgs) -> CliResult<Box<RawValue>> {
    if let Some(json) = &args.json {
        return serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")));
    }
    if let Some(data) = &args.data {
        return serde_json::value::to_raw_value(data)
            .map_err(|err| CliError::new(USAGE, format!("--data not encodable: {err}")));
    }
    if let Some(path) = &args.file {
        let bytes = fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        })?;
        return serde_json::from_slice(&bytes).map_err(|err| {
            CliError::new(
                DATA_INVALID,
                format!("{} is not valid JSON: {err}", path.display()),
            )
        });
    }
    Err(CliError::new(
        USAGE,
        "one of --json, --data or --file is required",
    ))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cmd::Command;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Command,
    }

    fn send_args(extra: &[&str]) -> SendArgs {
        let mut argv = vec!["ship", "send", "ws://127.0.0.1:4712/ship/"];
        argv.extend_from_slice(extra);
        match TestCli::try_parse_from(argv).unwrap().command {
            Command::Send(args) => args,
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn json_payload_is_parsed() {
        let args = send_args(&["--json", r#"{"x": 1.10, "big": 100000000000000000000001}"#]);
        assert_eq!(
            resolve_payload(&args).unwrap().get(),
            r#"{"x": 1.10, "big": 100000000000000000000001}"#
        );
    }

    #[test]
    fn data_payload_becomes_json_string() {
        let args = send_args(&["--data", "hello"]);
        assert_eq!(resolve_payload(&args).unwrap().get(), r#""hello""#);
    }

    #[test]
    fn invalid_json_is_a_usage_error() {
        let args = send_args(&["--json", "{nope"]);
        assert_eq!(resolve_payload(&args).unwrap_err().code, USAGE);
    }

    #[test]
    fn missing_payload_is_a_usage_error() {
        let args = send_args(&[]);
        assert_eq!(resolve_payload(&args).unwrap_err().code, USAGE);
    }

    #[test]
    fn file_payload_must_be_json() {
        let path = std::env::temp_dir().join(format!("ship-send-{}.json", std::process::id()));
        fs::write(&path, "not json").unwrap();
        let args = send_args(&["--file", path.to_str().unwrap()]);
        assert_eq!(resolve_payload(&args).unwrap_err().code, DATA_INVALID);

        fs::write(&path, r#"[1,2]"#).unwrap();
        assert_eq!(resolve_payload(&args).unwrap().get(), "[1,2]");
        let _ = fs::remove_file(&path);
    }
}
