use std::time::Duration;

use clap::{Args, Subcommand};
use std::path::PathBuf;

use ship_peer::{HandshakeConfig, ServiceDetails};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod echo;
pub mod info;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and echo every Data payload back.
    Echo(EchoArgs),
    /// Connect and send a single Data payload.
    Send(SendArgs),
    /// Accept connections and print received Data payloads.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Run the handshake against a server and print what was negotiated.
    Info(InfoArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, format).await,
        Command::Send(args) => send::run(args, format).await,
        Command::Listen(args) => listen::run(args, format).await,
        Command::Version(args) => version::run(args),
        Command::Info(args) => info::run(args, format).await,
    }
}

/// Identity and PIN settings shared by every networked subcommand.
#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    /// PIN the peer must present (empty or unset: none).
    #[arg(long, env = "SHIP_PIN", hide_env_values = true)]
    pub pin: Option<String>,
    /// PIN to present when the peer requires one.
    #[arg(long, env = "SHIP_REMOTE_PIN", hide_env_values = true)]
    pub remote_pin: Option<String>,
    /// Local access methods identifier.
    #[arg(long, default_value = "ship-cli")]
    pub access_methods: String,
    /// Expected remote access methods identifier (logged on mismatch).
    #[arg(long)]
    pub remote_access_methods: Option<String>,
    /// Bound for each handshake phase (e.g. 10s, 500ms).
    #[arg(long, default_value = "10s")]
    pub handshake_timeout: String,
}

impl ServiceArgs {
    pub fn handshake_config(&self) -> CliResult<HandshakeConfig> {
        let timeout = parse_duration(&self.handshake_timeout)?;
        let local = ServiceDetails {
            pin: self.pin.clone(),
            access_methods: self.access_methods.clone(),
        };
        let remote = ServiceDetails {
            pin: self.remote_pin.clone(),
            access_methods: self.remote_access_methods.clone().unwrap_or_default(),
        };
        Ok(HandshakeConfig {
            local,
            remote,
            init_timeout: timeout,
            hello_timeout: timeout,
            protocol_timeout: timeout,
            pin_timeout: timeout,
            access_methods_timeout: timeout,
            ..HandshakeConfig::default()
        })
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Address to bind (e.g. 0.0.0.0:4712).
    pub addr: String,
    #[command(flatten)]
    pub service: ServiceArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Server URL (e.g. ws://192.168.1.20:4712/ship/).
    pub url: String,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// String payload, sent as a JSON string.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read a JSON payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for one response payload and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    #[command(flatten)]
    pub service: ServiceArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind (e.g. 0.0.0.0:4712).
    pub addr: String,
    /// Exit after receiving N payloads.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub service: ServiceArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Server URL (e.g. ws://192.168.1.20:4712/ship/).
    pub url: String,
    /// Overall connection timeout, retries included (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    #[command(flatten)]
    pub service: ServiceArgs,
}

/// Parse `150ms`, `5s`, `2m` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    // `ms` must be tried before `m` and `s`.
    let units: [(&str, fn(u64) -> Duration); 3] = [
        ("ms", Duration::from_millis),
        ("m", |minutes| Duration::from_secs(minutes.saturating_mul(60))),
        ("s", Duration::from_secs),
    ];
    let (number, to_duration) = units
        .iter()
        .find_map(|(suffix, unit)| input.strip_suffix(suffix).map(|num| (num, *unit)))
        .unwrap_or((input, Duration::from_secs as fn(u64) -> Duration));

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }
    Ok(to_duration(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ServiceArgs {
        ServiceArgs {
            pin: Some("1234".to_string()),
            remote_pin: None,
            access_methods: "cem".to_string(),
            remote_access_methods: None,
            handshake_timeout: "2s".to_string(),
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("bad").unwrap_err().code, USAGE);
        assert_eq!(parse_duration(" ").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("1h").unwrap_err().code, USAGE);
    }

    #[test]
    fn service_args_build_handshake_config() {
        let config = service().handshake_config().unwrap();
        assert_eq!(config.local.pin(), Some("1234"));
        assert_eq!(config.local.access_methods, "cem");
        assert_eq!(config.remote.pin(), None);
        assert_eq!(config.pin_timeout, Duration::from_secs(2));
        assert_eq!(config.hello_timeout, Duration::from_secs(2));
    }

    #[test]
    fn service_args_reject_bad_timeout() {
        let args = ServiceArgs {
            handshake_timeout: "soon".to_string(),
            ..service()
        };
        assert_eq!(args.handshake_config().unwrap_err().code, USAGE);
    }
}
