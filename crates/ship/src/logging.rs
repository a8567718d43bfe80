use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides `--log-level` with a full filter
/// directive (e.g. `ship_peer=trace,info`).
pub const LOG_ENV: &str = "SHIP_LOG";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Filter directive for `level`. The WebSocket library logs every frame
    /// at debug and below, so it stays at warn unless tracing is requested.
    pub fn directive(self) -> String {
        match self {
            LogLevel::Trace => "trace".to_string(),
            LogLevel::Error => "error".to_string(),
            other => format!("{},tungstenite=warn,tokio_tungstenite=warn", other.as_str()),
        }
    }
}

/// Install the stderr subscriber. Stdout stays reserved for command output.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(level.directive()));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_internals_stay_quiet_below_trace() {
        assert_eq!(
            LogLevel::Debug.directive(),
            "debug,tungstenite=warn,tokio_tungstenite=warn"
        );
        assert_eq!(LogLevel::Trace.directive(), "trace");
        assert_eq!(LogLevel::Error.directive(), "error");
    }

    #[test]
    fn directives_parse() {
        for level in [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            assert!(EnvFilter::try_new(level.directive()).is_ok(), "{level:?}");
        }
    }
}
