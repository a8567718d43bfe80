mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

/// Dial, serve and inspect SHIP connections from the command line.
#[derive(Parser, Debug)]
#[command(name = "ship", version, about = "SHIP connection CLI")]
struct Cli {
    /// How payloads and reports are printed (default: table on a terminal,
    /// json otherwise).
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log line format on stderr.
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level on stderr (overridden by SHIP_LOG).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let code = match cmd::run(cli.command, format).await {
        Ok(code) => code,
        Err(err) => {
            tracing::debug!(code = err.code, "command failed");
            eprintln!("ship: {err}");
            err.code
        }
    };
    std::process::exit(code);
}
