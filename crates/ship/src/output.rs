use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

/// Longest payload preview shown in a table cell.
const PREVIEW_CHARS: usize = 72;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    /// One JSON record per line.
    Json,
    Table,
    /// Indented payload under a one-line summary.
    Pretty,
    /// Payload bytes exactly as received.
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One received Data payload, as emitted by `--format json`.
#[derive(Serialize)]
struct PayloadRecord<'a> {
    peer: &'a str,
    remote_access_methods: &'a str,
    payload_size: usize,
    payload: Value,
    received_at: u64,
}

/// Print one received Data payload.
pub fn print_payload(
    payload: &[u8],
    peer: &str,
    remote_access_methods: &str,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let record = PayloadRecord {
                peer,
                remote_access_methods,
                payload_size: payload.len(),
                payload: parse_payload(payload),
                received_at: unix_seconds(),
            };
            match serde_json::to_string(&record) {
                Ok(line) => println!("{line}"),
                Err(err) => tracing::warn!(error = %err, "payload record not printed"),
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "ACCESS METHODS", "BYTES", "PAYLOAD"])
                .add_row(vec![
                    peer.to_string(),
                    remote_access_methods.to_string(),
                    payload.len().to_string(),
                    preview(payload, PREVIEW_CHARS),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{peer} ({remote_access_methods}), {} bytes:",
                payload.len()
            );
            let body = serde_json::to_string_pretty(&parse_payload(payload))
                .unwrap_or_else(|_| String::from_utf8_lossy(payload).into_owned());
            println!("{body}");
        }
        OutputFormat::Raw => {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(payload);
            let _ = out.write_all(b"\n");
            let _ = out.flush();
        }
    }
}

/// Payloads are JSON by construction; anything else is shown as text.
fn parse_payload(payload: &[u8]) -> Value {
    serde_json::from_slice(payload)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()))
}

fn preview(payload: &[u8], max_chars: usize) -> String {
    let text = String::from_utf8_lossy(payload);
    if text.chars().count() <= max_chars {
        return text.into_owned();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn short_payload_preview_is_unchanged() {
        assert_eq!(preview(br#"{"x":1}"#, 72), r#"{"x":1}"#);
    }

    #[test]
    fn long_payload_preview_is_cut() {
        let long = format!(r#"{{"blob":"{}"}}"#, "a".repeat(100));
        let cut = preview(long.as_bytes(), 10);
        assert_eq!(cut.chars().count(), 10);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn payload_parses_as_json_when_possible() {
        assert_eq!(parse_payload(br#"{"x":1}"#), json!({"x": 1}));
        assert_eq!(parse_payload(b"not json"), json!("not json"));
    }

    #[test]
    fn record_serialises_payload_inline() {
        let record = PayloadRecord {
            peer: "127.0.0.1:4712",
            remote_access_methods: "EVSE-7",
            payload_size: 7,
            payload: json!({"x": 1}),
            received_at: 0,
        };
        let value: Value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["payload"]["x"], 1);
        assert_eq!(value["remote_access_methods"], "EVSE-7");
    }
}
