use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use chanmsg_envelope::Envelope;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

#[derive(Serialize)]
struct EnvelopeOutput<'a> {
    kind: &'static str,
    id: &'a str,
    opcode: &'a str,
    payload: &'a serde_json::Value,
    timestamp: String,
}

/// Print one envelope received by the host endpoint.
pub fn print_envelope(envelope: &Envelope, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EnvelopeOutput {
                kind: "envelope-received",
                id: envelope.id.as_str(),
                opcode: envelope.opcode.as_str(),
                payload: &envelope.payload,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "OPCODE", "PAYLOAD"])
                .add_row(vec![
                    envelope.id.to_string(),
                    envelope.opcode.to_string(),
                    envelope.payload.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "id={} opcode={} payload={}",
                envelope.id, envelope.opcode, envelope.payload
            );
        }
        OutputFormat::Raw => {
            print_raw(payload_text(&envelope.payload).as_bytes());
            println!();
        }
    }
}

/// How one acknowledgment-tracked envelope ended.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub id: String,
    pub opcode: String,
    pub status: OutcomeStatus,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Acked,
    Timeout,
    Failed,
}

impl OutcomeStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Acked => "acked",
            Self::Timeout => "timeout",
            Self::Failed => "failed",
        }
    }
}

pub fn print_outcomes(outcomes: &[Outcome], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for outcome in outcomes {
                println!(
                    "{}",
                    serde_json::to_string(outcome).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "OPCODE", "STATUS", "ELAPSED"]);
            for outcome in outcomes {
                table.add_row(vec![
                    outcome.id.clone(),
                    outcome.opcode.clone(),
                    outcome.status.as_str().to_string(),
                    format!("{}ms", outcome.elapsed_ms),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for outcome in outcomes {
                println!(
                    "{} {} {} ({}ms)",
                    outcome.status.as_str(),
                    outcome.opcode,
                    outcome.id,
                    outcome.elapsed_ms
                );
            }
        }
        OutputFormat::Raw => {
            for outcome in outcomes {
                println!("{} {}", outcome.id, outcome.status.as_str());
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Strings print without their JSON quotes.
fn payload_text(payload: &serde_json::Value) -> String {
    match payload {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
