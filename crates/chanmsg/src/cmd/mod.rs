use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod echo;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect a host and an echoing frame endpoint and print the echoes.
    Echo(EchoArgs),
    /// Send acknowledged messages to a frame endpoint and report each outcome.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Options shared by commands that stand up a host/frame pair.
#[derive(Args, Debug)]
pub struct EndpointArgs {
    /// Target origin for the CONNECT handshake ("*" or an exact origin).
    #[arg(long, default_value = "*")]
    pub origin: String,
    /// Origin the in-process frame context receives under.
    #[arg(long, default_value = "https://frame.local")]
    pub frame_origin: String,
    /// Acknowledgment timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Messages to send. Default: a single "hello".
    #[arg(value_name = "MESSAGE")]
    pub messages: Vec<String>,
    /// Parse each message as JSON instead of sending it as a string.
    #[arg(long)]
    pub json: bool,
    /// Require acknowledgments on both endpoints.
    #[arg(long)]
    pub ack: bool,
    #[command(flatten)]
    pub endpoint: EndpointArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Number of messages to send.
    #[arg(long, short = 'n', default_value = "1")]
    pub count: usize,
    /// JSON payload.
    #[arg(long, conflicts_with = "data")]
    pub json: Option<String>,
    /// String payload.
    #[arg(long, conflicts_with = "json")]
    pub data: Option<String>,
    /// Application opcode (default: messenger::message).
    #[arg(long)]
    pub opcode: Option<String>,
    /// Run the frame without acknowledgments, so every send times out.
    #[arg(long)]
    pub no_peer_ack: bool,
    #[command(flatten)]
    pub endpoint: EndpointArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Single-threaded runtime driving both in-process endpoints.
pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration(" ").unwrap_err().code, USAGE);
    }
}
