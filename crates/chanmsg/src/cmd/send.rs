use std::time::Instant;

use chanmsg_envelope::Opcode;
use chanmsg_messenger::{AckHandle, Messenger, MessengerConfig, MessengerError};
use chanmsg_transport::HostContext;
use serde_json::Value;

use crate::cmd::{parse_duration, runtime, SendArgs};
use crate::exit::{messenger_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_outcomes, Outcome, OutcomeStatus, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    if args.count == 0 {
        return Err(CliError::new(USAGE, "--count must be greater than zero"));
    }
    let timeout = parse_duration(&args.endpoint.timeout)?;
    let payload = resolve_payload(&args)?;
    let opcode = args
        .opcode
        .as_deref()
        .map(Opcode::from)
        .unwrap_or(Opcode::Message);
    if opcode.is_control() {
        return Err(CliError::new(
            USAGE,
            format!("{opcode} is reserved for the handshake protocol"),
        ));
    }

    let host_config = MessengerConfig::default()
        .with_ack(true)
        .with_timeout(timeout);
    let frame_config = MessengerConfig::default()
        .with_ack(!args.no_peer_ack)
        .with_timeout(timeout);

    let outcomes = runtime()?.block_on(async move {
        let window = HostContext::new(args.endpoint.frame_origin.as_str());
        let frame = Messenger::with_config(frame_config);
        frame
            .wait_for_connection(&window)
            .map_err(|err| messenger_error("frame setup failed", err))?;

        let host = Messenger::with_config(host_config);
        let started = Instant::now();
        let mut pending: Vec<(Opcode, AckHandle)> = Vec::with_capacity(args.count + 1);
        let handshake = host
            .connect(&window, &args.endpoint.origin)
            .map_err(|err| messenger_error("connect failed", err))?;
        pending.push((Opcode::Connect, handshake));
        for _ in 0..args.count {
            let handle = host.send_with_opcode(payload.clone(), opcode.clone());
            pending.push((opcode.clone(), handle));
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        for (opcode, handle) in pending {
            let id = handle.id().to_string();
            let status = match handle.await {
                Ok(_) => OutcomeStatus::Acked,
                Err(MessengerError::AckTimeout { .. }) => OutcomeStatus::Timeout,
                Err(err) => {
                    tracing::warn!(id = %id, error = %err, "send failed");
                    OutcomeStatus::Failed
                }
            };
            outcomes.push(Outcome {
                id,
                opcode: opcode.to_string(),
                status,
                elapsed_ms: started.elapsed().as_millis(),
            });
        }

        if outcomes.iter().all(|o| o.status == OutcomeStatus::Acked) {
            let close = host
                .close()
                .map_err(|err| messenger_error("close failed", err))?;
            close
                .await
                .map_err(|err| messenger_error("close failed", err))?;
        }
        Ok::<_, CliError>(outcomes)
    })?;

    print_outcomes(&outcomes, format);
    Ok(exit_code(&outcomes))
}

fn exit_code(outcomes: &[Outcome]) -> i32 {
    if outcomes.iter().any(|o| o.status == OutcomeStatus::Failed) {
        FAILURE
    } else if outcomes.iter().any(|o| o.status == OutcomeStatus::Timeout) {
        TIMEOUT
    } else {
        SUCCESS
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Value> {
    if let Some(json) = &args.json {
        return serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")));
    }
    if let Some(data) = &args.data {
        return Ok(Value::from(data.as_str()));
    }
    Ok(Value::Null)
}
