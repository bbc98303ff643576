use chanmsg_messenger::{Messenger, MessengerConfig};
use chanmsg_transport::HostContext;
use serde_json::Value;

use crate::cmd::{parse_duration, runtime, EchoArgs};
use crate::exit::{messenger_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_envelope, OutputFormat};

pub fn run(args: EchoArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.endpoint.timeout)?;
    let payloads = resolve_payloads(&args)?;
    let config = MessengerConfig::default()
        .with_ack(args.ack)
        .with_timeout(timeout);

    runtime()?.block_on(async move {
        let window = HostContext::new(args.endpoint.frame_origin.as_str());
        let frame = Messenger::with_config(config.clone());
        let replies = frame.clone();
        frame.on_message(move |envelope| {
            tracing::info!(id = %envelope.id, opcode = %envelope.opcode, "echoing message");
            let _ = replies.send_with_opcode(envelope.payload.clone(), envelope.opcode.clone());
        });
        frame
            .wait_for_connection(&window)
            .map_err(|err| messenger_error("frame setup failed", err))?;

        let host = Messenger::with_config(config);
        host.on_error(|err| tracing::warn!(error = %err, "delivery error"));
        let mut echoes = host.subscribe();

        // Sent before connecting, so they exercise the outbound buffer.
        let sends: Vec<_> = payloads.iter().cloned().map(|p| host.send(p)).collect();
        let handshake = host
            .connect(&window, &args.endpoint.origin)
            .map_err(|err| messenger_error("connect failed", err))?;
        handshake
            .await
            .map_err(|err| messenger_error("handshake failed", err))?;

        for _ in 0..payloads.len() {
            let echo = tokio::time::timeout(timeout, echoes.next_envelope())
                .await
                .map_err(|_| CliError::new(TIMEOUT, "timed out waiting for echo"))?
                .ok_or_else(|| CliError::new(FAILURE, "frame closed before echoing"))?;
            print_envelope(&echo, format);
        }
        for send in sends {
            send.await
                .map_err(|err| messenger_error("send failed", err))?;
        }

        let close = host
            .close()
            .map_err(|err| messenger_error("close failed", err))?;
        let close_id = close
            .await
            .map_err(|err| messenger_error("close failed", err))?;
        tracing::debug!(id = %close_id, frame_state = ?frame.state(), "closed");
        Ok::<_, CliError>(SUCCESS)
    })
}

fn resolve_payloads(args: &EchoArgs) -> CliResult<Vec<Value>> {
    if args.messages.is_empty() {
        return Ok(vec![Value::from("hello")]);
    }
    args.messages
        .iter()
        .map(|message| {
            if args.json {
                serde_json::from_str(message).map_err(|err| {
                    CliError::new(USAGE, format!("message is not valid JSON: {err}"))
                })
            } else {
                Ok(Value::from(message.as_str()))
            }
        })
        .collect()
}
