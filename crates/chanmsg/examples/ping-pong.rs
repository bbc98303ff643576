//! Host and frame endpoints exchanging acknowledged messages in-process.
//!
//! Run with:
//!   cargo run -p chanmsg --example ping-pong

use chanmsg::messenger::Opcode;
use chanmsg::transport::HostContext;
use chanmsg::{Messenger, MessengerConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = MessengerConfig::default().with_ack(true);
    let frame_window = HostContext::new("https://frame.example");

    let frame = Messenger::with_config(config.clone());
    let replies = frame.clone();
    frame.on_message(move |envelope| {
        eprintln!("frame received {}", envelope.payload);
        if envelope.opcode == Opcode::from("demo::ping") {
            let _ = replies.send_with_opcode(envelope.payload.clone(), "demo::pong");
        }
    });
    frame.wait_for_connection(&frame_window)?;

    let host = Messenger::with_config(config);
    let mut pongs = host.subscribe();
    let handshake = host.connect(&frame_window, frame_window.origin())?.await?;
    eprintln!("connected (handshake {})", handshake.id);

    for n in 1..=3 {
        let sent = host.send_with_opcode(n, "demo::ping").await?;
        let pong = pongs.next_envelope().await.ok_or("frame went away")?;
        eprintln!("ping {} acknowledged, pong {}", sent.id, pong.payload);
    }

    let closed = host.close()?.await?;
    eprintln!("closed (close {closed}), frame is {:?}", frame.state());
    Ok(())
}
