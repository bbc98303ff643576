//! Point-to-point messaging endpoint.
//!
//! A [`Messenger`] establishes a private channel with one remote context and
//! exchanges JSON envelopes over it:
//! - `connect` posts a CONNECT handshake through a broadcast target and binds
//!   its own half of a fresh channel immediately
//! - `wait_for_connection` accepts the first CONNECT that arrives with a port
//! - sends made before a port is bound are buffered and flushed in order
//! - with `ack` enabled, every send resolves only once the peer acknowledges
//!   it, or fails after the configured timeout
//!
//! ```no_run
//! # async fn demo() -> chanmsg_messenger::Result<()> {
//! use chanmsg_messenger::{Messenger, MessengerConfig};
//! use chanmsg_transport::{HostContext, ANY_ORIGIN};
//!
//! let frame_window = HostContext::new("https://frame.example");
//!
//! let frame = Messenger::with_config(MessengerConfig::default().with_ack(true));
//! frame.on_message(|envelope| println!("frame got {}", envelope.payload));
//! frame.wait_for_connection(&frame_window)?;
//!
//! let host = Messenger::with_config(MessengerConfig::default().with_ack(true));
//! host.connect(&frame_window, ANY_ORIGIN)?.await?;
//! host.send("hello").await?;
//! host.close()?.await?;
//! # Ok(())
//! # }
//! ```

mod ack;
pub mod config;
mod connection;
mod dispatch;
pub mod error;
mod messenger;
mod state;
mod stream;

pub use ack::{AckHandle, CloseHandle};
pub use chanmsg_envelope::{Envelope, MessageId, Opcode};
pub use config::MessengerConfig;
pub use connection::ConnectionState;
pub use error::{DeliveryError, MessengerError, Result};
pub use messenger::Messenger;
pub use state::{ErrorHandler, MessageHandler};
pub use stream::MessageStream;
