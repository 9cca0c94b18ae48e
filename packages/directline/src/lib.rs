//! Direct Line - a session bridge to a Bot Framework bot
//!
//! A conversation is negotiated over REST, the bot's replies arrive over a
//! websocket whose address is only known after negotiation, and messages are
//! posted back over REST. [`Session`] hides that split behind `start`, `send`
//! and `stop` plus four observer notifications.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use directline::{ChannelObserver, Session, SessionEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::new("YOUR_DIRECTLINE_SECRET")?;
//!     session.set_display_name("David");
//!
//!     let (observer, mut events) = ChannelObserver::new();
//!     session.start(Arc::new(observer))?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             SessionEvent::Started => session.send("Bonjour !")?,
//!             SessionEvent::Message(activity) => println!("{}", activity.text),
//!             SessionEvent::Error(error) => eprintln!("{error}"),
//!             SessionEvent::Closed => break,
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
mod error;
mod observer;
pub mod sender;
mod session;
pub mod stream;
pub mod types;

pub use client::{DirectLineClient, NegotiationResult};
pub use config::{BatchDispatch, DEFAULT_DISPLAY_NAME, DEFAULT_ENDPOINT, SessionConfig};
pub use error::{ClientError, SessionError, StreamError};
pub use observer::{ChannelObserver, SessionEvent, SessionObserver};
pub use session::Session;
pub use stream::{StreamEvent, StreamState};
pub use types::{Activity, ActivitySet, Attachment, Identity, OutboundActivity};
