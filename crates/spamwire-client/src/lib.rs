//! # spamwire-client
//!
//! Client transport and wire-protocol engine for the spamd scoring daemon
//! (SPAMC/1.5).
//!
//! ## Features
//!
//! - **Transport resolution**: loopback, a comma-separated host list, or a
//!   Unix socket, with address-family filtering and optional randomization
//! - **Failover**: bounded connect retries across resolved addresses, with
//!   failures classified into exit-code buckets
//! - **Protocol engine**: request framing, status line and header parsing,
//!   body length verification
//! - **BSMTP**: envelope splitting, dot-unstuffing and re-embedding
//! - **Safe fallback**: on failure the original message is passed through
//!   unchanged
//! - **TLS** (rustls) and zlib request compression
//!
//! ## Quick Start
//!
//! ```ignore
//! use spamwire_client::{Command, ConnectionManager, MessageSession, SessionConfig, TransportSpec};
//!
//! #[tokio::main]
//! async fn main() -> spamwire_client::Result<()> {
//!     let config = SessionConfig::builder().command(Command::Check).build()?;
//!     let connections = ConnectionManager::system(
//!         TransportSpec::tcp("spamd1.example.com,spamd2.example.com"),
//!         None,
//!         config.connect_timeout,
//!     )?;
//!
//!     let mut session = MessageSession::new(config, connections);
//!     let outcome = session
//!         .run(&mut tokio::io::stdin(), &mut tokio::io::stdout())
//!         .await?;
//!     println!("spam: {}", outcome.is_spam());
//!     Ok(())
//! }
//! ```
//!
//! ## Session States
//!
//! ```text
//! Idle → Reading → Connecting → Sending → ReceivingHeaders → ReceivingBody → Done
//!                                                                 ↘ Failed(kind)
//! ```
//!
//! ## Modules
//!
//! - [`bsmtp`]: BSMTP envelope handling
//! - [`command`]: request commands and serialization
//! - [`config`]: session configuration
//! - [`connection`]: dialing, retries, TLS and the type-state client
//! - [`handler`]: response header hooks
//! - [`message`]: input and output buffers
//! - [`parser`]: status line and header parser
//! - [`session`]: the per-message state machine
//! - [`transport`]: host resolution and ordering
//! - [`types`]: core protocol types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod bsmtp;
pub mod command;
pub mod config;
pub mod connection;
mod error;
pub mod handler;
pub mod message;
pub mod parser;
pub mod session;
pub mod transport;
pub mod types;

pub use command::{Command, PROTOCOL_VERSION, Request, TellRequest};
pub use config::{InputMode, SessionConfig, SessionConfigBuilder, TlsSettings};
pub use connection::ConnectionManager;
pub use error::{Error, ErrorKind, Result, exit};
pub use handler::{CollectingHook, HeaderHook, LoggingHook, NoopHook};
pub use message::{Message, MessageKind};
pub use session::{MessageSession, Outcome, SessionState};
pub use transport::{AddressFamily, TransportKind, TransportSpec};
pub use types::{MessageClass, TellAck, TellTargets, Verdict};
