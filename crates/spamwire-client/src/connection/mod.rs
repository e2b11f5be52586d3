//! spamd connection handling.
//!
//! - [`timeout`]: deadline-guarded read, write and connect
//! - [`Dialer`]: opening TCP and Unix sockets
//! - [`ConnectionManager`]: address iteration, retries, error
//!   classification and TLS wrapping
//! - [`FramedStream`]: line and body framing of responses
//! - [`Client`]: the type-state request/response exchange

mod client;
mod dialer;
mod framed;
mod manager;
mod stream;
pub mod timeout;

pub use client::{Client, HeadRead, Ready, ResponseHead, Sent, Stream};
pub use dialer::{Dialer, SystemDialer, Target};
pub use framed::{FramedStream, MAX_LINE_LENGTH};
pub use manager::ConnectionManager;
pub use stream::{RawStream, SpamdStream, create_tls_connector};
pub use timeout::IoDeadline;
