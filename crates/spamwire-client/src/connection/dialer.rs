//! Socket dialing.
//!
//! The [`Dialer`] trait is the seam between connection policy (which
//! address, how often, when to give up) and actually opening a socket, so
//! the retry and failover logic can be driven against in-memory streams.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use super::stream::RawStream;

/// One place a daemon may be listening.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// TCP address, with the configured host name it was resolved from.
    Inet {
        /// Socket address to dial.
        addr: SocketAddr,
        /// Host name presented for TLS verification.
        host: String,
    },
    /// Unix domain socket path.
    Unix(PathBuf),
}

impl Target {
    /// TCP target for `addr`, resolved from `host`.
    #[must_use]
    pub fn inet(host: impl Into<String>, addr: SocketAddr) -> Self {
        Self::Inet {
            addr,
            host: host.into(),
        }
    }

    /// Name the daemon's TLS certificate is checked against.
    #[must_use]
    pub fn host(&self) -> &str {
        match self {
            Self::Inet { host, .. } => host,
            Self::Unix(_) => "localhost",
        }
    }

    /// Returns true for the IPv4 limited broadcast address, which is never
    /// dialed.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        match self {
            Self::Inet {
                addr: SocketAddr::V4(addr),
                ..
            } => addr.ip().is_broadcast(),
            _ => false,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet { addr, .. } => write!(f, "{addr}"),
            Self::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Opens a socket to a [`Target`].
pub trait Dialer {
    /// Stream produced by a successful dial.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Opens a connection without any deadline; the caller applies one.
    fn dial(&self, target: &Target) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Dials real TCP and Unix domain sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDialer;

impl Dialer for SystemDialer {
    type Stream = RawStream;

    async fn dial(&self, target: &Target) -> io::Result<RawStream> {
        match target {
            Target::Inet { addr, .. } => {
                let stream = TcpStream::connect(addr).await?;
                stream.set_nodelay(true)?;
                Ok(RawStream::Tcp(stream))
            }
            #[cfg(unix)]
            Target::Unix(path) => Ok(RawStream::Unix(tokio::net::UnixStream::connect(path).await?)),
            #[cfg(not(unix))]
            Target::Unix(path) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unix sockets are not supported here: {}", path.display()),
            )),
        }
    }
}
