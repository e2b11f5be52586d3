//! Deadline-guarded I/O primitives.
//!
//! Every blocking operation against the daemon (connect, TLS handshake,
//! read, write) goes through this module with an explicit [`IoDeadline`].
//! Interrupted reads are retried here and never reach callers.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Per-operation deadline. A zero duration disables the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoDeadline(Option<Duration>);

impl IoDeadline {
    /// No deadline: operations may block indefinitely.
    pub const NONE: Self = Self(None);

    /// Creates a deadline; `Duration::ZERO` means no deadline.
    #[must_use]
    pub const fn new(limit: Duration) -> Self {
        if limit.is_zero() {
            Self(None)
        } else {
            Self(Some(limit))
        }
    }

    /// Returns the limit, if any.
    #[must_use]
    pub const fn limit(self) -> Option<Duration> {
        self.0
    }
}

impl From<Duration> for IoDeadline {
    fn from(limit: Duration) -> Self {
        Self::new(limit)
    }
}

/// Runs `fut` under the deadline, returning `None` if it expired.
async fn guard<F: Future>(deadline: IoDeadline, fut: F) -> Option<F::Output> {
    match deadline.0 {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}

/// Reads into `buf`, returning the byte count (0 means orderly EOF).
///
/// # Errors
///
/// Returns [`Error::Timeout`] if the deadline expires and [`Error::Io`] for
/// any non-transient I/O failure.
pub async fn read<R>(reader: &mut R, buf: &mut [u8], deadline: IoDeadline) -> Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    loop {
        match guard(deadline, reader.read(buf)).await {
            None => return Err(Error::Timeout(deadline.0.unwrap_or_default())),
            Some(Ok(n)) => return Ok(n),
            Some(Err(err)) if is_transient(&err) => {}
            Some(Err(err)) => return Err(Error::Io(err)),
        }
    }
}

/// Writes all of `data` and flushes.
///
/// # Errors
///
/// Returns [`Error::Timeout`] if the deadline expires and [`Error::Io`] for
/// any non-transient I/O failure.
pub async fn write_all<W>(writer: &mut W, data: &[u8], deadline: IoDeadline) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let write = async {
        writer.write_all(data).await?;
        writer.flush().await
    };
    match guard(deadline, write).await {
        None => Err(Error::Timeout(deadline.0.unwrap_or_default())),
        Some(result) => result.map_err(Error::Io),
    }
}

/// Runs a connect-like operation (socket connect or TLS handshake).
///
/// An expired deadline is reported as an [`io::ErrorKind::TimedOut`] error so
/// the caller can classify it together with the operating system's own
/// connect failures.
///
/// # Errors
///
/// Returns the operation's own error, or `TimedOut` on expiry.
pub async fn connect<F, T>(attempt: F, deadline: IoDeadline) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    guard(deadline, attempt).await.unwrap_or_else(|| {
        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect timed out after {:?}", deadline.0.unwrap_or_default()),
        ))
    })
}
