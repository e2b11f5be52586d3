//! Error types for spamd client operations.

use std::io;
use std::time::Duration;

/// Result type alias for spamd client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Exit codes from `sysexits.h`, as reported by the command-line client.
pub mod exit {
    /// Successful termination.
    pub const OK: u8 = 0;
    /// Check mode: the message is spam.
    pub const IS_SPAM: u8 = 1;
    /// TELL: the daemon changed its databases.
    pub const TOLD: u8 = 5;
    /// TELL: the message was already learned, nothing changed.
    pub const TOLD_UNCHANGED: u8 = 6;
    /// Input data was incorrect.
    pub const DATAERR: u8 = 65;
    /// Host name unknown.
    pub const NOHOST: u8 = 68;
    /// Service unavailable.
    pub const UNAVAILABLE: u8 = 69;
    /// Internal software error.
    pub const SOFTWARE: u8 = 70;
    /// Input/output error.
    pub const IOERR: u8 = 74;
    /// Temporary failure; the caller should retry later.
    pub const TEMPFAIL: u8 = 75;
    /// Remote error in protocol.
    pub const PROTOCOL: u8 = 76;
    /// Permission denied.
    pub const NOPERM: u8 = 77;
    /// Configuration error.
    pub const CONFIG: u8 = 78;
}

/// spamd client error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input exceeded the configured size limit; nothing was sent.
    #[error("Message exceeds size limit of {limit} bytes")]
    TooBig {
        /// Configured limit in bytes.
        limit: usize,
    },

    /// Name lookup failed, but may succeed later.
    #[error("Temporary name resolution failure: {0}")]
    ResolutionTransient(String),

    /// Every listed host name is unknown.
    #[error("No such host: {0}")]
    ResolutionPermanent(String),

    /// Connect failed because of a local/internal problem.
    #[error("Connection failed (software error): {0}")]
    ConnectSoftware(String),

    /// The daemon could not be reached.
    #[error("Connection failed (daemon unavailable): {0}")]
    ConnectUnavailable(String),

    /// Connecting was not permitted.
    #[error("Connection failed (permission denied): {0}")]
    ConnectDenied(String),

    /// I/O error during the exchange.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read or write did not complete within its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// The daemon sent something that is not valid protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The daemon answered with a non-zero status code.
    #[error("spamd error {code}: {text}")]
    Daemon {
        /// Status code from the status line.
        code: u16,
        /// Status text from the status line.
        text: String,
    },

    /// BSMTP transcript without a DATA line or terminating dot.
    #[error("Malformed BSMTP envelope: {0}")]
    MalformedEnvelope(String),

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Fieldless classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::TooBig`].
    TooBig,
    /// See [`Error::ResolutionTransient`].
    ResolutionTransient,
    /// See [`Error::ResolutionPermanent`].
    ResolutionPermanent,
    /// See [`Error::ConnectSoftware`].
    ConnectSoftware,
    /// See [`Error::ConnectUnavailable`].
    ConnectUnavailable,
    /// See [`Error::ConnectDenied`].
    ConnectDenied,
    /// See [`Error::Io`].
    Io,
    /// See [`Error::Timeout`].
    Timeout,
    /// See [`Error::Tls`].
    Tls,
    /// See [`Error::Protocol`].
    Protocol,
    /// See [`Error::Daemon`].
    Daemon,
    /// See [`Error::MalformedEnvelope`].
    MalformedEnvelope,
    /// See [`Error::Config`].
    Config,
}

impl Error {
    /// Returns the error's kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TooBig { .. } => ErrorKind::TooBig,
            Self::ResolutionTransient(_) => ErrorKind::ResolutionTransient,
            Self::ResolutionPermanent(_) => ErrorKind::ResolutionPermanent,
            Self::ConnectSoftware(_) => ErrorKind::ConnectSoftware,
            Self::ConnectUnavailable(_) => ErrorKind::ConnectUnavailable,
            Self::ConnectDenied(_) => ErrorKind::ConnectDenied,
            Self::Io(_) => ErrorKind::Io,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Tls(_) => ErrorKind::Tls,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Daemon { .. } => ErrorKind::Daemon,
            Self::MalformedEnvelope(_) => ErrorKind::MalformedEnvelope,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Creates a protocol error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns true for mid-exchange failures the session may retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout(_))
    }

    /// Returns true if safe fallback may pass the original message through.
    #[must_use]
    pub const fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            Self::ResolutionTransient(_)
                | Self::ResolutionPermanent(_)
                | Self::ConnectSoftware(_)
                | Self::ConnectUnavailable(_)
                | Self::ConnectDenied(_)
                | Self::Io(_)
                | Self::Timeout(_)
                | Self::Tls(_)
                | Self::Protocol(_)
                | Self::Daemon { .. }
        )
    }

    /// Maps the error to a process exit code.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::TooBig { .. } => exit::OK,
            Self::ResolutionTransient(_) => exit::TEMPFAIL,
            Self::ResolutionPermanent(_) => exit::NOHOST,
            Self::ConnectSoftware(_) | Self::Tls(_) => exit::SOFTWARE,
            Self::ConnectUnavailable(_) => exit::UNAVAILABLE,
            Self::ConnectDenied(_) => exit::NOPERM,
            Self::Io(_) | Self::Timeout(_) => exit::IOERR,
            Self::Protocol(_) => exit::PROTOCOL,
            Self::Daemon { code, .. } => match u8::try_from(*code) {
                Ok(code) if (64..=78).contains(&code) => code,
                _ => exit::PROTOCOL,
            },
            Self::MalformedEnvelope(_) => exit::DATAERR,
            Self::Config(_) => exit::CONFIG,
        }
    }
}
