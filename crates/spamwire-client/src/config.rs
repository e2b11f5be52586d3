//! Session configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::command::{Command, MAX_MESSAGE_LEN};
use crate::error::{Error, Result};

/// Default input size limit (500 KiB).
pub const DEFAULT_MAX_LEN: usize = 500 * 1024;

/// Default read/write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How the input is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// A plain RFC 822 message.
    #[default]
    Raw,
    /// A BSMTP transcript.
    Bsmtp,
}

/// TLS settings for the daemon connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    /// Extra PEM bundle of trusted certificates.
    pub ca_file: Option<PathBuf>,
}

/// Configuration for one message session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Command to issue.
    pub command: Command,
    /// Input framing.
    pub input_mode: InputMode,
    /// User whose per-user configuration the daemon applies.
    pub user: Option<String>,
    /// Largest input accepted for filtering.
    pub max_len: usize,
    /// Read/write timeout; zero disables it.
    pub timeout: Duration,
    /// Connect and TLS handshake timeout; zero disables it.
    pub connect_timeout: Duration,
    /// Compress the request body.
    pub compress: bool,
    /// Use TLS.
    pub tls: Option<TlsSettings>,
    /// Pass the message through unchanged when filtering fails.
    pub safe_fallback: bool,
    /// Whole-exchange attempts for I/O failures.
    pub filter_retries: u32,
    /// Pause between whole-exchange attempts.
    pub filter_retry_sleep: Duration,
}

impl SessionConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command: Command::Process,
            input_mode: InputMode::Raw,
            user: None,
            max_len: DEFAULT_MAX_LEN,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            compress: false,
            tls: None,
            safe_fallback: true,
            filter_retries: 1,
            filter_retry_sleep: Duration::from_secs(1),
        }
    }
}

/// Builder for session configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Creates a builder with default settings (PROCESS, safe fallback on).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the command.
    #[must_use]
    pub fn command(mut self, command: Command) -> Self {
        self.config.command = command;
        self
    }

    /// Sets the input framing.
    #[must_use]
    pub const fn input_mode(mut self, mode: InputMode) -> Self {
        self.config.input_mode = mode;
        self
    }

    /// Sets the user name sent to the daemon.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.user = Some(user.into());
        self
    }

    /// Sets the input size limit.
    #[must_use]
    pub const fn max_len(mut self, max_len: usize) -> Self {
        self.config.max_len = max_len;
        self
    }

    /// Sets the read/write timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Enables or disables body compression.
    #[must_use]
    pub const fn compress(mut self, compress: bool) -> Self {
        self.config.compress = compress;
        self
    }

    /// Enables TLS.
    #[must_use]
    pub fn tls(mut self, settings: TlsSettings) -> Self {
        self.config.tls = Some(settings);
        self
    }

    /// Enables or disables safe fallback.
    #[must_use]
    pub const fn safe_fallback(mut self, enabled: bool) -> Self {
        self.config.safe_fallback = enabled;
        self
    }

    /// Sets the number of whole-exchange attempts.
    #[must_use]
    pub const fn filter_retries(mut self, retries: u32) -> Self {
        self.config.filter_retries = retries;
        self
    }

    /// Sets the pause between whole-exchange attempts.
    #[must_use]
    pub const fn filter_retry_sleep(mut self, sleep: Duration) -> Self {
        self.config.filter_retry_sleep = sleep;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `max_len` is zero or above
    /// [`MAX_MESSAGE_LEN`], or `filter_retries` is zero.
    pub fn build(self) -> Result<SessionConfig> {
        let config = self.config;
        if config.max_len == 0 || config.max_len > MAX_MESSAGE_LEN {
            return Err(Error::Config(format!(
                "max message size must be between 1 and {MAX_MESSAGE_LEN} bytes"
            )));
        }
        if config.filter_retries == 0 {
            return Err(Error::Config("filter retries must be at least 1".into()));
        }
        Ok(config)
    }
}
