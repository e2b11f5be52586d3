//! Configuration file loading and merging with the command line.
//!
//! The file is TOML; every key is optional and mirrors a command-line
//! flag. Flags given on the command line win over the file.
//!
//! ```toml
//! dest = "spamd1.example.com,spamd2.example.com"
//! port = 783
//! randomize = true
//! timeout = 120
//! family = "ipv4"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;
use spamwire_client::{AddressFamily, InputMode, SessionConfig, TlsSettings, TransportSpec};

use crate::cli::Cli;

/// Address family setting in the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// IPv4 and IPv6.
    #[default]
    Any,
    /// IPv4 only.
    Ipv4,
    /// IPv6 only.
    Ipv6,
}

/// Contents of the configuration file. Keys are named after the long
/// command-line flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub dest: Option<String>,
    pub port: Option<u16>,
    pub socket: Option<PathBuf>,
    pub ssl: Option<bool>,
    pub ca_file: Option<PathBuf>,
    pub compress: Option<bool>,
    pub safe_fallback: Option<bool>,
    pub randomize: Option<bool>,
    pub failover: Option<bool>,
    pub username: Option<String>,
    pub max_size: Option<usize>,
    pub timeout: Option<u64>,
    pub connect_timeout: Option<u64>,
    pub connect_retries: Option<u32>,
    pub retry_sleep: Option<u64>,
    pub filter_retries: Option<u32>,
    pub filter_retry_sleep: Option<u64>,
    pub family: Option<Family>,
}

impl FileConfig {
    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Loads the file named with `-F`, or the default file if it exists.
    pub fn discover(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_path() {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "using default config file");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}

/// `$XDG_CONFIG_HOME/spamwire/spamwire.toml` or the platform equivalent.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("spamwire").join("spamwire.toml"))
}

/// Everything the binary needs to run one session.
#[derive(Debug)]
pub struct Settings {
    /// Session configuration.
    pub session: SessionConfig,
    /// Where the daemon lives.
    pub transport: TransportSpec,
    /// Output command, empty for stdout.
    pub exec: Vec<String>,
}

impl Settings {
    /// Merges command-line flags over the file configuration.
    pub fn merge(cli: &Cli, file: FileConfig) -> anyhow::Result<Self> {
        let mut transport = if let Some(path) = &cli.socket {
            TransportSpec::unix(path.clone())
        } else if let Some(dest) = &cli.dest {
            TransportSpec::tcp(dest)
        } else if let Some(path) = file.socket {
            TransportSpec::unix(path)
        } else if let Some(dest) = &file.dest {
            TransportSpec::tcp(dest)
        } else {
            TransportSpec::default()
        };
        if let Some(port) = cli.port.or(file.port) {
            transport.port = port;
        }
        transport.family = if cli.ipv4 {
            AddressFamily::V4
        } else if cli.ipv6 {
            AddressFamily::V6
        } else {
            match file.family.unwrap_or_default() {
                Family::Any => AddressFamily::Any,
                Family::Ipv4 => AddressFamily::V4,
                Family::Ipv6 => AddressFamily::V6,
            }
        };
        transport.randomize = cli.randomize || file.randomize.unwrap_or(false);
        transport.failover = !cli.no_failover && file.failover.unwrap_or(true);
        if let Some(retries) = cli.connect_retries.or(file.connect_retries) {
            if retries == 0 {
                bail!("connect retries must be at least 1");
            }
            transport.connect_retries = retries;
        }
        if let Some(secs) = cli.retry_sleep.or(file.retry_sleep) {
            transport.retry_sleep = Duration::from_secs(secs);
        }

        let mut builder = SessionConfig::builder()
            .command(cli.mode())
            .input_mode(if cli.bsmtp {
                InputMode::Bsmtp
            } else {
                InputMode::Raw
            })
            .compress(cli.compress || file.compress.unwrap_or(false))
            .safe_fallback(if cli.no_safe_fallback {
                false
            } else {
                cli.safe_fallback || file.safe_fallback.unwrap_or(true)
            });

        if let Some(user) = cli
            .username
            .clone()
            .or(file.username)
            .or_else(login_name)
        {
            builder = builder.user(user);
        }
        if let Some(max) = cli.max_size.or(file.max_size) {
            builder = builder.max_len(max);
        }
        if let Some(secs) = cli.timeout.or(file.timeout) {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = cli.connect_timeout.or(file.connect_timeout) {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(retries) = cli.filter_retries.or(file.filter_retries) {
            builder = builder.filter_retries(retries);
        }
        if let Some(secs) = cli.filter_retry_sleep.or(file.filter_retry_sleep) {
            builder = builder.filter_retry_sleep(Duration::from_secs(secs));
        }
        if cli.ssl || file.ssl.unwrap_or(false) {
            builder = builder.tls(TlsSettings {
                ca_file: cli.ca_file.clone().or(file.ca_file),
            });
        }

        Ok(Self {
            session: builder.build()?,
            transport,
            exec: cli.exec.clone(),
        })
    }
}

fn login_name() -> Option<String> {
    ["USER", "LOGNAME"]
        .into_iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
}
