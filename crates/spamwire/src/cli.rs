//! Command-line flags.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use spamwire_client::{Command, MessageClass, TellRequest};

/// Filter a mail message through spamd.
///
/// Reads the message on stdin and writes the result to stdout (or to the
/// command given with `-e`).
#[derive(Debug, Parser)]
#[command(name = "spamwire", version, about)]
#[allow(clippy::struct_excessive_bools)] // Flags mirror the classic spamc switches
pub struct Cli {
    /// Input is a BSMTP transcript.
    #[arg(short = 'B', long)]
    pub bsmtp: bool,

    /// Print only the score, exit 1 if spam.
    #[arg(short = 'c', long, group = "mode")]
    pub check: bool,

    /// Print the report if the message is spam.
    #[arg(short = 'r', long = "full-spam", group = "mode")]
    pub report_if_spam: bool,

    /// Print the report whether or not the message is spam.
    #[arg(short = 'R', long = "full", group = "mode")]
    pub report: bool,

    /// Print the names of the tests that hit.
    #[arg(short = 'y', long = "tests", group = "mode")]
    pub symbols: bool,

    /// Check that spamd is alive.
    #[arg(short = 'K', long, group = "mode")]
    pub ping: bool,

    /// Rewrite only the headers, keeping the original body.
    #[arg(long, group = "mode")]
    pub headers: bool,

    /// Learn the message as spam or ham, or forget it.
    #[arg(short = 'L', long = "learntype", value_enum, group = "mode")]
    pub learn: Option<LearnType>,

    /// Report the message to remote services, or revoke a report.
    #[arg(short = 'C', long = "reporttype", value_enum, group = "mode")]
    pub report_type: Option<ReportType>,

    /// Comma-separated spamd host list.
    #[arg(short = 'd', long = "dest", value_name = "HOST[,HOST...]")]
    pub dest: Option<String>,

    /// spamd port.
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Connect over a Unix domain socket.
    #[arg(short = 'U', long, value_name = "PATH", conflicts_with = "dest")]
    pub socket: Option<PathBuf>,

    /// Use TLS.
    #[arg(short = 'S', long)]
    pub ssl: bool,

    /// Extra PEM bundle of trusted CA certificates.
    #[arg(long, value_name = "PATH")]
    pub ca_file: Option<PathBuf>,

    /// Compress the request with zlib.
    #[arg(short = 'z', long)]
    pub compress: bool,

    /// Pass the message through unchanged on failure (the default).
    #[arg(short = 'f', long)]
    pub safe_fallback: bool,

    /// Fail instead of passing the message through.
    #[arg(short = 'x', long, conflicts_with = "safe_fallback")]
    pub no_safe_fallback: bool,

    /// Randomize the order of the resolved hosts.
    #[arg(short = 'H', long)]
    pub randomize: bool,

    /// Only ever try the first host.
    #[arg(long)]
    pub no_failover: bool,

    /// User whose per-user settings spamd applies.
    #[arg(short = 'u', long)]
    pub username: Option<String>,

    /// Largest message to filter, in bytes.
    #[arg(short = 's', long, value_name = "BYTES")]
    pub max_size: Option<usize>,

    /// Read/write timeout in seconds, 0 for none.
    #[arg(short = 't', long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Connect timeout in seconds, 0 for none.
    #[arg(short = 'n', long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Connection attempts across the host list.
    #[arg(long, value_name = "N")]
    pub connect_retries: Option<u32>,

    /// Seconds to wait between connection attempts.
    #[arg(long, value_name = "SECS")]
    pub retry_sleep: Option<u64>,

    /// Attempts at the whole exchange on I/O failure.
    #[arg(long, value_name = "N")]
    pub filter_retries: Option<u32>,

    /// Seconds to wait between exchange attempts.
    #[arg(long, value_name = "SECS")]
    pub filter_retry_sleep: Option<u64>,

    /// Use IPv4 only.
    #[arg(short = '4', conflicts_with = "ipv6")]
    pub ipv4: bool,

    /// Use IPv6 only.
    #[arg(short = '6')]
    pub ipv6: bool,

    /// Configuration file.
    #[arg(short = 'F', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Debug logging on stderr.
    #[arg(long)]
    pub debug: bool,

    /// Pipe the output into COMMAND instead of stdout. Takes the rest of
    /// the command line.
    #[arg(
        short = 'e',
        long = "pipe-to",
        value_name = "COMMAND",
        num_args = 1..,
        allow_hyphen_values = true
    )]
    pub exec: Vec<String>,
}

/// `-L` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LearnType {
    /// Learn as spam.
    Spam,
    /// Learn as ham.
    Ham,
    /// Forget the message.
    Forget,
}

/// `-C` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportType {
    /// Report as spam locally and remotely.
    Report,
    /// Revoke an earlier report.
    Revoke,
}

impl Cli {
    /// The request the flags select; PROCESS when no mode flag is given.
    pub fn mode(&self) -> Command {
        if let Some(learn) = self.learn {
            return Command::Tell(match learn {
                LearnType::Spam => TellRequest::learn(MessageClass::Spam),
                LearnType::Ham => TellRequest::learn(MessageClass::Ham),
                LearnType::Forget => TellRequest::forget(),
            });
        }
        if let Some(report) = self.report_type {
            return Command::Tell(match report {
                ReportType::Report => TellRequest::report(),
                ReportType::Revoke => TellRequest::revoke(),
            });
        }
        if self.check {
            Command::Check
        } else if self.report_if_spam {
            Command::ReportIfSpam
        } else if self.report {
            Command::Report
        } else if self.symbols {
            Command::Symbols
        } else if self.ping {
            Command::Ping
        } else if self.headers {
            Command::Headers
        } else {
            Command::Process
        }
    }
}
