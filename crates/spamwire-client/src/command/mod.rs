//! spamd request builder.

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;

use crate::error::{Error, Result};
use crate::types::{MessageClass, TellTargets};

/// Protocol version announced on the request line.
pub const PROTOCOL_VERSION: &str = "SPAMC/1.5";

/// Hard upper bound on a request body (256 MiB).
pub const MAX_MESSAGE_LEN: usize = 256 * 1024 * 1024;

/// spamd command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CHECK - Return only the verdict
    Check,
    /// SYMBOLS - Return the names of the rules that hit
    Symbols,
    /// REPORT - Return the verdict and a report for every message
    Report,
    /// `REPORT_IFSPAM` - Return the verdict and a report for spam only
    ReportIfSpam,
    /// PROCESS - Return the rewritten message
    Process,
    /// HEADERS - Return only the rewritten headers
    Headers,
    /// PING - Check that the daemon is alive
    Ping,
    /// TELL - Learn, forget or report a message
    Tell(TellRequest),
}

/// Parameters of a TELL request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TellRequest {
    /// Class asserted for the message.
    pub class: Option<MessageClass>,
    /// Targets to add the message to.
    pub set: TellTargets,
    /// Targets to remove the message from.
    pub remove: TellTargets,
}

impl TellRequest {
    /// Learn the message as `class` in the local database.
    #[must_use]
    pub const fn learn(class: MessageClass) -> Self {
        Self {
            class: Some(class),
            set: TellTargets::LOCAL,
            remove: TellTargets::NONE,
        }
    }

    /// Forget a previously learned message.
    #[must_use]
    pub const fn forget() -> Self {
        Self {
            class: None,
            set: TellTargets::NONE,
            remove: TellTargets::LOCAL,
        }
    }

    /// Report the message as spam locally and to remote services.
    #[must_use]
    pub const fn report() -> Self {
        Self {
            class: Some(MessageClass::Spam),
            set: TellTargets::BOTH,
            remove: TellTargets::NONE,
        }
    }

    /// Revoke an earlier report: learn as ham, withdraw the remote report.
    #[must_use]
    pub const fn revoke() -> Self {
        Self {
            class: Some(MessageClass::Ham),
            set: TellTargets::LOCAL,
            remove: TellTargets::REMOTE,
        }
    }
}

impl Command {
    /// Returns the request verb.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Check => "CHECK",
            Self::Symbols => "SYMBOLS",
            Self::Report => "REPORT",
            Self::ReportIfSpam => "REPORT_IFSPAM",
            Self::Process => "PROCESS",
            Self::Headers => "HEADERS",
            Self::Ping => "PING",
            Self::Tell(_) => "TELL",
        }
    }

    /// Returns true if the response ends after its headers.
    #[must_use]
    pub const fn is_headers_only(&self) -> bool {
        matches!(self, Self::Check | Self::Ping | Self::Tell(_))
    }

    /// Returns true if the request carries the message.
    #[must_use]
    pub const fn sends_body(&self) -> bool {
        !matches!(self, Self::Ping)
    }
}

/// A complete request ready to be serialized.
#[derive(Debug, Clone)]
pub struct Request<'a> {
    /// Command to issue.
    pub command: &'a Command,
    /// User whose per-user configuration the daemon applies.
    pub user: Option<&'a str>,
    /// Deflate the body with zlib.
    pub compress: bool,
    /// Raw header lines (CRLF-terminated) added before `Content-length`.
    pub extra_headers: &'a [u8],
    /// Message body.
    pub body: &'a [u8],
}

impl Request<'_> {
    /// Serializes the request to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooBig`] if the body exceeds [`MAX_MESSAGE_LEN`], or
    /// an I/O error if compression fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let body = if !self.command.sends_body() {
            Vec::new()
        } else if self.compress {
            deflate(self.body)?
        } else {
            self.body.to_vec()
        };
        if body.len() > MAX_MESSAGE_LEN {
            return Err(Error::TooBig {
                limit: MAX_MESSAGE_LEN,
            });
        }

        let mut buf = Vec::with_capacity(body.len() + 256);
        buf.extend_from_slice(self.command.verb().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(PROTOCOL_VERSION.as_bytes());
        buf.extend_from_slice(b"\r\n");

        if self.command.sends_body() {
            if let Some(user) = self.user {
                buf.extend_from_slice(b"User: ");
                buf.extend_from_slice(user.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            if self.compress {
                buf.extend_from_slice(b"Compress: zlib\r\n");
            }
            if let Command::Tell(tell) = self.command {
                write_tell_headers(&mut buf, tell);
            }
            buf.extend_from_slice(self.extra_headers);
            buf.extend_from_slice(format!("Content-length: {}\r\n", body.len()).as_bytes());
        }

        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&body);
        Ok(buf)
    }
}

fn write_tell_headers(buf: &mut Vec<u8>, tell: &TellRequest) {
    if let Some(class) = tell.class {
        buf.extend_from_slice(b"Message-class: ");
        buf.extend_from_slice(class.as_str().as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    if !tell.set.is_empty() {
        buf.extend_from_slice(b"Set: ");
        buf.extend_from_slice(tell.set.header_value().as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    if !tell.remove.is_empty() {
        buf.extend_from_slice(b"Remove: ");
        buf.extend_from_slice(tell.remove.header_value().as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
}

fn deflate(body: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
    encoder.write_all(body)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    fn request<'a>(command: &'a Command, body: &'a [u8]) -> Request<'a> {
        Request {
            command,
            user: None,
            compress: false,
            extra_headers: b"",
            body,
        }
    }

    #[test]
    fn test_check_request() {
        let cmd = Command::Check;
        let bytes = request(&cmd, b"Subject: hi\r\n\r\nbody").serialize().unwrap();
        assert_eq!(
            bytes,
            b"CHECK SPAMC/1.5\r\nContent-length: 19\r\n\r\nSubject: hi\r\n\r\nbody"
        );
    }

    #[test]
    fn test_process_with_user() {
        let cmd = Command::Process;
        let mut req = request(&cmd, b"x");
        req.user = Some("alice");
        assert_eq!(
            req.serialize().unwrap(),
            b"PROCESS SPAMC/1.5\r\nUser: alice\r\nContent-length: 1\r\n\r\nx"
        );
    }

    #[test]
    fn test_ping_has_no_headers() {
        let cmd = Command::Ping;
        let mut req = request(&cmd, b"ignored");
        req.user = Some("alice");
        req.compress = true;
        assert_eq!(req.serialize().unwrap(), b"PING SPAMC/1.5\r\n\r\n");
    }

    #[test]
    fn test_verbs() {
        assert_eq!(Command::Symbols.verb(), "SYMBOLS");
        assert_eq!(Command::Report.verb(), "REPORT");
        assert_eq!(Command::ReportIfSpam.verb(), "REPORT_IFSPAM");
        assert_eq!(Command::Headers.verb(), "HEADERS");
        assert_eq!(Command::Tell(TellRequest::forget()).verb(), "TELL");
    }

    #[test]
    fn test_compressed_body() {
        let cmd = Command::Process;
        let body = b"Subject: compress me\r\n\r\n".repeat(20);
        let mut req = request(&cmd, &body);
        req.compress = true;
        let bytes = req.serialize().unwrap();

        let text = String::from_utf8_lossy(&bytes);
        assert!(text.starts_with("PROCESS SPAMC/1.5\r\nCompress: zlib\r\nContent-length: "));

        let split = bytes.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        let headers = String::from_utf8_lossy(&bytes[..split]).to_string();
        let declared: usize = headers
            .lines()
            .find_map(|l| l.strip_prefix("Content-length: "))
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(declared, bytes.len() - split);

        let mut inflated = Vec::new();
        ZlibDecoder::new(&bytes[split..])
            .read_to_end(&mut inflated)
            .unwrap();
        assert_eq!(inflated, body);
    }

    #[test]
    fn test_tell_learn_headers() {
        let cmd = Command::Tell(TellRequest::learn(MessageClass::Spam));
        let mut req = request(&cmd, b"m");
        req.user = Some("bob");
        assert_eq!(
            req.serialize().unwrap(),
            b"TELL SPAMC/1.5\r\nUser: bob\r\nMessage-class: spam\r\nSet: local\r\nContent-length: 1\r\n\r\nm"
        );
    }

    #[test]
    fn test_tell_revoke_headers() {
        let cmd = Command::Tell(TellRequest::revoke());
        let bytes = request(&cmd, b"m").serialize().unwrap();
        assert_eq!(
            bytes,
            b"TELL SPAMC/1.5\r\nMessage-class: ham\r\nSet: local\r\nRemove: remote\r\nContent-length: 1\r\n\r\nm"
        );
    }

    #[test]
    fn test_extra_headers_before_length() {
        let cmd = Command::Symbols;
        let mut req = request(&cmd, b"m");
        req.extra_headers = b"X-Trace: 1\r\n";
        assert_eq!(
            req.serialize().unwrap(),
            b"SYMBOLS SPAMC/1.5\r\nX-Trace: 1\r\nContent-length: 1\r\n\r\nm"
        );
    }

    #[test]
    fn test_headers_only_commands() {
        assert!(Command::Check.is_headers_only());
        assert!(Command::Ping.is_headers_only());
        assert!(!Command::Process.is_headers_only());
        assert!(!Command::Headers.is_headers_only());
    }
}
