//! spamd response parser.
//!
//! Parses single response lines with the line terminator already stripped:
//! the status line (`SPAMD/1.5 0 EX_OK`) and the header lines that follow
//! it. Reading the lines off the wire is the job of
//! [`FramedStream`](crate::connection::FramedStream).

use crate::error::{Error, Result};
use crate::types::{ProtocolVersion, ResponseCode, StatusLine, TellTargets, Verdict};

/// Prefix of every daemon status line.
const STATUS_PREFIX: &str = "SPAMD/";

/// Fractional digits beyond this are ignored by [`parse_score`].
const MAX_FRACTION_DIGITS: usize = 9;

/// A response header the client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Header {
    /// `Spam: True ; 12.3 / 5.0`
    Spam(Verdict),
    /// `Content-length: 1234`
    ContentLength(usize),
    /// `DidSet: local, remote`
    DidSet(TellTargets),
    /// `DidRemove: local`
    DidRemove(TellTargets),
    /// Any header this client does not interpret.
    Other {
        /// Header name as sent.
        name: String,
        /// Header value with leading whitespace removed.
        value: String,
    },
}

/// Parses the daemon status line.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the line is not `SPAMD/<version> <code> <text>`
/// or the version is older than 1.0.
pub fn parse_status_line(line: &str) -> Result<StatusLine> {
    let rest = line
        .strip_prefix(STATUS_PREFIX)
        .ok_or_else(|| Error::protocol(format!("spamd responded with bad string '{line}'")))?;

    let mut parts = rest.splitn(3, ' ');
    let version_str = parts.next().unwrap_or_default();
    let code_str = parts.next().unwrap_or_default();
    let text = parts.next().unwrap_or_default().trim().to_string();

    let version = ProtocolVersion::parse(version_str).ok_or_else(|| {
        Error::protocol(format!("spamd responded with bad version string '{version_str}'"))
    })?;
    if !version.is_supported() {
        return Err(Error::protocol(format!(
            "spamd responded with unsupported version {version}"
        )));
    }

    let code = code_str
        .trim()
        .parse::<u16>()
        .map_err(|_| Error::protocol(format!("spamd responded with bad code '{code_str}'")))?;

    Ok(StatusLine::new(version, ResponseCode::new(code), text))
}

/// Parses one response header line.
///
/// # Errors
///
/// Returns [`Error::Protocol`] for a line without a `:` separator, a
/// malformed `Spam:` value, or a negative or unparsable `Content-length`.
pub fn parse_header(line: &str) -> Result<Header> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| Error::protocol(format!("spamd responded with bad header '{line}'")))?;
    let value = value.trim_start();

    match name {
        "Spam" => parse_spam_value(value).map(Header::Spam),
        "Content-length" => parse_content_length(value).map(Header::ContentLength),
        "DidSet" => Ok(Header::DidSet(TellTargets::parse(value))),
        "DidRemove" => Ok(Header::DidRemove(TellTargets::parse(value))),
        _ => Ok(Header::Other {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_spam_value(value: &str) -> Result<Verdict> {
    let bad = || Error::protocol(format!("spamd responded with bad Spam header '{value}'"));

    let (flag, scores) = value.split_once(';').ok_or_else(bad)?;
    let (score, threshold) = scores.split_once('/').ok_or_else(bad)?;

    let is_spam = flag.trim().eq_ignore_ascii_case("true");
    let score = parse_score(score.trim()).ok_or_else(bad)?;
    let threshold = parse_score(threshold.trim()).ok_or_else(bad)?;

    Ok(Verdict::new(is_spam, score, threshold))
}

fn parse_content_length(value: &str) -> Result<usize> {
    let length = value.trim().parse::<i64>().map_err(|_| {
        Error::protocol(format!("spamd responded with bad Content-length '{value}'"))
    })?;
    usize::try_from(length)
        .map_err(|_| Error::protocol(format!("spamd responded with bad Content-length '{value}'")))
}

/// Parses a decimal score such as `-3.25`.
///
/// The wire format always uses `.` as the decimal separator, so the integer
/// and fractional parts are parsed separately as integers and recombined
/// rather than going through any locale-aware conversion.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn parse_score(s: &str) -> Option<f32> {
    let (negative, digits) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let whole = if int_part.is_empty() {
        0
    } else {
        int_part.parse::<u64>().ok()?
    };

    let frac_part = &frac_part[..frac_part.len().min(MAX_FRACTION_DIGITS)];
    let fraction = if frac_part.is_empty() {
        0.0
    } else {
        let numerator = frac_part.parse::<u64>().ok()? as f64;
        let exponent = i32::try_from(frac_part.len()).ok()?;
        numerator / 10f64.powi(exponent)
    };

    let value = whole as f64 + fraction;
    let value = if negative { -value } else { value };
    Some(value as f32)
}
