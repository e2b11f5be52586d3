//! Batch SMTP envelope handling.
//!
//! A BSMTP transcript is a sequence of SMTP commands with the message
//! embedded after a `DATA` line and terminated by a line holding a single
//! `.`. Inside the data section, lines beginning with `.` carry one extra
//! leading dot ("dot-stuffing").
//!
//! [`split`] extracts the unstuffed message and remembers where the
//! envelope parts were; [`join`] re-embeds a (possibly rewritten) message
//! between the original envelope parts.

use std::ops::Range;

use crate::error::{Error, Result};

/// Positions of the envelope parts inside the raw transcript.
///
/// `pre`, `data` and `post` are contiguous and together cover the whole
/// transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// SMTP commands up to and including the `DATA` line.
    pub pre: Range<usize>,
    /// Dot-stuffed message data.
    pub data: Range<usize>,
    /// Terminating `.` line and everything after it.
    pub post: Range<usize>,
    /// The message with dot-stuffing removed.
    pub body: Vec<u8>,
}

/// Splits a BSMTP transcript into envelope parts and the unstuffed message.
///
/// # Errors
///
/// Returns [`Error::MalformedEnvelope`] if there is no `DATA` line or the
/// data section is not terminated by a lone `.` line.
pub fn split(raw: &[u8]) -> Result<Envelope> {
    let data_start = find_data_line(raw)
        .ok_or_else(|| Error::MalformedEnvelope("no DATA line".into()))?;

    let mut body = Vec::with_capacity(raw.len() - data_start);
    let mut pos = data_start;
    while pos < raw.len() {
        let line_end = raw[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(raw.len(), |i| pos + i + 1);
        let line = &raw[pos..line_end];

        if is_terminator(line) {
            return Ok(Envelope {
                pre: 0..data_start,
                data: data_start..pos,
                post: pos..raw.len(),
                body,
            });
        }
        if line.starts_with(b"..") {
            body.extend_from_slice(&line[1..]);
        } else {
            body.extend_from_slice(line);
        }
        pos = line_end;
    }

    Err(Error::MalformedEnvelope(
        "data section has no terminating '.' line".into(),
    ))
}

/// Rebuilds a transcript from the envelope parts and a message, stuffing
/// the message.
#[must_use]
pub fn join(pre: &[u8], message: &[u8], post: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pre.len() + message.len() + post.len() + 64);
    out.extend_from_slice(pre);
    stuff_into(&mut out, message);
    out.extend_from_slice(post);
    out
}

/// Adds a leading `.` to every line that starts with one.
#[must_use]
pub fn stuff(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 16);
    stuff_into(&mut out, message);
    out
}

fn stuff_into(out: &mut Vec<u8>, message: &[u8]) {
    let mut at_line_start = true;
    for &b in message {
        if at_line_start && b == b'.' {
            out.push(b'.');
        }
        out.push(b);
        at_line_start = b == b'\n';
    }
}

/// Removes one leading `.` from every line that starts with `..`.
#[must_use]
pub fn unstuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for line in data.split_inclusive(|&b| b == b'\n') {
        if line.starts_with(b"..") {
            out.extend_from_slice(&line[1..]);
        } else {
            out.extend_from_slice(line);
        }
    }
    out
}

/// Returns the offset just past the first `DATA` line.
fn find_data_line(raw: &[u8]) -> Option<usize> {
    let mut line_start = 0;
    while line_start < raw.len() {
        let rest = &raw[line_start..];
        if rest.len() >= 4 && rest[..4].eq_ignore_ascii_case(b"DATA") {
            match &rest[4..] {
                [b'\n', ..] => return Some(line_start + 5),
                [b'\r', b'\n', ..] => return Some(line_start + 6),
                _ => {}
            }
        }
        line_start += rest.iter().position(|&b| b == b'\n')? + 1;
    }
    None
}

fn is_terminator(line: &[u8]) -> bool {
    line == b".\r\n" || line == b".\n"
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PRE: &[u8] = b"MAIL FROM:<a@example.org>\r\nRCPT TO:<b@example.org>\r\nDATA\r\n";

    #[test]
    fn test_split_simple() {
        let raw = [PRE, b"Subject: hi\r\n\r\n..leading dot\r\nbody\r\n.\r\nQUIT\r\n".as_slice()].concat();
        let env = split(&raw).unwrap();
        assert_eq!(&raw[env.pre.clone()], PRE);
        assert_eq!(env.body, b"Subject: hi\r\n\r\n.leading dot\r\nbody\r\n");
        assert_eq!(&raw[env.post.clone()], b".\r\nQUIT\r\n");
        assert_eq!(env.pre.len() + env.data.len() + env.post.len(), raw.len());
    }

    #[test]
    fn test_split_bare_newlines() {
        let raw = b"HELO x\ndata\nline\n.\n";
        let env = split(raw).unwrap();
        assert_eq!(env.pre, 0..12);
        assert_eq!(env.body, b"line\n");
        assert_eq!(&raw[env.post], b".\n");
    }

    #[test]
    fn test_data_at_start() {
        let env = split(b"DATA\r\nx\r\n.\r\n").unwrap();
        assert_eq!(env.pre, 0..6);
        assert_eq!(env.body, b"x\r\n");
    }

    #[test]
    fn test_data_must_be_whole_line() {
        let err = split(b"DATABASE\r\nx\r\n.\r\n").unwrap_err();
        assert!(matches!(err, Error::MalformedEnvelope(_)));
    }

    #[test]
    fn test_missing_data_line() {
        assert!(matches!(
            split(b"hello").unwrap_err(),
            Error::MalformedEnvelope(_)
        ));
    }

    #[test]
    fn test_missing_terminator() {
        let raw = [PRE, b"no end\r\n.not the end\r\n".as_slice()].concat();
        assert!(matches!(
            split(&raw).unwrap_err(),
            Error::MalformedEnvelope(_)
        ));
    }

    #[test]
    fn test_join_stuffs_message() {
        let out = join(b"DATA\r\n", b".top\r\nmid\r\n.\r\n", b".\r\n");
        assert_eq!(out, b"DATA\r\n..top\r\nmid\r\n..\r\n.\r\n");
    }

    #[test]
    fn test_unstuff() {
        assert_eq!(unstuff(b"..a\r\n.b\r\nc..\r\n"), b".a\r\n.b\r\nc..\r\n");
    }

    fn body_lines() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[ -~]{0,20}", 0..12)
    }

    proptest! {
        #[test]
        fn prop_split_join_round_trip(lines in body_lines(), trailer in "[A-Z]{0,8}") {
            let message: Vec<u8> = lines
                .iter()
                .flat_map(|l| [l.as_bytes(), b"\r\n".as_slice()].concat())
                .collect();
            let raw = [PRE, stuff(&message).as_slice(), b".\r\n".as_slice(), trailer.as_bytes()].concat();

            let env = split(&raw).unwrap();
            prop_assert_eq!(&env.body, &message);
            prop_assert_eq!(env.pre.len() + env.data.len() + env.post.len(), raw.len());

            let rebuilt = join(&raw[env.pre.clone()], &env.body, &raw[env.post.clone()]);
            prop_assert_eq!(rebuilt, raw);
        }

        #[test]
        fn prop_unstuff_is_identity_without_double_dots(lines in body_lines()) {
            let text: Vec<u8> = lines
                .iter()
                .filter(|l| !l.starts_with(".."))
                .flat_map(|l| [l.as_bytes(), b"\n".as_slice()].concat())
                .collect();
            prop_assert_eq!(unstuff(&text), text);
        }

        #[test]
        fn prop_unstuff_inverts_stuff(lines in body_lines()) {
            let text: Vec<u8> = lines
                .iter()
                .flat_map(|l| [l.as_bytes(), b"\n".as_slice()].concat())
                .collect();
            prop_assert_eq!(unstuff(&stuff(&text)), text);
        }
    }
}
