//! The message being filtered and the buffer its result is collected in.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::bsmtp::{self, Envelope};
use crate::config::InputMode;
use crate::error::{Error, Result};

/// Bytes the daemon may add to a message (headers, report) beyond the
/// input limit.
pub const EXPANSION_ALLOWANCE: usize = 16384;

/// What the input turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Nothing read yet.
    None,
    /// Input could not be used (too big or a malformed envelope); only the
    /// raw bytes are meaningful.
    Error,
    /// A plain RFC 822 message.
    Raw,
    /// A BSMTP transcript.
    Bsmtp(Envelope),
}

/// A message read from the input.
#[derive(Debug, Clone)]
pub struct Message {
    max_len: usize,
    raw: Vec<u8>,
    kind: MessageKind,
}

impl Message {
    /// Creates an empty message accepting at most `max_len` input bytes.
    #[must_use]
    pub const fn new(max_len: usize) -> Self {
        Self {
            max_len,
            raw: Vec::new(),
            kind: MessageKind::None,
        }
    }

    /// Reads the whole input.
    ///
    /// At most `max_len + 1` bytes are consumed; if that many arrive the
    /// message is too big and the rest of the input is left unread.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] on a read failure or empty input
    /// - [`Error::TooBig`] if the input exceeds `max_len`
    /// - [`Error::MalformedEnvelope`] for an unusable BSMTP transcript
    ///
    /// On the last two the raw bytes stay available through
    /// [`raw`](Self::raw) and the kind is [`MessageKind::Error`].
    pub async fn read<R>(&mut self, input: &mut R, mode: InputMode) -> Result<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.raw.clear();
        self.kind = MessageKind::Error;

        let limit = u64::try_from(self.max_len.saturating_add(1)).unwrap_or(u64::MAX);
        (&mut *input).take(limit).read_to_end(&mut self.raw).await?;

        if self.raw.is_empty() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "no message on input",
            )));
        }
        if self.raw.len() > self.max_len {
            return Err(Error::TooBig {
                limit: self.max_len,
            });
        }

        self.kind = match mode {
            InputMode::Raw => MessageKind::Raw,
            InputMode::Bsmtp => MessageKind::Bsmtp(bsmtp::split(&self.raw)?),
        };
        debug!(len = self.raw.len(), ?mode, "message read");
        Ok(())
    }

    /// Input bytes exactly as read.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Message kind.
    #[must_use]
    pub const fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// The message to send to the daemon: the input itself, or the
    /// unstuffed data section of a BSMTP transcript.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        match &self.kind {
            MessageKind::Raw => &self.raw,
            MessageKind::Bsmtp(envelope) => &envelope.body,
            MessageKind::None | MessageKind::Error => &[],
        }
    }

    /// Capacity for the daemon's response.
    #[must_use]
    pub const fn output_capacity(&self) -> usize {
        self.max_len.saturating_add(EXPANSION_ALLOWANCE)
    }

    /// Builds the bytes to emit for a daemon result.
    ///
    /// A raw message emits `result` unchanged; a BSMTP transcript re-embeds
    /// it between the original envelope parts; an unusable input emits the
    /// original bytes.
    #[must_use]
    pub fn render(&self, result: &[u8]) -> Vec<u8> {
        match &self.kind {
            MessageKind::None => Vec::new(),
            MessageKind::Error => self.raw.clone(),
            MessageKind::Raw => result.to_vec(),
            MessageKind::Bsmtp(envelope) => bsmtp::join(
                &self.raw[envelope.pre.clone()],
                result,
                &self.raw[envelope.post.clone()],
            ),
        }
    }
}

/// Returns the body of an RFC 822 message: everything after the first
/// empty line, or nothing if there is none.
#[must_use]
pub fn body_of(message: &[u8]) -> &[u8] {
    let mut i = 0;
    while let Some(nl) = message[i..].iter().position(|&b| b == b'\n') {
        let next = i + nl + 1;
        match &message[next..] {
            [b'\n', ..] => return &message[next + 1..],
            [b'\r', b'\n', ..] => return &message[next + 2..],
            _ => i = next,
        }
    }
    &[]
}

/// Response buffer with a fixed capacity.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl OutputBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            capacity,
        }
    }

    /// Appends bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the bytes would exceed the capacity;
    /// the buffer is left unchanged.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.remaining() {
            return Err(Error::protocol(format!(
                "spamd response exceeds {} bytes",
                self.capacity
            )));
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Discards the contents.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Bytes still available.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Number of bytes held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Contents.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_raw() {
        let mut msg = Message::new(100);
        msg.read(&mut &b"Subject: x\r\n\r\nhi"[..], InputMode::Raw)
            .await
            .unwrap();
        assert_eq!(msg.kind(), &MessageKind::Raw);
        assert_eq!(msg.content(), b"Subject: x\r\n\r\nhi");
        assert_eq!(msg.output_capacity(), 100 + EXPANSION_ALLOWANCE);
    }

    #[tokio::test]
    async fn test_read_exactly_max_len() {
        let mut msg = Message::new(5);
        msg.read(&mut &b"12345"[..], InputMode::Raw).await.unwrap();
        assert_eq!(msg.raw(), b"12345");
    }

    #[tokio::test]
    async fn test_read_too_big_keeps_prefix() {
        let mut msg = Message::new(5);
        let mut input = &b"1234567890"[..];
        let err = msg.read(&mut input, InputMode::Raw).await.unwrap_err();
        assert!(matches!(err, Error::TooBig { limit: 5 }));
        assert_eq!(msg.kind(), &MessageKind::Error);
        assert_eq!(msg.raw(), b"123456");
        assert_eq!(input, b"7890");
    }

    #[tokio::test]
    async fn test_read_empty_input() {
        let mut msg = Message::new(5);
        let err = msg.read(&mut &b""[..], InputMode::Raw).await.unwrap_err();
        assert!(matches!(err, Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_read_bsmtp() {
        let mut msg = Message::new(1000);
        msg.read(&mut &b"DATA\r\n..dot\r\n.\r\nQUIT\r\n"[..], InputMode::Bsmtp)
            .await
            .unwrap();
        assert_eq!(msg.content(), b".dot\r\n");
        assert_eq!(
            msg.render(b"X-Spam: yes\r\n.dot\r\n"),
            b"DATA\r\nX-Spam: yes\r\n..dot\r\n.\r\nQUIT\r\n"
        );
    }

    #[tokio::test]
    async fn test_malformed_bsmtp_renders_original() {
        let mut msg = Message::new(1000);
        let err = msg.read(&mut &b"hello"[..], InputMode::Bsmtp).await.unwrap_err();
        assert!(matches!(err, Error::MalformedEnvelope(_)));
        assert_eq!(msg.render(b"ignored"), b"hello");
    }

    #[test]
    fn test_body_of() {
        assert_eq!(body_of(b"A: 1\r\nB: 2\r\n\r\nbody\r\n"), b"body\r\n");
        assert_eq!(body_of(b"A: 1\n\nbody"), b"body");
        assert_eq!(body_of(b"A: 1\r\n"), b"");
    }

    #[test]
    fn test_output_buffer_capacity() {
        let mut out = OutputBuffer::new(4);
        out.append(b"abc").unwrap();
        assert!(out.append(b"de").is_err());
        assert_eq!(out.as_slice(), b"abc");
        out.append(b"d").unwrap();
        assert_eq!(out.remaining(), 0);
        out.clear();
        assert!(out.is_empty());
    }
}
