//! Framed I/O for the spamd protocol.
//!
//! A response is a status line, header lines, an empty line and a raw body
//! running to end of stream. Lines may end in CRLF or a bare LF.

#![allow(clippy::missing_errors_doc)]

use tokio::io::{AsyncRead, AsyncWrite, BufReader};

use super::timeout::{self, IoDeadline};
use crate::Result;
use crate::error::Error;
use crate::message::OutputBuffer;

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum response line length, terminator included.
pub const MAX_LINE_LENGTH: usize = 8192;

/// Framed connection to spamd.
///
/// Every read and write is guarded by the stream's [`IoDeadline`].
pub struct FramedStream<S> {
    reader: BufReader<S>,
    deadline: IoDeadline,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S, deadline: IoDeadline) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            deadline,
        }
    }

    /// Writes a complete request and flushes it.
    pub async fn write_request(&mut self, data: &[u8]) -> Result<()> {
        timeout::write_all(self.reader.get_mut(), data, self.deadline).await
    }

    /// Reads one line with the terminator (LF, or CRLF) stripped.
    ///
    /// Returns `None` on end of stream before any byte of a new line. Bytes
    /// after the line stay buffered for the next read.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            let n = timeout::read(&mut self.reader, &mut byte, self.deadline).await?;
            if n == 0 {
                if line.is_empty() {
                    return Ok(None);
                }
                return Err(Error::protocol("spamd closed the connection mid-line"));
            }
            if byte[0] == b'\n' {
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            line.push(byte[0]);
            if line.len() >= MAX_LINE_LENGTH {
                return Err(Error::protocol(format!(
                    "spamd responded with a line longer than {MAX_LINE_LENGTH} bytes"
                )));
            }
        }
    }

    /// Appends everything up to end of stream to `out`, returning the byte
    /// count.
    pub async fn read_to_end_into(&mut self, out: &mut OutputBuffer) -> Result<usize> {
        let mut chunk = [0u8; DEFAULT_BUFFER_SIZE];
        let mut total = 0;
        loop {
            let n = timeout::read(&mut self.reader, &mut chunk, self.deadline).await?;
            if n == 0 {
                return Ok(total);
            }
            out.append(&chunk[..n])?;
            total += n;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_lines_crlf_and_lf() {
        let mock = Builder::new()
            .read(b"SPAMD/1.5 0 EX_OK\r\nSpam: True ; 9.0 / 5.0\n\r\n")
            .build();
        let mut framed = FramedStream::new(mock, IoDeadline::NONE);

        assert_eq!(framed.read_line().await.unwrap().unwrap(), "SPAMD/1.5 0 EX_OK");
        assert_eq!(
            framed.read_line().await.unwrap().unwrap(),
            "Spam: True ; 9.0 / 5.0"
        );
        assert_eq!(framed.read_line().await.unwrap().unwrap(), "");
        assert_eq!(framed.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_line_split_across_reads() {
        let mock = Builder::new().read(b"SPAMD/1.").read(b"5 0 PONG\r\n").build();
        let mut framed = FramedStream::new(mock, IoDeadline::NONE);
        assert_eq!(framed.read_line().await.unwrap().unwrap(), "SPAMD/1.5 0 PONG");
    }

    #[tokio::test]
    async fn test_line_then_body_keeps_bytes() {
        let mock = Builder::new().read(b"\r\nbody bytes").build();
        let mut framed = FramedStream::new(mock, IoDeadline::NONE);
        assert_eq!(framed.read_line().await.unwrap().unwrap(), "");

        let mut out = OutputBuffer::new(100);
        assert_eq!(framed.read_to_end_into(&mut out).await.unwrap(), 10);
        assert_eq!(out.as_slice(), b"body bytes");
    }

    #[tokio::test]
    async fn test_eof_mid_line() {
        let mock = Builder::new().read(b"SPAMD/1.5 0").build();
        let mut framed = FramedStream::new(mock, IoDeadline::NONE);
        assert!(matches!(
            framed.read_line().await.unwrap_err(),
            Error::Protocol(_)
        ));
    }

    #[tokio::test]
    async fn test_line_too_long() {
        let long = vec![b'x'; MAX_LINE_LENGTH];
        let mock = Builder::new().read(&long).build();
        let mut framed = FramedStream::new(mock, IoDeadline::NONE);
        assert!(matches!(
            framed.read_line().await.unwrap_err(),
            Error::Protocol(_)
        ));
    }

    #[tokio::test]
    async fn test_body_exceeding_capacity() {
        let mock = Builder::new().read(b"0123456789").build();
        let mut framed = FramedStream::new(mock, IoDeadline::NONE);
        let mut out = OutputBuffer::new(4);
        assert!(matches!(
            framed.read_to_end_into(&mut out).await.unwrap_err(),
            Error::Protocol(_)
        ));
    }

    #[tokio::test]
    async fn test_write_request() {
        let mock = Builder::new().write(b"PING SPAMC/1.5\r\n\r\n").build();
        let mut framed = FramedStream::new(mock, IoDeadline::NONE);
        framed.write_request(b"PING SPAMC/1.5\r\n\r\n").await.unwrap();
    }
}
