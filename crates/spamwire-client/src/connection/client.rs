//! Type-state spamd exchange.
//!
//! One connection carries exactly one request: [`Client<Ready>`] sends it,
//! [`Client<Sent>`] reads the status line and headers, and
//! [`Client<HeadRead>`] reads the body.

use std::io;
use std::marker::PhantomData;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::framed::FramedStream;
use super::timeout::IoDeadline;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::handler::HeaderHook;
use crate::message::OutputBuffer;
use crate::parser::{Header, parse_header, parse_status_line};
use crate::types::{StatusLine, TellAck, Verdict};

/// Type-state marker: nothing sent yet.
#[derive(Debug)]
pub struct Ready;

/// Type-state marker: request sent, response not read.
#[derive(Debug)]
pub struct Sent;

/// Type-state marker: status line and headers read.
#[derive(Debug)]
pub struct HeadRead;

/// Status line and interpreted headers of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHead {
    /// Status line.
    pub status: StatusLine,
    /// Verdict from the `Spam:` header.
    pub verdict: Option<Verdict>,
    /// Declared body length.
    pub content_length: Option<usize>,
    /// `DidSet`/`DidRemove` acknowledgements.
    pub tell: TellAck,
}

/// spamd client for one exchange.
pub struct Client<State> {
    framed: FramedStream<Box<dyn Stream>>,
    _state: PhantomData<State>,
}

/// Object-safe stream bound, so the client type does not depend on the
/// transport.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

impl<State> std::fmt::Debug for Client<State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client<Ready> {
    /// Wraps a connected stream.
    pub fn new<S: Stream + 'static>(stream: S, deadline: IoDeadline) -> Self {
        Self {
            framed: FramedStream::new(Box::new(stream), deadline),
            _state: PhantomData,
        }
    }

    /// Sends the serialized request.
    ///
    /// # Errors
    ///
    /// Returns an I/O or timeout error if the write fails.
    pub async fn send(mut self, request: &[u8]) -> Result<Client<Sent>> {
        debug!(bytes = request.len(), "sending request");
        self.framed.write_request(request).await?;
        Ok(Client {
            framed: self.framed,
            _state: PhantomData,
        })
    }
}

impl Client<Sent> {
    /// Reads the status line and headers.
    ///
    /// Every header line is shown to `hook` first. A `Spam:` header primes
    /// `out` with the summary line in the modes that echo it (Check, Report,
    /// and `ReportIfSpam` for spam).
    ///
    /// # Errors
    ///
    /// - [`Error::Daemon`] for a non-zero status code
    /// - [`Error::Protocol`] for a malformed response, or a Check response
    ///   without a `Spam:` header
    /// - [`Error::Io`] if the stream ends before the headers do
    pub async fn read_head(
        mut self,
        command: &Command,
        hook: &mut dyn HeaderHook,
        out: &mut OutputBuffer,
    ) -> Result<(Client<HeadRead>, ResponseHead)> {
        let line = self
            .framed
            .read_line()
            .await?
            .ok_or_else(|| eof("spamd closed the connection without responding"))?;
        debug!(%line, "status line");
        let status = parse_status_line(&line)?;
        if !status.is_ok() {
            return Err(Error::Daemon {
                code: status.code.as_u16(),
                text: status.text,
            });
        }

        let mut head = ResponseHead {
            status,
            verdict: None,
            content_length: None,
            tell: TellAck::default(),
        };

        loop {
            let Some(line) = self.framed.read_line().await? else {
                if matches!(command, Command::Ping) {
                    break;
                }
                return Err(eof("spamd closed the connection inside the headers"));
            };
            if line.is_empty() {
                break;
            }
            hook.on_response_header(&line);
            match parse_header(&line)? {
                Header::Spam(verdict) => {
                    out.clear();
                    if echoes_summary(command, &verdict) {
                        out.append(verdict.summary_line().as_bytes())?;
                    }
                    head.verdict = Some(verdict);
                }
                Header::ContentLength(len) => head.content_length = Some(len),
                Header::DidSet(targets) => head.tell.did_set.merge(targets),
                Header::DidRemove(targets) => head.tell.did_remove.merge(targets),
                Header::Other { name, .. } => debug!(%name, "ignoring response header"),
            }
        }

        if matches!(command, Command::Check) && head.verdict.is_none() {
            return Err(Error::protocol("spamd response has no Spam header"));
        }

        Ok((
            Client {
                framed: self.framed,
                _state: PhantomData,
            },
            head,
        ))
    }
}

impl Client<HeadRead> {
    /// Reads the body to end of stream, appending it to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if there was no `Content-length`, the body
    /// does not fit in `out`, or its length differs from the declared one.
    pub async fn read_body(mut self, head: &ResponseHead, out: &mut OutputBuffer) -> Result<()> {
        let declared = head
            .content_length
            .ok_or_else(|| Error::protocol("spamd response has no Content-length"))?;
        let echoed = out.len();

        let received = self.framed.read_to_end_into(out).await?;
        debug!(declared, received, "response body read");
        if received != declared || out.len() != echoed + declared {
            return Err(Error::protocol(format!(
                "spamd declared {declared} body bytes but sent {received}"
            )));
        }
        Ok(())
    }
}

fn echoes_summary(command: &Command, verdict: &Verdict) -> bool {
    match command {
        Command::Check | Command::Report => true,
        Command::ReportIfSpam => verdict.is_spam,
        _ => false,
    }
}

fn eof(message: &'static str) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, message))
}
