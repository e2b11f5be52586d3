//! One message through the daemon.
//!
//! [`MessageSession::run`] drives the whole lifecycle: read the input,
//! connect, send the request, read the response, and write the result (or
//! the untouched original when safe fallback applies).
//!
//! ```text
//! Idle → Reading → Connecting → Sending → ReceivingHeaders → ReceivingBody → Done
//!                      ↑                                            │
//!                      └────────── retry on I/O failure ────────────┘
//! ```
//!
//! Any state after `Reading` may end in `Failed`.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::command::{Command, Request};
use crate::config::SessionConfig;
use crate::connection::{Client, ConnectionManager, Dialer, IoDeadline, ResponseHead, SystemDialer};
use crate::error::{Error, ErrorKind, Result};
use crate::handler::{HeaderHook, NoopHook};
use crate::message::{Message, OutputBuffer, body_of};
use crate::transport::{Resolve, SystemResolver};
use crate::types::{EMPTY_SUMMARY, TellAck, Verdict};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Not started.
    #[default]
    Idle,
    /// Reading the input message.
    Reading,
    /// Opening a connection.
    Connecting,
    /// Writing the request.
    Sending,
    /// Reading the status line and headers.
    ReceivingHeaders,
    /// Reading the response body.
    ReceivingBody,
    /// Result written.
    Done,
    /// Filtering failed.
    Failed(ErrorKind),
}

/// How a session ended, when it did not end in an error.
#[derive(Debug)]
pub enum Outcome {
    /// The daemon processed the message and the result was written.
    Filtered {
        /// Verdict, if the daemon sent one.
        verdict: Option<Verdict>,
    },
    /// The daemon answered a PING.
    Pong,
    /// The daemon answered a TELL.
    Told(TellAck),
    /// The input exceeded the size limit and was passed through unfiltered.
    TooBig,
    /// Filtering failed and the original message was passed through.
    Fallback {
        /// The failure that triggered the fallback.
        cause: Error,
    },
}

impl Outcome {
    /// Returns true if the daemon classified the message as spam.
    #[must_use]
    pub const fn is_spam(&self) -> bool {
        matches!(
            self,
            Self::Filtered {
                verdict: Some(Verdict { is_spam: true, .. })
            }
        )
    }
}

/// Filters one message through spamd.
pub struct MessageSession<D = SystemDialer, R = SystemResolver, H = NoopHook> {
    config: SessionConfig,
    connections: ConnectionManager<D, R>,
    hook: H,
    state: SessionState,
}

impl<D, R, H> std::fmt::Debug for MessageSession<D, R, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSession")
            .field("config", &self.config)
            .field("connections", &self.connections)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<D: Dialer, R: Resolve> MessageSession<D, R> {
    /// Creates a session without a header hook.
    #[must_use]
    pub const fn new(config: SessionConfig, connections: ConnectionManager<D, R>) -> Self {
        Self {
            config,
            connections,
            hook: NoopHook,
            state: SessionState::Idle,
        }
    }
}

impl<D: Dialer, R: Resolve, H: HeaderHook> MessageSession<D, R, H> {
    /// Replaces the header hook.
    #[must_use]
    pub fn with_hook<H2: HeaderHook>(self, hook: H2) -> MessageSession<D, R, H2> {
        MessageSession {
            config: self.config,
            connections: self.connections,
            hook,
            state: self.state,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The header hook.
    #[must_use]
    pub const fn hook(&self) -> &H {
        &self.hook
    }

    /// Filters the message read from `input`, writing the result to
    /// `output`.
    ///
    /// # Errors
    ///
    /// Returns the failure when it cannot be absorbed by safe fallback, and
    /// any error writing `output`. In Check and Report modes `0/0` has
    /// already been written when an error is returned.
    pub async fn run<I, O>(&mut self, input: &mut I, output: &mut O) -> Result<Outcome>
    where
        I: AsyncRead + Unpin + ?Sized,
        O: AsyncWrite + Unpin + ?Sized,
    {
        self.transition(SessionState::Reading);
        let mut message = Message::new(self.config.max_len);
        if self.config.command.sends_body() {
            match message.read(input, self.config.input_mode).await {
                Ok(()) => {}
                Err(Error::TooBig { limit }) => {
                    return self.pass_too_big(&message, limit, input, output).await;
                }
                Err(err) => return self.fail(err, &message, output).await,
            }
        }

        match self.filter(&message).await {
            Ok((head, out)) => self.finish(&message, &head, &out, output).await,
            Err(err) => self.fail(err, &message, output).await,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    async fn filter(&mut self, message: &Message) -> Result<(ResponseHead, OutputBuffer)> {
        let extra = self.hook.extra_request_headers();
        let request = Request {
            command: &self.config.command,
            user: self.config.user.as_deref(),
            compress: self.config.compress,
            extra_headers: &extra,
            body: message.content(),
        }
        .serialize()?;

        let attempts = self.config.filter_retries.max(1);
        let mut attempt = 1;
        loop {
            let first_host = usize::try_from(attempt - 1).unwrap_or_default();
            match self
                .exchange(&request, first_host, message.output_capacity())
                .await
            {
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(attempt, attempts, error = %err, "spamd exchange failed, retrying");
                    tokio::time::sleep(self.config.filter_retry_sleep).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn exchange(
        &mut self,
        request: &[u8],
        first_host: usize,
        capacity: usize,
    ) -> Result<(ResponseHead, OutputBuffer)> {
        self.transition(SessionState::Connecting);
        let stream = self.connections.connect(first_host).await?;

        self.transition(SessionState::Sending);
        let client = Client::new(stream, IoDeadline::new(self.config.timeout))
            .send(request)
            .await?;

        self.transition(SessionState::ReceivingHeaders);
        let mut out = OutputBuffer::new(capacity);
        let (client, head) = client
            .read_head(&self.config.command, &mut self.hook, &mut out)
            .await?;

        if !self.config.command.is_headers_only() {
            self.transition(SessionState::ReceivingBody);
            client.read_body(&head, &mut out).await?;
        }
        Ok((head, out))
    }

    async fn finish<O>(
        &mut self,
        message: &Message,
        head: &ResponseHead,
        out: &OutputBuffer,
        output: &mut O,
    ) -> Result<Outcome>
    where
        O: AsyncWrite + Unpin + ?Sized,
    {
        let (bytes, outcome) = match &self.config.command {
            Command::Ping => {
                let status = &head.status;
                let line = format!("SPAMD/{} {} {}\n", status.version, status.code, status.text);
                (line.into_bytes(), Outcome::Pong)
            }
            Command::Tell(_) => (Vec::new(), Outcome::Told(head.tell)),
            Command::Check => (
                out.as_slice().to_vec(),
                Outcome::Filtered {
                    verdict: head.verdict,
                },
            ),
            Command::Headers => {
                let mut rewritten = out.as_slice().to_vec();
                rewritten.extend_from_slice(body_of(message.content()));
                (
                    message.render(&rewritten),
                    Outcome::Filtered {
                        verdict: head.verdict,
                    },
                )
            }
            Command::Process | Command::Symbols | Command::Report | Command::ReportIfSpam => (
                message.render(out.as_slice()),
                Outcome::Filtered {
                    verdict: head.verdict,
                },
            ),
        };

        self.emit(output, &bytes).await?;
        self.transition(SessionState::Done);
        info!(command = self.config.command.verb(), ?outcome, "message processed");
        Ok(outcome)
    }

    async fn pass_too_big<I, O>(
        &mut self,
        message: &Message,
        limit: usize,
        input: &mut I,
        output: &mut O,
    ) -> Result<Outcome>
    where
        I: AsyncRead + Unpin + ?Sized,
        O: AsyncWrite + Unpin + ?Sized,
    {
        warn!(limit, "message exceeds size limit, not filtering");
        let command = &self.config.command;
        if writes_summary(command) {
            self.emit(output, EMPTY_SUMMARY).await?;
        } else if passes_message(command) {
            self.emit(output, message.raw()).await?;
            if let Err(err) = tokio::io::copy(input, output).await {
                self.transition(SessionState::Failed(ErrorKind::Io));
                return Err(err.into());
            }
        }
        self.transition(SessionState::Done);
        Ok(Outcome::TooBig)
    }

    async fn fail<O>(&mut self, err: Error, message: &Message, output: &mut O) -> Result<Outcome>
    where
        O: AsyncWrite + Unpin + ?Sized,
    {
        self.transition(SessionState::Failed(err.kind()));
        error!(error = %err, "spamd filtering failed");

        let command = &self.config.command;
        let fallback = self.config.safe_fallback
            && (writes_summary(command) || passes_message(command))
            && (err.is_fallback_eligible() || matches!(err, Error::MalformedEnvelope(_)));

        if writes_summary(command) {
            self.emit(output, EMPTY_SUMMARY).await?;
        } else if fallback {
            self.emit(output, message.raw()).await?;
        }

        if fallback {
            info!("safe fallback: message passed through unfiltered");
            Ok(Outcome::Fallback { cause: err })
        } else {
            Err(err)
        }
    }

    async fn emit<O>(&mut self, output: &mut O, bytes: &[u8]) -> Result<()>
    where
        O: AsyncWrite + Unpin + ?Sized,
    {
        let written = async {
            output.write_all(bytes).await?;
            output.flush().await
        };
        if let Err(err) = written.await {
            self.transition(SessionState::Failed(ErrorKind::Io));
            return Err(err.into());
        }
        Ok(())
    }
}

/// Modes whose only output is the score summary.
const fn writes_summary(command: &Command) -> bool {
    matches!(
        command,
        Command::Check | Command::Report | Command::ReportIfSpam
    )
}

/// Modes that emit the message itself.
const fn passes_message(command: &Command) -> bool {
    matches!(
        command,
        Command::Process | Command::Headers | Command::Symbols
    )
}
