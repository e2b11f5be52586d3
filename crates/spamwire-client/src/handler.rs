//! Header hooks for spamd sessions.
//!
//! A hook sees every response header line before the client interprets it,
//! and may contribute extra request headers. The default methods do nothing,
//! so implementors only override what they need.
//!
//! # Example
//!
//! ```
//! use spamwire_client::handler::HeaderHook;
//!
//! #[derive(Default)]
//! struct RuleCounter {
//!     headers: usize,
//! }
//!
//! impl HeaderHook for RuleCounter {
//!     fn on_response_header(&mut self, _line: &str) {
//!         self.headers += 1;
//!     }
//! }
//! ```

/// Observer and contributor for protocol headers.
pub trait HeaderHook: Send {
    /// Called with every response header line, terminator stripped.
    fn on_response_header(&mut self, line: &str) {
        let _ = line;
    }

    /// Extra request header lines, each terminated by CRLF.
    ///
    /// They are written after the client's own headers and before
    /// `Content-length`.
    fn extra_request_headers(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// A hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl HeaderHook for NoopHook {}

/// A hook that logs response headers at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHook;

impl HeaderHook for LoggingHook {
    fn on_response_header(&mut self, line: &str) {
        tracing::trace!(line, "response header");
    }
}

/// A hook that records response headers and sends fixed extra headers.
///
/// Useful for testing.
#[derive(Debug, Default, Clone)]
pub struct CollectingHook {
    /// Response header lines seen so far.
    pub headers: Vec<String>,
    /// Extra request headers to send.
    pub extra: Vec<u8>,
}

impl CollectingHook {
    /// Creates a hook that sends `extra` with every request.
    #[must_use]
    pub fn with_extra(extra: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: Vec::new(),
            extra: extra.into(),
        }
    }

    /// Takes the recorded headers, leaving the hook empty.
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.headers)
    }
}

impl HeaderHook for CollectingHook {
    fn on_response_header(&mut self, line: &str) {
        self.headers.push(line.to_string());
    }

    fn extra_request_headers(&self) -> Vec<u8> {
        self.extra.clone()
    }
}
