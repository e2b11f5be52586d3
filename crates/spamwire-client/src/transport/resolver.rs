//! Host name resolution.

use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;

use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::op::ResponseCode;

/// Why a single host name did not resolve.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// Lookup may succeed if retried later (server failure, refusal, timeout).
    #[error("temporary failure resolving {0}")]
    Transient(String),
    /// The name does not exist or has no address records.
    #[error("unknown host {0}")]
    Permanent(String),
}

/// Resolves host names to addresses.
pub trait Resolve {
    /// Looks up every address of `host`.
    fn lookup(&self, host: &str) -> impl Future<Output = Result<Vec<IpAddr>, LookupError>> + Send;
}

/// Resolver backed by the system's DNS configuration.
#[derive(Clone)]
pub struct SystemResolver {
    inner: TokioAsyncResolver,
}

impl std::fmt::Debug for SystemResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemResolver").finish_non_exhaustive()
    }
}

impl SystemResolver {
    /// Builds a resolver from `/etc/resolv.conf` (or the platform
    /// equivalent), falling back to public defaults if it cannot be read.
    #[must_use]
    pub fn from_system_conf() -> Self {
        let inner = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "cannot read system resolver configuration, using defaults");
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });
        Self { inner }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::from_system_conf()
    }
}

impl Resolve for SystemResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, LookupError> {
        // Literal addresses never touch DNS.
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        match self.inner.lookup_ip(host).await {
            Ok(found) => Ok(found.iter().collect()),
            Err(err) => Err(classify(host, &err)),
        }
    }
}

/// Only an authoritative "no such name" or "no such record" answer is
/// permanent. SERVFAIL and REFUSED arrive as `NoRecordsFound` too.
fn classify(host: &str, err: &ResolveError) -> LookupError {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound {
            response_code: ResponseCode::NXDomain | ResponseCode::NoError,
            ..
        } => LookupError::Permanent(host.to_string()),
        _ => {
            tracing::debug!(host, error = %err, "transient resolver failure");
            LookupError::Transient(host.to_string())
        }
    }
}

/// Resolver answering from a fixed table.
///
/// Hosts not in the table are reported as unknown.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    table: HashMap<String, Result<Vec<IpAddr>, LookupError>>,
}

impl StaticResolver {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `host` to `addrs`.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>, addrs: Vec<IpAddr>) -> Self {
        self.table.insert(host.into(), Ok(addrs));
        self
    }

    /// Makes lookups of `host` fail transiently.
    #[must_use]
    pub fn with_transient_failure(mut self, host: impl Into<String>) -> Self {
        let host = host.into();
        self.table
            .insert(host.clone(), Err(LookupError::Transient(host)));
        self
    }
}

impl Resolve for StaticResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, LookupError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        self.table
            .get(host)
            .cloned()
            .unwrap_or_else(|| Err(LookupError::Permanent(host.to_string())))
    }
}
