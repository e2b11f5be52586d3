//! Connecting to the daemon with retries and failover.

use std::io;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use super::dialer::{Dialer, SystemDialer, Target};
use super::stream::{SpamdStream, create_tls_connector};
use super::timeout::{self, IoDeadline};
use crate::config::TlsSettings;
use crate::error::{Error, Result};
use crate::transport::{ResolvedTransport, Resolve, SystemResolver, TransportKind, TransportSpec};

/// Why a single attempt failed.
enum Failure {
    Dial(io::Error),
    Handshake(io::Error),
}

impl Failure {
    fn classify(&self, target: &Target) -> Error {
        match self {
            Self::Handshake(err) => {
                Error::ConnectUnavailable(format!("TLS handshake with {target} failed: {err}"))
            }
            Self::Dial(err) => {
                let message = format!("{target}: {err}");
                match err.kind() {
                    io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::NetworkUnreachable
                    | io::ErrorKind::HostUnreachable
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted => Error::ConnectUnavailable(message),
                    io::ErrorKind::PermissionDenied => Error::ConnectDenied(message),
                    _ => Error::ConnectSoftware(message),
                }
            }
        }
    }

    fn is_refused(&self) -> bool {
        matches!(self, Self::Dial(err) if err.kind() == io::ErrorKind::ConnectionRefused)
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dial(err) => write!(f, "{err}"),
            Self::Handshake(err) => write!(f, "TLS handshake: {err}"),
        }
    }
}

/// Certificate name for a target's host; address literals become IP names.
fn tls_name(host: &str) -> io::Result<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))
}

/// Opens connections to the daemon described by a [`TransportSpec`].
///
/// The transport is resolved on first use and the result reused by later
/// connects.
pub struct ConnectionManager<D = SystemDialer, R = SystemResolver> {
    spec: TransportSpec,
    resolver: R,
    dialer: D,
    tls: Option<TlsConnector>,
    connect_timeout: IoDeadline,
    resolved: Option<ResolvedTransport>,
}

impl<D, R> std::fmt::Debug for ConnectionManager<D, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("spec", &self.spec)
            .field("tls", &self.tls.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates a manager using system DNS and real sockets.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn system(
        spec: TransportSpec,
        tls: Option<&TlsSettings>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        Self::new(
            spec,
            SystemResolver::from_system_conf(),
            SystemDialer,
            tls,
            connect_timeout,
        )
    }
}

impl<D: Dialer, R: Resolve> ConnectionManager<D, R> {
    /// Creates a manager.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if TLS is requested over a Unix socket, a
    /// host is not a valid TLS server name, or the CA file cannot be loaded.
    pub fn new(
        spec: TransportSpec,
        resolver: R,
        dialer: D,
        tls: Option<&TlsSettings>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let tls = match tls {
            None => None,
            Some(_) if matches!(spec.kind, TransportKind::Unix { .. }) => {
                return Err(Error::Config("TLS is not supported over Unix sockets".into()));
            }
            Some(settings) => {
                if let TransportKind::Tcp { hosts } = &spec.kind {
                    for host in hosts {
                        tls_name(host)
                            .map_err(|_| Error::Config(format!("invalid TLS server name: {host}")))?;
                    }
                }
                Some(create_tls_connector(settings.ca_file.as_deref())?)
            }
        };

        Ok(Self {
            spec,
            resolver,
            dialer,
            tls,
            connect_timeout: IoDeadline::new(connect_timeout),
            resolved: None,
        })
    }

    /// Uses an already resolved transport instead of resolving on first connect.
    #[must_use]
    pub fn with_resolved(mut self, resolved: ResolvedTransport) -> Self {
        self.resolved = Some(resolved);
        self
    }

    /// Returns the resolved transport, if resolution has happened.
    #[must_use]
    pub const fn resolved(&self) -> Option<&ResolvedTransport> {
        self.resolved.as_ref()
    }

    /// Connects, starting at host index `first_host` (modulo the host
    /// count) and moving through the list on failure.
    ///
    /// # Errors
    ///
    /// Returns a resolution error, or the classified failure of the last
    /// attempt once `connect_retries` attempts have failed.
    pub async fn connect(&mut self, first_host: usize) -> Result<SpamdStream<D::Stream>> {
        let transport = match self.resolved.take() {
            Some(transport) => transport,
            None => self.spec.resolve(&self.resolver).await?,
        };
        let result = self.connect_to(&transport, first_host).await;
        self.resolved = Some(transport);
        result
    }

    async fn connect_to(
        &self,
        transport: &ResolvedTransport,
        first_host: usize,
    ) -> Result<SpamdStream<D::Stream>> {
        let targets = transport.targets();
        if targets.is_empty() {
            return Err(Error::ConnectSoftware("no addresses to connect to".into()));
        }

        let attempts = transport.attempts();
        let mut last_error = None;
        for (offset, attempt) in (1..=attempts).enumerate() {
            let target = &targets[(first_host + offset) % targets.len()];
            match self.open(target).await {
                Ok(stream) => {
                    debug!(%target, attempt, tls = stream.is_tls(), "connected to spamd");
                    return Ok(stream);
                }
                Err(failure) => {
                    warn!(%target, attempt, attempts, error = %failure, "connect to spamd failed");
                    let skip_sleep = failure.is_refused() && targets.len() > 1;
                    last_error = Some(failure.classify(target));
                    if attempt < attempts && !skip_sleep {
                        tokio::time::sleep(transport.retry_sleep()).await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::ConnectSoftware("no connection attempts made".into())))
    }

    async fn open(&self, target: &Target) -> std::result::Result<SpamdStream<D::Stream>, Failure> {
        if target.is_broadcast() {
            return Err(Failure::Dial(io::Error::new(
                io::ErrorKind::HostUnreachable,
                "refusing to connect to the broadcast address",
            )));
        }

        let raw = timeout::connect(self.dialer.dial(target), self.connect_timeout)
            .await
            .map_err(Failure::Dial)?;

        match &self.tls {
            None => Ok(SpamdStream::Plain(raw)),
            Some(connector) => {
                let name = tls_name(target.host()).map_err(Failure::Handshake)?;
                let handshake = connector.connect(name, raw);
                let stream = timeout::connect(handshake, self.connect_timeout)
                    .await
                    .map_err(Failure::Handshake)?;
                Ok(SpamdStream::Tls(Box::new(stream)))
            }
        }
    }
}
