//! Where the daemon lives, and how the address list is built.
//!
//! A [`TransportSpec`] describes the daemon location as configured. Resolving
//! it produces a [`ResolvedTransport`]: an ordered, bounded list of
//! [`Target`]s plus the retry policy the connection manager follows.
//!
//! Resolution is split in two steps. [`TransportSpec::lookup`] performs the
//! asynchronous name lookups; [`TransportSpec::arrange`] is the synchronous
//! ordering step (rotation for load balancing, truncation when failover is
//! off) and takes the random source explicitly.

mod resolver;

pub use resolver::{LookupError, Resolve, StaticResolver, SystemResolver};

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::connection::Target;
use crate::error::{Error, Result};

/// Default spamd TCP port.
pub const DEFAULT_PORT: u16 = 783;

/// Upper bound on the number of addresses kept after resolution.
pub const MAX_HOSTS: usize = 256;

/// Default number of connect attempts.
pub const DEFAULT_CONNECT_RETRIES: u32 = 3;

/// Default pause between connect attempts.
pub const DEFAULT_RETRY_SLEEP: Duration = Duration::from_secs(1);

/// Kind of transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// The local host over TCP.
    #[default]
    Loopback,
    /// One or more named or literal hosts over TCP.
    Tcp {
        /// Host names or address literals, in configured order.
        hosts: Vec<String>,
    },
    /// A Unix domain socket.
    Unix {
        /// Socket path.
        path: PathBuf,
    },
}

/// Which address families resolution may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressFamily {
    /// IPv4 and IPv6.
    #[default]
    Any,
    /// IPv4 only.
    V4,
    /// IPv6 only.
    V6,
}

impl AddressFamily {
    /// Returns true if `ip` belongs to an allowed family.
    #[must_use]
    pub const fn allows(self, ip: &IpAddr) -> bool {
        match self {
            Self::Any => true,
            Self::V4 => ip.is_ipv4(),
            Self::V6 => ip.is_ipv6(),
        }
    }
}

/// Configured daemon location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSpec {
    /// Transport kind.
    pub kind: TransportKind,
    /// TCP port.
    pub port: u16,
    /// Allowed address families.
    pub family: AddressFamily,
    /// Rotate the resolved list by a random offset.
    pub randomize: bool,
    /// Keep every resolved address; when false only the first survives.
    pub failover: bool,
    /// Connect attempts per connect call (TCP only).
    pub connect_retries: u32,
    /// Pause between connect attempts.
    pub retry_sleep: Duration,
}

impl Default for TransportSpec {
    fn default() -> Self {
        Self {
            kind: TransportKind::Loopback,
            port: DEFAULT_PORT,
            family: AddressFamily::Any,
            randomize: false,
            failover: true,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            retry_sleep: DEFAULT_RETRY_SLEEP,
        }
    }
}

impl TransportSpec {
    /// TCP transport to a comma-separated host list.
    #[must_use]
    pub fn tcp(hosts: &str) -> Self {
        let hosts = hosts
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(String::from)
            .collect();
        Self {
            kind: TransportKind::Tcp { hosts },
            ..Self::default()
        }
    }

    /// Unix domain socket transport.
    #[must_use]
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: TransportKind::Unix { path: path.into() },
            ..Self::default()
        }
    }

    /// Resolves and arranges the transport.
    ///
    /// # Errors
    ///
    /// See [`lookup`](Self::lookup).
    pub async fn resolve<R: Resolve>(&self, resolver: &R) -> Result<ResolvedTransport> {
        let targets = self.lookup(resolver).await?;
        Ok(self.arrange(targets, &mut rand::thread_rng()))
    }

    /// Builds the unordered target list.
    ///
    /// Hosts are looked up in configured order. A failing host is skipped as
    /// long as another one yields addresses; the list is capped at
    /// [`MAX_HOSTS`].
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for a TCP transport without hosts
    /// - [`Error::ResolutionTransient`] if nothing resolved and at least one
    ///   failure was temporary
    /// - [`Error::ResolutionPermanent`] if nothing resolved otherwise
    pub async fn lookup<R: Resolve>(&self, resolver: &R) -> Result<Vec<Target>> {
        match &self.kind {
            TransportKind::Unix { path } => Ok(vec![Target::Unix(path.clone())]),
            TransportKind::Loopback => Ok(self.loopback_targets()),
            TransportKind::Tcp { hosts } => self.lookup_hosts(resolver, hosts).await,
        }
    }

    fn loopback_targets(&self) -> Vec<Target> {
        let v4 = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);
        let ips: &[IpAddr] = match self.family {
            AddressFamily::Any => &[v4, v6],
            AddressFamily::V4 => &[v4],
            AddressFamily::V6 => &[v6],
        };
        ips.iter()
            .map(|ip| Target::inet("localhost", SocketAddr::new(*ip, self.port)))
            .collect()
    }

    async fn lookup_hosts<R: Resolve>(&self, resolver: &R, hosts: &[String]) -> Result<Vec<Target>> {
        if hosts.is_empty() {
            return Err(Error::Config("no spamd hosts configured".into()));
        }

        let mut targets = Vec::new();
        let mut transient = false;

        'hosts: for host in hosts {
            let ips = match resolver.lookup(host).await {
                Ok(ips) => ips,
                Err(LookupError::Transient(_)) => {
                    warn!(%host, "temporary failure resolving spamd host");
                    transient = true;
                    continue;
                }
                Err(LookupError::Permanent(_)) => {
                    warn!(%host, "unknown spamd host");
                    continue;
                }
            };
            for ip in ips.into_iter().filter(|ip| self.family.allows(ip)) {
                if targets.len() == MAX_HOSTS {
                    warn!(limit = MAX_HOSTS, "too many spamd addresses, ignoring the rest");
                    break 'hosts;
                }
                targets.push(Target::inet(host.as_str(), SocketAddr::new(ip, self.port)));
            }
        }

        if targets.is_empty() {
            let joined = hosts.join(",");
            return Err(if transient {
                Error::ResolutionTransient(joined)
            } else {
                Error::ResolutionPermanent(joined)
            });
        }
        debug!(count = targets.len(), "resolved spamd addresses");
        Ok(targets)
    }

    /// Orders the target list: rotation when randomizing, truncation to a
    /// single entry when failover is off.
    pub fn arrange<G: Rng + ?Sized>(&self, mut targets: Vec<Target>, rng: &mut G) -> ResolvedTransport {
        if self.randomize && targets.len() > 1 {
            let offset = rng.gen_range(0..targets.len());
            targets.rotate_left(offset);
        }
        if !self.failover {
            targets.truncate(1);
        }
        let is_unix = matches!(self.kind, TransportKind::Unix { .. });
        ResolvedTransport {
            targets,
            attempts: if is_unix { 1 } else { self.connect_retries.max(1) },
            retry_sleep: self.retry_sleep,
        }
    }
}

/// Ordered target list ready for connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTransport {
    targets: Vec<Target>,
    attempts: u32,
    retry_sleep: Duration,
}

impl ResolvedTransport {
    /// Creates a transport from an explicit list.
    #[must_use]
    pub fn new(targets: Vec<Target>, attempts: u32, retry_sleep: Duration) -> Self {
        Self {
            targets,
            attempts: attempts.max(1),
            retry_sleep,
        }
    }

    /// Targets in connect order.
    #[must_use]
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Number of targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Returns true if there is nothing to connect to.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Connect attempts per connect call.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Pause between connect attempts.
    #[must_use]
    pub const fn retry_sleep(&self) -> Duration {
        self.retry_sleep
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 0, 2, last))
    }

    fn inet(last: u8) -> Target {
        inet_from("a.example", last)
    }

    fn inet_from(host: &str, last: u8) -> Target {
        Target::inet(host, SocketAddr::new(ip(last), DEFAULT_PORT))
    }

    #[tokio::test]
    async fn test_loopback_any_family() {
        let spec = TransportSpec::default();
        let targets = spec.lookup(&StaticResolver::new()).await.unwrap();
        assert_eq!(
            targets,
            vec![
                Target::inet("localhost", "127.0.0.1:783".parse().unwrap()),
                Target::inet("localhost", "[::1]:783".parse().unwrap()),
            ]
        );
    }

    #[tokio::test]
    async fn test_loopback_v6_only() {
        let spec = TransportSpec {
            family: AddressFamily::V6,
            ..TransportSpec::default()
        };
        let targets = spec.lookup(&StaticResolver::new()).await.unwrap();
        assert_eq!(targets, vec![Target::inet("localhost", "[::1]:783".parse().unwrap())]);
    }

    #[tokio::test]
    async fn test_unix_is_single_attempt() {
        let spec = TransportSpec::unix("/run/spamd.sock");
        let resolved = spec.resolve(&StaticResolver::new()).await.unwrap();
        assert_eq!(resolved.targets(), &[Target::Unix("/run/spamd.sock".into())]);
        assert_eq!(resolved.attempts(), 1);
    }

    #[tokio::test]
    async fn test_hosts_in_order() {
        let resolver = StaticResolver::new()
            .with_host("a.example", vec![ip(1), ip(2)])
            .with_host("b.example", vec![ip(3)]);
        let spec = TransportSpec::tcp("a.example, b.example");
        let targets = spec.lookup(&resolver).await.unwrap();
        assert_eq!(targets, vec![inet(1), inet(2), inet_from("b.example", 3)]);
        assert_eq!(targets[2].host(), "b.example");
    }

    #[tokio::test]
    async fn test_partial_failure_is_ok() {
        let resolver = StaticResolver::new()
            .with_transient_failure("flaky.example")
            .with_host("good.example", vec![ip(9)]);
        let spec = TransportSpec::tcp("flaky.example,missing.example,good.example");
        let targets = spec.lookup(&resolver).await.unwrap();
        assert_eq!(targets, vec![inet_from("good.example", 9)]);
    }

    #[tokio::test]
    async fn test_all_unknown_is_permanent() {
        let spec = TransportSpec::tcp("nope.example,nada.example");
        let err = spec.lookup(&StaticResolver::new()).await.unwrap_err();
        assert!(matches!(err, Error::ResolutionPermanent(_)));
    }

    #[tokio::test]
    async fn test_any_transient_makes_failure_transient() {
        let resolver = StaticResolver::new().with_transient_failure("flaky.example");
        let spec = TransportSpec::tcp("nope.example,flaky.example");
        let err = spec.lookup(&resolver).await.unwrap_err();
        assert!(matches!(err, Error::ResolutionTransient(_)));
    }

    #[tokio::test]
    async fn test_family_filter() {
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        let resolver = StaticResolver::new().with_host("dual.example", vec![ip(1), v6]);
        let spec = TransportSpec {
            family: AddressFamily::V6,
            ..TransportSpec::tcp("dual.example")
        };
        let targets = spec.lookup(&resolver).await.unwrap();
        assert_eq!(targets, vec![Target::inet("dual.example", SocketAddr::new(v6, DEFAULT_PORT))]);
    }

    #[tokio::test]
    async fn test_address_cap() {
        let many: Vec<IpAddr> = (0..300u16)
            .map(|i| IpAddr::V4(Ipv4Addr::new(10, 0, (i >> 8) as u8, (i & 0xff) as u8)))
            .collect();
        let resolver = StaticResolver::new().with_host("big.example", many);
        let targets = TransportSpec::tcp("big.example").lookup(&resolver).await.unwrap();
        assert_eq!(targets.len(), MAX_HOSTS);
    }

    #[tokio::test]
    async fn test_empty_host_list() {
        let err = TransportSpec::tcp(" , ").lookup(&StaticResolver::new()).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_no_failover_truncates() {
        let spec = TransportSpec {
            failover: false,
            ..TransportSpec::tcp("a.example")
        };
        let targets = (1..=5).map(inet).collect();
        let resolved = spec.arrange(targets, &mut StdRng::seed_from_u64(7));
        assert_eq!(resolved.targets(), &[inet(1)]);
    }

    #[test]
    fn test_order_kept_without_randomize() {
        let spec = TransportSpec::tcp("a.example");
        let targets: Vec<Target> = (1..=4).map(inet).collect();
        let resolved = spec.arrange(targets.clone(), &mut StdRng::seed_from_u64(1));
        assert_eq!(resolved.targets(), targets.as_slice());
        assert_eq!(resolved.attempts(), DEFAULT_CONNECT_RETRIES);
    }

    proptest! {
        #[test]
        fn prop_randomize_is_rotation(len in 1usize..20, seed in any::<u64>()) {
            let spec = TransportSpec { randomize: true, ..TransportSpec::tcp("a.example") };
            let targets: Vec<Target> = (0..len).map(|i| inet(u8::try_from(i).unwrap())).collect();
            let resolved = spec.arrange(targets.clone(), &mut StdRng::seed_from_u64(seed));
            let got = resolved.targets();

            prop_assert_eq!(got.len(), len);
            let offset = targets.iter().position(|t| *t == got[0]).unwrap();
            for (i, target) in got.iter().enumerate() {
                prop_assert_eq!(target, &targets[(offset + i) % len]);
            }
        }

        #[test]
        fn prop_no_failover_keeps_one(seed in any::<u64>()) {
            let spec = TransportSpec {
                randomize: true,
                failover: false,
                ..TransportSpec::tcp("a.example")
            };
            let targets: Vec<Target> = (1..=5).map(inet).collect();
            let resolved = spec.arrange(targets.clone(), &mut StdRng::seed_from_u64(seed));
            prop_assert_eq!(resolved.len(), 1);
            prop_assert!(targets.contains(&resolved.targets()[0]));
        }
    }
}
