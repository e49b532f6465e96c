//! Audit target types.
//!
//! A target is a single host given as an IP literal or a hostname, together
//! with the port set and per-connection timeout for the scan. The target is
//! validated when it is built and is immutable once the scan starts.

use super::port::{Port, PortSpec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

/// Default per-port connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Error type for target parsing and resolution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TargetError {
    #[error("invalid target format: {0}")]
    InvalidFormat(String),
    #[error("failed to resolve hostname '{0}': {1}")]
    DnsResolutionFailed(String, String),
    #[error("no IP addresses found for hostname '{0}'")]
    NoAddressesFound(String),
    #[error("no ports to scan")]
    NoPorts,
}

/// How the audited host was written by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// A literal IPv4 or IPv6 address.
    Address(IpAddr),
    /// A hostname to be resolved.
    Hostname(String),
}

impl TargetSpec {
    /// Parse a host string.
    pub fn parse(s: &str) -> Result<Self, TargetError> {
        let s = s.trim();

        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self::Address(ip));
        }

        if is_valid_hostname(s) {
            return Ok(Self::Hostname(s.to_string()));
        }

        Err(TargetError::InvalidFormat(s.to_string()))
    }

    /// Whether the host was given as an IP literal.
    pub fn is_address(&self) -> bool {
        matches!(self, Self::Address(_))
    }

    /// Resolve to every address the host maps to.
    pub async fn resolve(&self) -> Result<Vec<IpAddr>, TargetError> {
        match self {
            Self::Address(ip) => Ok(vec![*ip]),
            Self::Hostname(hostname) => {
                let resolver =
                    TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

                let response = resolver.lookup_ip(hostname.as_str()).await.map_err(|e| {
                    TargetError::DnsResolutionFailed(hostname.clone(), e.to_string())
                })?;

                let ips: Vec<IpAddr> = response.iter().collect();
                if ips.is_empty() {
                    return Err(TargetError::NoAddressesFound(hostname.clone()));
                }
                Ok(ips)
            }
        }
    }
}

impl FromStr for TargetSpec {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(ip) => write!(f, "{}", ip),
            Self::Hostname(hostname) => write!(f, "{}", hostname),
        }
    }
}

/// A fully specified scan: host, ordered deduplicated ports, timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanTarget {
    host: String,
    ports: Vec<Port>,
    #[serde(with = "duration_ms")]
    timeout: Duration,
}

impl ScanTarget {
    /// Build a target, validating the host and normalizing the port set.
    pub fn new(
        host: impl Into<String>,
        ports: impl IntoIterator<Item = Port>,
        timeout: Duration,
    ) -> Result<Self, TargetError> {
        let host = host.into();
        let host = TargetSpec::parse(&host)?.to_string();

        let mut ports: Vec<Port> = ports.into_iter().collect();
        ports.sort_unstable();
        ports.dedup();
        if ports.is_empty() {
            return Err(TargetError::NoPorts);
        }

        Ok(Self {
            host,
            ports,
            timeout,
        })
    }

    /// Build a target from a parsed port specification.
    pub fn from_spec(
        host: impl Into<String>,
        spec: &PortSpec,
        timeout: Duration,
    ) -> Result<Self, TargetError> {
        Self::new(host, spec.to_ports(), timeout)
    }

    /// Target the built-in common port list with the default timeout.
    pub fn common(host: impl Into<String>) -> Result<Self, TargetError> {
        Self::from_spec(host, &PortSpec::common(), DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} ports)", self.host, self.ports.len())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Check if a string is a valid hostname.
fn is_valid_hostname(s: &str) -> bool {
    if s.is_empty() || s.len() > 253 {
        return false;
    }

    // Each label must be 1-63 characters
    for label in s.split('.') {
        if label.is_empty() || label.len() > 63 {
            return false;
        }
        // Must start and end with alphanumeric
        if !label.chars().next().is_some_and(|c| c.is_alphanumeric()) {
            return false;
        }
        if !label.chars().last().is_some_and(|c| c.is_alphanumeric()) {
            return false;
        }
        // Can only contain alphanumeric and hyphens
        if !label.chars().all(|c| c.is_alphanumeric() || c == '-') {
            return false;
        }
    }

    true
}
