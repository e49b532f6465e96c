//! Port numbers and port sets.
//!
//! A port set is given as `"common"`, a single port, a comma list, inclusive
//! ranges, or any mix of those (`"22,80,8000-8010"`). Every port in a parsed
//! set is in 1-65535; port 0 is rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A port number in 1-65535.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Port(u16);

impl Port {
    /// `None` for port 0.
    #[inline]
    pub const fn new(port: u16) -> Option<Self> {
        if port == 0 {
            None
        } else {
            Some(Self(port))
        }
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> Self {
        port.0
    }
}

/// Why a port set was rejected.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortError {
    #[error("port {0} is out of valid range (1-65535)")]
    OutOfRange(u16),
    #[error("invalid port number: {0}")]
    InvalidFormat(String),
    #[error("invalid port range: start ({0}) > end ({1})")]
    InvalidRange(u16, u16),
    #[error("empty port specification")]
    Empty,
}

/// Inclusive range of ports, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    start: Port,
    end: Port,
}

impl PortRange {
    pub fn new(start: Port, end: Port) -> Result<Self, PortError> {
        if start > end {
            return Err(PortError::InvalidRange(start.0, end.0));
        }
        Ok(Self { start, end })
    }

    pub const fn single(port: Port) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Port> {
        (self.start.0..=self.end.0).filter_map(Port::new)
    }
}

/// A caller-supplied set of ports, kept as the ranges it was written with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortSpec {
    ranges: Vec<PortRange>,
}

impl PortSpec {
    pub const fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    pub fn add_range(&mut self, range: PortRange) {
        self.ranges.push(range);
    }

    pub fn add_port(&mut self, port: Port) {
        self.ranges.push(PortRange::single(port));
    }

    /// Every port in the set, ascending, without duplicates.
    pub fn to_ports(&self) -> Vec<Port> {
        let mut ports: Vec<Port> = self.ranges.iter().flat_map(|r| r.iter()).collect();
        ports.sort_unstable();
        ports.dedup();
        ports
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The built-in audit set, [`COMMON_PORTS`].
    pub fn common() -> Self {
        let mut spec = Self::new();
        for port in COMMON_PORTS.iter().copied().filter_map(Port::new) {
            spec.add_port(port);
        }
        spec
    }
}

/// Ports audited when the caller does not supply a port set.
pub const COMMON_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 111, 135, 139, 143, 443, 993, 995, 1723, 3306, 3389, 5432, 5900,
    6379, 8080, 8443, 8888, 9090, 27017,
];

fn parse_port(text: &str) -> Result<Port, PortError> {
    let text = text.trim();
    let raw: u16 = text
        .parse()
        .map_err(|_| PortError::InvalidFormat(text.to_string()))?;
    Port::new(raw).ok_or(PortError::OutOfRange(raw))
}

impl FromStr for PortSpec {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PortError::Empty);
        }
        if s.eq_ignore_ascii_case("common") {
            return Ok(Self::common());
        }

        let mut spec = Self::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('-') {
                Some((start, end)) => {
                    if end.contains('-') {
                        return Err(PortError::InvalidFormat(part.to_string()));
                    }
                    spec.add_range(PortRange::new(parse_port(start)?, parse_port(end)?)?);
                }
                None => spec.add_port(parse_port(part)?),
            }
        }

        if spec.is_empty() {
            return Err(PortError::Empty);
        }
        Ok(spec)
    }
}
