//! Protocol probes.
//!
//! Each probe family takes a host and port (or nothing, for the local
//! system checks) and always returns a result value. Transport failures are
//! absorbed inside the probe and reported as "no finding"; a probe never
//! aborts the audit.
//!
//! Applicability is decided by port number alone, see
//! [`applicable_probes`].

pub mod database;
pub mod exploits;
pub mod recon;
pub mod system;
pub mod transport;
pub mod web;

pub use database::{DatabaseKind, DatabaseProbeResult};
pub use exploits::{ExploitKind, ExploitProbeResult};
pub use recon::ReconProbeResult;
pub use system::SystemProbeResult;
pub use web::WebProbeResult;

use crate::types::Severity;
use serde::{Deserialize, Serialize};

/// Common view over every probe result family.
pub trait Finding {
    /// Service or check this result describes.
    fn service(&self) -> &str;

    /// Whether the probe found something worth reporting.
    fn has_finding(&self) -> bool;

    fn severity(&self) -> Severity;

    fn warnings(&self) -> &[String];

    /// Severity that should count towards the overall risk.
    ///
    /// A result without a finding contributes nothing beyond `Low`.
    fn effective_severity(&self) -> Severity {
        if self.has_finding() {
            self.severity()
        } else {
            Severity::Low
        }
    }
}

/// One probe outcome, tagged by family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeResult {
    Database(DatabaseProbeResult),
    Web(WebProbeResult),
    System(SystemProbeResult),
    Recon(ReconProbeResult),
    Exploit(ExploitProbeResult),
}

impl ProbeResult {
    pub fn as_finding(&self) -> &dyn Finding {
        match self {
            Self::Database(r) => r,
            Self::Web(r) => r,
            Self::System(r) => r,
            Self::Recon(r) => r,
            Self::Exploit(r) => r,
        }
    }
}

/// Port-addressed probe families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    Database(DatabaseKind),
    Web,
    Exploit(ExploitKind),
}

/// Every port-addressed probe that applies to `port`, given the set of
/// ports treated as web ports.
pub fn applicable_probes(port: u16, web_ports: &[u16]) -> Vec<ProbeKind> {
    let mut kinds = Vec::new();
    if let Some(kind) = DatabaseKind::for_port(port) {
        kinds.push(ProbeKind::Database(kind));
    }
    if web_ports.contains(&port) {
        kinds.push(ProbeKind::Web);
    }
    if let Some(kind) = ExploitKind::for_port(port) {
        kinds.push(ProbeKind::Exploit(kind));
    }
    kinds
}
