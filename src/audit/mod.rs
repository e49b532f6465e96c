//! Dispatcher and aggregate result.
//!
//! For every open port the [`Auditor`] identifies the service and runs the
//! probes whose applicability predicate matches the port number. Ports are
//! processed concurrently behind a small admission gate; each port task
//! returns its own results and a single consumer folds them into the
//! [`AuditResult`], so no shared state is mutated across tasks.

pub mod findings;
pub mod risk;

pub use findings::{check_basic_misconfigurations, version_vulnerabilities, Vulnerability};
pub use risk::assess;

use crate::banner::BANNER_TIMEOUT;
use crate::probes::database::{probe_database, DATABASE_TIMEOUT};
use crate::probes::exploits::probe_exploit;
use crate::probes::recon::probe_recon;
use crate::probes::web::{probe_web, WEB_PORTS, WEB_TIMEOUT};
use crate::probes::{
    applicable_probes, DatabaseProbeResult, ExploitProbeResult, Finding, ProbeKind, ProbeResult,
    ReconProbeResult, SystemProbeResult, WebProbeResult,
};
use crate::scanner::{run_scan, PortScanResult, ScanOptions};
use crate::services::{describe_service, ServiceInfo};
use crate::types::{ScanTarget, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Default number of ports probed at once.
pub const DEFAULT_PROBE_CONCURRENCY: usize = 8;

/// Per-run knobs for the dispatcher.
#[derive(Debug, Clone)]
pub struct AuditOptions {
    pub banner_timeout: Duration,
    /// Timeout for database and raw handshake probes.
    pub probe_timeout: Duration,
    pub web_timeout: Duration,
    /// Ports the web probe applies to.
    pub web_ports: Vec<u16>,
    pub probe_concurrency: usize,
    pub skip_recon: bool,
    pub skip_exploits: bool,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            banner_timeout: BANNER_TIMEOUT,
            probe_timeout: DATABASE_TIMEOUT,
            web_timeout: WEB_TIMEOUT,
            web_ports: WEB_PORTS.to_vec(),
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
            skip_recon: false,
            skip_exploits: false,
        }
    }
}

/// Everything learned about one host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditResult {
    pub host: String,
    pub services: Vec<ServiceInfo>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub misconfigurations: Vec<String>,
    pub database_results: Vec<DatabaseProbeResult>,
    pub web_results: Vec<WebProbeResult>,
    pub exploit_results: Vec<ExploitProbeResult>,
    /// Only present when local checks were attached explicitly.
    pub system_results: Vec<SystemProbeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recon: Option<ReconProbeResult>,
    pub severity: Severity,
}

impl AuditResult {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Append one probe outcome to the list for its family.
    pub fn push(&mut self, result: ProbeResult) {
        match result {
            ProbeResult::Database(r) => self.database_results.push(r),
            ProbeResult::Web(r) => self.web_results.push(r),
            ProbeResult::System(r) => self.system_results.push(r),
            ProbeResult::Recon(r) => self.recon = Some(r),
            ProbeResult::Exploit(r) => self.exploit_results.push(r),
        }
    }

    /// Every probe result, whatever its family.
    pub fn findings(&self) -> impl Iterator<Item = &dyn Finding> + '_ {
        let database = self.database_results.iter().map(|r| r as &dyn Finding);
        let web = self.web_results.iter().map(|r| r as &dyn Finding);
        let exploit = self.exploit_results.iter().map(|r| r as &dyn Finding);
        let system = self.system_results.iter().map(|r| r as &dyn Finding);
        let recon = self.recon.iter().map(|r| r as &dyn Finding);
        database.chain(web).chain(exploit).chain(system).chain(recon)
    }

    /// Findings at or above `severity`.
    pub fn issues_at_least(&self, severity: Severity) -> impl Iterator<Item = &dyn Finding> + '_ {
        self.findings()
            .filter(move |f| f.has_finding() && f.severity() >= severity)
    }

    /// Attach local host checks and recompute the overall severity.
    pub fn attach_local_system(&mut self, results: Vec<SystemProbeResult>) {
        self.system_results.extend(results);
        self.severity = assess(self);
    }

    pub fn open_ports(&self) -> Vec<u16> {
        self.services.iter().map(|s| s.port).collect()
    }
}

/// Full pipeline output: the scan plus the audit built from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub timestamp: DateTime<Utc>,
    pub scan: PortScanResult,
    pub audit: AuditResult,
}

/// What one port task produced.
struct PortAudit {
    service: ServiceInfo,
    probes: Vec<ProbeResult>,
}

/// Routes open ports to probes and aggregates their results.
#[derive(Debug, Clone, Default)]
pub struct Auditor {
    options: Arc<AuditOptions>,
}

impl Auditor {
    pub fn new(options: AuditOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &AuditOptions {
        &self.options
    }

    /// Audit `host` given its open ports. Never fails: probe failures only
    /// mean fewer findings.
    pub async fn audit(&self, host: &str, open_ports: &[u16]) -> AuditResult {
        let mut ports = open_ports.to_vec();
        ports.sort_unstable();
        ports.dedup();
        info!(%host, ports = ports.len(), "auditing open ports");

        let gate = Arc::new(Semaphore::new(self.options.probe_concurrency.max(1)));
        let mut set = JoinSet::new();
        for &port in &ports {
            let gate = Arc::clone(&gate);
            let options = Arc::clone(&self.options);
            let host = host.to_string();
            set.spawn(async move {
                let Ok(_permit) = gate.acquire_owned().await else {
                    return None;
                };
                Some(audit_port(&host, port, &options).await)
            });
        }

        let mut per_port = Vec::with_capacity(ports.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(port_audit)) => per_port.push(port_audit),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "port audit task failed"),
            }
        }
        per_port.sort_by_key(|p| p.service.port);

        let mut result = AuditResult::new(host);
        for port_audit in per_port {
            result.services.push(port_audit.service);
            for probe in port_audit.probes {
                result.push(probe);
            }
        }

        result.misconfigurations = check_basic_misconfigurations(&result.services);
        result.vulnerabilities = collect_vulnerabilities(&result);

        if !self.options.skip_recon {
            let recon = probe_recon(host, &ports, &self.options.web_ports, self.options.web_timeout).await;
            result.push(ProbeResult::Recon(recon));
        }

        result.severity = assess(&result);
        info!(%host, severity = %result.severity, "audit complete");
        result
    }
}

async fn audit_port(host: &str, port: u16, options: &AuditOptions) -> PortAudit {
    let service = describe_service(host, port, options.banner_timeout).await;
    debug!(%host, port, service = %service.service, "service identified");

    let mut probes = Vec::new();
    for kind in applicable_probes(port, &options.web_ports) {
        match kind {
            ProbeKind::Database(_) => {
                if let Some(r) = probe_database(host, port, options.probe_timeout).await {
                    probes.push(ProbeResult::Database(r));
                }
            }
            ProbeKind::Web => {
                probes.push(ProbeResult::Web(probe_web(host, port, options.web_timeout).await));
            }
            ProbeKind::Exploit(_) if options.skip_exploits => {}
            ProbeKind::Exploit(_) => {
                if let Some(r) = probe_exploit(host, port, options.probe_timeout).await {
                    probes.push(ProbeResult::Exploit(r));
                }
            }
        }
    }

    PortAudit { service, probes }
}

/// Version matches from service banners and web `Server` headers.
fn collect_vulnerabilities(result: &AuditResult) -> Vec<Vulnerability> {
    let banners = result
        .services
        .iter()
        .filter_map(|s| s.version.as_deref().map(|v| (s.port, v)));
    let servers = result
        .web_results
        .iter()
        .filter_map(|w| w.headers.get("server").map(|v| (w.port, v.as_str())));

    let mut found: Vec<Vulnerability> = Vec::new();
    for (port, banner) in banners.chain(servers) {
        for vulnerability in version_vulnerabilities(port, banner) {
            if !found
                .iter()
                .any(|v| v.port == vulnerability.port && v.cve == vulnerability.cve)
            {
                found.push(vulnerability);
            }
        }
    }
    found
}

/// Scan `target`, then audit whatever is open.
pub async fn run_audit(target: &ScanTarget, scan: &ScanOptions, options: AuditOptions) -> AuditReport {
    let scan = run_scan(target, scan).await;
    let audit = Auditor::new(options).audit(target.host(), &scan.open_ports).await;
    AuditReport {
        timestamp: Utc::now(),
        scan,
        audit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::DatabaseKind;

    fn quick_options() -> AuditOptions {
        AuditOptions {
            banner_timeout: Duration::from_millis(200),
            probe_timeout: Duration::from_millis(200),
            web_timeout: Duration::from_millis(500),
            skip_recon: true,
            ..AuditOptions::default()
        }
    }

    #[test]
    fn test_push_routes_by_variant() {
        let mut result = AuditResult::new("h");
        result.push(ProbeResult::Database(DatabaseProbeResult::new(DatabaseKind::Redis, "h", 6379)));
        result.push(ProbeResult::System(SystemProbeResult {
            check_type: "x".into(),
            findings: vec![],
            severity: Severity::Low,
        }));
        assert_eq!(result.database_results.len(), 1);
        assert_eq!(result.system_results.len(), 1);
        assert_eq!(result.findings().count(), 2);
    }

    #[test]
    fn test_attach_local_system_reassesses() {
        let mut result = AuditResult::new("h");
        assert_eq!(result.severity, Severity::Low);
        result.attach_local_system(vec![SystemProbeResult {
            check_type: "World-Writable Files".into(),
            findings: vec!["CRITICAL: /etc/x".into()],
            severity: Severity::Critical,
        }]);
        assert_eq!(result.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_services_only_for_open_ports() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let result = Auditor::new(quick_options()).audit("127.0.0.1", &[port, port]).await;

        assert_eq!(result.services.len(), 1);
        assert_eq!(result.services[0].service, "Unknown");
        assert!(result.database_results.is_empty());
        assert!(result.web_results.is_empty());
        assert!(result.recon.is_none());
        assert!(result.system_results.is_empty());
        assert_eq!(result.severity, Severity::Low);
    }

    #[tokio::test]
    async fn test_web_server_header_feeds_vulnerabilities() {
        let port = crate::probes::web::test_server::spawn(|path| match path {
            "/" => (200, vec![("Server", "Apache/2.2.34 (Unix)")]),
            _ => (404, vec![]),
        })
        .await;
        let options = AuditOptions {
            web_ports: vec![port],
            ..quick_options()
        };

        let result = Auditor::new(options).audit("127.0.0.1", &[port]).await;

        assert_eq!(result.web_results.len(), 1);
        assert_eq!(result.vulnerabilities.len(), 1);
        assert_eq!(result.vulnerabilities[0].cve, "CVE-2017-15715");
        assert_eq!(result.severity, Severity::High);
    }
}
