//! Findings derived from service identification alone.

use crate::services::ServiceInfo;
use crate::types::Severity;
use serde::{Deserialize, Serialize};

/// A known CVE matched against a banner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub port: u16,
    pub cve: String,
    pub description: String,
    pub severity: Severity,
    pub score: f64,
}

struct KnownVulnerability {
    marker: &'static str,
    cve: &'static str,
    description: &'static str,
    score: f64,
}

const KNOWN_VULNERABILITIES: [KnownVulnerability; 2] = [
    KnownVulnerability {
        marker: "apache/2.2",
        cve: "CVE-2017-15715",
        description: "Apache HTTP Server 2.2.x vulnerability - Expression injection in mod_rewrite",
        score: 8.1,
    },
    KnownVulnerability {
        marker: "nginx/1.1.",
        cve: "CVE-2013-2028",
        description: "Nginx 1.1.x buffer overflow vulnerability",
        score: 7.5,
    },
];

/// Advice strings for risky service types, one per matching service.
pub fn check_basic_misconfigurations(services: &[ServiceInfo]) -> Vec<String> {
    services
        .iter()
        .filter_map(|info| match info.base_name() {
            "FTP" => Some("FTP service detected - consider using SFTP instead".to_string()),
            "Telnet" => Some(
                "Telnet service detected - unencrypted protocol, use SSH instead".to_string(),
            ),
            "HTTP" if info.port == 80 => {
                Some("HTTP service on port 80 - consider redirecting to HTTPS".to_string())
            }
            "SSH" => Some(
                "SSH service detected - ensure key-based authentication is enabled".to_string(),
            ),
            name @ ("MySQL" | "PostgreSQL" | "MongoDB" | "Redis") => Some(format!(
                "{} database detected - ensure proper authentication and access controls",
                name
            )),
            _ => None,
        })
        .collect()
}

/// CVEs whose version marker appears in `banner` (a service banner or an
/// HTTP `Server` header seen on `port`).
pub fn version_vulnerabilities(port: u16, banner: &str) -> Vec<Vulnerability> {
    let banner = banner.to_ascii_lowercase();

    KNOWN_VULNERABILITIES
        .iter()
        .filter(|known| banner.contains(known.marker))
        .map(|known| Vulnerability {
            port,
            cve: known.cve.to_string(),
            description: known.description.to_string(),
            severity: Severity::from_score(known.score),
            score: known.score,
        })
        .collect()
}
