//! Passive-ish reconnaissance: DNS, technology fingerprinting, a coarse OS guess.
//!
//! Nothing here affects severity. Every lookup is best effort.

use super::transport::authority;
use super::web::{http_client, scheme_for};
use super::Finding;
use crate::types::{Severity, TargetSpec};
use futures::future::join_all;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

pub const SUBDOMAIN_PREFIXES: [&str; 15] = [
    "www", "mail", "ftp", "admin", "api", "dev", "test", "staging", "blog", "shop", "support",
    "help", "docs", "cdn", "static",
];

/// Ports whose presence points at a Windows host.
const WINDOWS_PORTS: [u16; 3] = [3389, 445, 135];

/// Ports tried when nothing Windows-specific is open.
const GENERIC_PORTS: [u16; 4] = [22, 23, 80, 443];

/// Bytes of page body handed to the fingerprinter.
const MAX_BODY: usize = 64 * 1024;

const SERVER_MARKERS: [(&str, &str); 4] = [
    ("apache", "Apache"),
    ("nginx", "Nginx"),
    ("iis", "IIS"),
    ("cloudflare", "Cloudflare"),
];

const POWERED_BY_MARKERS: [(&str, &str); 3] =
    [("php", "PHP"), ("asp.net", "ASP.NET"), ("express", "Express")];

const BODY_MARKERS: [(&str, &str); 3] = [
    ("wordpress", "WordPress"),
    ("drupal", "Drupal"),
    ("joomla", "Joomla"),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconProbeResult {
    pub host: String,
    pub ip_addresses: Vec<String>,
    pub subdomains: Vec<String>,
    pub technologies: Vec<String>,
    /// Response headers keyed `Port{port}-{name}`.
    pub headers: BTreeMap<String, String>,
    pub os_fingerprint: String,
    pub os_confidence: String,
    pub warnings: Vec<String>,
}

impl Finding for ReconProbeResult {
    fn service(&self) -> &str {
        "Reconnaissance"
    }

    fn has_finding(&self) -> bool {
        !self.subdomains.is_empty() || !self.technologies.is_empty()
    }

    fn severity(&self) -> Severity {
        Severity::Low
    }

    fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(needle)
}

/// Technologies named by headers and page content, deduplicated in
/// discovery order.
pub fn detect_technologies(headers: &HeaderMap, body: &str) -> Vec<String> {
    let value = |name: &str| {
        headers
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default()
    };
    let server = value("server");
    let powered_by = value("x-powered-by");

    let mut found: Vec<String> = Vec::new();
    let candidates = SERVER_MARKERS
        .iter()
        .filter(|(needle, _)| contains_ci(&server, needle))
        .chain(POWERED_BY_MARKERS.iter().filter(|(needle, _)| contains_ci(&powered_by, needle)))
        .chain(BODY_MARKERS.iter().filter(|(needle, _)| contains_ci(body, needle)));
    for (_, name) in candidates {
        push_unique(&mut found, name);
    }
    found
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

/// Coarse OS guess from which representative ports accepted a connection.
pub fn classify_os(reachable: &[u16]) -> &'static str {
    if reachable.iter().any(|p| WINDOWS_PORTS.contains(p)) {
        "Windows (estimated)"
    } else if reachable.iter().any(|p| GENERIC_PORTS.contains(p)) {
        "Linux/Unix-like (estimated)"
    } else {
        "Unknown"
    }
}

async fn connects(host: &str, port: u16, wait: Duration) -> bool {
    matches!(timeout(wait, TcpStream::connect((host, port))).await, Ok(Ok(_)))
}

async fn fingerprint_os(host: &str, open_ports: &[u16], wait: Duration) -> &'static str {
    let mut reachable: Vec<u16> = open_ports
        .iter()
        .copied()
        .filter(|p| WINDOWS_PORTS.contains(p) || GENERIC_PORTS.contains(p))
        .collect();
    if reachable.is_empty() {
        for port in GENERIC_PORTS {
            if connects(host, port, wait).await {
                reachable.push(port);
                break;
            }
        }
    }
    classify_os(&reachable)
}

async fn lookup(resolver: &TokioAsyncResolver, name: String) -> Option<(String, Vec<String>)> {
    match resolver.lookup_ip(name.as_str()).await {
        Ok(ips) => {
            let ips: Vec<String> = ips.iter().map(|ip| ip.to_string()).collect();
            (!ips.is_empty()).then_some((name, ips))
        }
        Err(e) => {
            trace!(%name, error = %e, "lookup failed");
            None
        }
    }
}

async fn dns_recon(host: &str, result: &mut ReconProbeResult) {
    let spec = match TargetSpec::parse(host) {
        Ok(spec) => spec,
        Err(e) => {
            debug!(%host, error = %e, "skipping DNS recon");
            return;
        }
    };
    match spec.resolve().await {
        Ok(ips) => result.ip_addresses = ips.iter().map(|ip| ip.to_string()).collect(),
        Err(e) => debug!(%host, error = %e, "host did not resolve"),
    }
    if spec.is_address() {
        return;
    }

    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

    let lookups = SUBDOMAIN_PREFIXES
        .iter()
        .map(|prefix| lookup(&resolver, format!("{}.{}", prefix, host)));
    result.subdomains = join_all(lookups)
        .await
        .into_iter()
        .flatten()
        .map(|(name, _)| name)
        .collect();
}

async fn http_recon(host: &str, port: u16, wait: Duration, result: &mut ReconProbeResult) {
    let Some(client) = http_client(wait) else {
        return;
    };
    let url = format!("{}://{}/", scheme_for(port), authority(host, port));
    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!(%url, error = %e, "header fetch failed");
            return;
        }
    };

    let headers = response.headers().clone();
    for (name, value) in &headers {
        result.headers.insert(
            format!("Port{}-{}", port, name.as_str()),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        );
    }

    let body = response.text().await.unwrap_or_default();
    let body = body.get(..MAX_BODY.min(body.len())).unwrap_or(&body);
    for tech in detect_technologies(&headers, body) {
        push_unique(&mut result.technologies, &tech);
    }
}

/// Reconnaissance of `host`, fetching headers from each open port in `web_ports`.
pub async fn probe_recon(
    host: &str,
    open_ports: &[u16],
    web_ports: &[u16],
    wait: Duration,
) -> ReconProbeResult {
    let mut result = ReconProbeResult {
        host: host.to_string(),
        os_confidence: "low".to_string(),
        ..ReconProbeResult::default()
    };

    dns_recon(host, &mut result).await;

    for &port in open_ports.iter().filter(|p| web_ports.contains(p)) {
        http_recon(host, port, wait, &mut result).await;
    }

    result.os_fingerprint = fingerprint_os(host, open_ports, wait).await.to_string();

    if !result.subdomains.is_empty() {
        result
            .warnings
            .push(format!("{} subdomains resolved", result.subdomains.len()));
    }
    if !result.technologies.is_empty() {
        result
            .warnings
            .push(format!("Technologies detected: {}", result.technologies.join(", ")));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::web::test_server;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_detect_from_headers_and_body() {
        let mut headers = HeaderMap::new();
        headers.insert("server", HeaderValue::from_static("Apache/2.4.57 (Debian)"));
        headers.insert("x-powered-by", HeaderValue::from_static("PHP/8.2.7"));
        let techs = detect_technologies(&headers, "<meta name=\"generator\" content=\"WordPress 6.4\">");
        assert_eq!(techs, vec!["Apache", "PHP", "WordPress"]);
    }

    #[test]
    fn test_detect_nothing() {
        assert!(detect_technologies(&HeaderMap::new(), "<html></html>").is_empty());
    }

    #[test]
    fn test_classify_os() {
        assert_eq!(classify_os(&[22, 3389]), "Windows (estimated)");
        assert_eq!(classify_os(&[80]), "Linux/Unix-like (estimated)");
        assert_eq!(classify_os(&[]), "Unknown");
    }

    #[test]
    fn test_recon_never_has_severity() {
        let result = ReconProbeResult {
            technologies: vec!["Nginx".into()],
            ..ReconProbeResult::default()
        };
        assert!(result.has_finding());
        assert_eq!(result.effective_severity(), Severity::Low);
    }

    #[tokio::test]
    async fn test_probe_recon_merges_headers_and_dedups() {
        let port = test_server::spawn(|_| (200, vec![("Server", "nginx/1.25.3")])).await;

        let result = probe_recon("127.0.0.1", &[port], &[port], Duration::from_secs(1)).await;

        assert_eq!(result.ip_addresses, vec!["127.0.0.1"]);
        assert!(result.subdomains.is_empty());
        assert_eq!(result.technologies, vec!["Nginx"]);
        assert_eq!(
            result.headers.get(&format!("Port{}-server", port)).map(String::as_str),
            Some("nginx/1.25.3")
        );
        assert_eq!(result.os_confidence, "low");
    }
}
