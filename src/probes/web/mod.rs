//! Web probe: one GET to `/`, then header policy, TLS and common-path checks.
//!
//! Certificate validation is disabled for every request this module makes
//! so that hosts with invalid or self-signed certificates can be reported on.

pub mod headers;
pub mod tls;
pub mod vulns;

pub use headers::check_headers;
pub use tls::{CertificateSummary, TlsReport};

use super::transport::authority;
use super::Finding;
use crate::types::Severity;
use chrono::Utc;
use reqwest::redirect::Policy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Ports the web probe runs against by default.
pub const WEB_PORTS: &[u16] = &[80, 443, 8080, 8443, 8000, 8888, 9090];

/// Overall timeout of a single web request.
pub const WEB_TIMEOUT: Duration = Duration::from_secs(5);

/// `https` for the TLS ports, `http` otherwise.
pub fn scheme_for(port: u16) -> &'static str {
    match port {
        443 | 8443 => "https",
        _ => "http",
    }
}

/// Warnings plus the severity they justify.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assessment {
    pub warnings: Vec<String>,
    pub severity: Severity,
}

impl Assessment {
    /// Informational warning, severity untouched.
    pub fn note(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Warning that lifts severity to at least `severity`.
    pub fn flag(&mut self, message: impl Into<String>, severity: Severity) {
        self.warnings.push(message.into());
        self.severity.raise(severity);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebProbeResult {
    pub url: String,
    pub port: u16,
    pub accessible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsReport>,
    pub vulnerabilities: Vec<String>,
    pub warnings: Vec<String>,
    pub severity: Severity,
}

impl WebProbeResult {
    fn new(url: String, port: u16) -> Self {
        Self {
            url,
            port,
            accessible: false,
            status: None,
            headers: BTreeMap::new(),
            tls: None,
            vulnerabilities: Vec::new(),
            warnings: Vec::new(),
            severity: Severity::Low,
        }
    }

    fn absorb(&mut self, assessment: Assessment) {
        self.warnings.extend(assessment.warnings);
        self.severity.raise(assessment.severity);
    }

    pub fn is_https(&self) -> bool {
        self.url.starts_with("https://")
    }
}

impl Finding for WebProbeResult {
    fn service(&self) -> &str {
        if self.is_https() {
            "HTTPS"
        } else {
            "HTTP"
        }
    }

    fn has_finding(&self) -> bool {
        self.accessible && (!self.warnings.is_empty() || !self.vulnerabilities.is_empty())
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// HTTP client shared by the web and recon probes.
pub(crate) fn http_client(wait: Duration) -> Option<Client> {
    Client::builder()
        .timeout(wait)
        .danger_accept_invalid_certs(true)
        .redirect(Policy::limited(5))
        .user_agent(concat!("hostaudit/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| debug!(error = %e, "failed to build HTTP client"))
        .ok()
}

/// Probe the web server on `host:port`.
pub async fn probe_web(host: &str, port: u16, wait: Duration) -> WebProbeResult {
    let scheme = scheme_for(port);
    let base = format!("{}://{}", scheme, authority(host, port));
    let mut result = WebProbeResult::new(base.clone(), port);

    let Some(client) = http_client(wait) else {
        return result;
    };

    let response = match client.get(format!("{}/", base)).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!(url = %base, error = %e, "web server not accessible");
            return result;
        }
    };

    result.accessible = true;
    result.status = Some(response.status().as_u16());
    let headers = response.headers().clone();
    drop(response);

    result.headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    result.absorb(check_headers(&headers));

    if scheme == "https" {
        if let Some(report) = tls::inspect(host, port, wait).await {
            result.absorb(tls::evaluate(&report, Utc::now()));
            result.tls = Some(report);
        }
    }

    let hits = vulns::probe_common_vulnerabilities(&client, &base).await;
    if !hits.is_empty() {
        info!(url = %base, hits = hits.len(), "common web vulnerabilities found");
        result.severity.raise(Severity::High);
        result.vulnerabilities = hits;
    }

    result
}

#[cfg(test)]
pub(crate) mod test_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP/1.1 server answering each request with `route(path)`.
    pub async fn spawn(route: fn(&str) -> (u16, Vec<(&'static str, &'static str)>)) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match sock.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let request = String::from_utf8_lossy(&buf);
                    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let (status, headers) = route(&path);
                    let mut reply = format!("HTTP/1.1 {} X\r\n", status);
                    for (name, value) in headers {
                        reply.push_str(&format!("{}: {}\r\n", name, value));
                    }
                    reply.push_str("Content-Length: 2\r\nConnection: close\r\n\r\nok");
                    let _ = sock.write_all(reply.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_selection() {
        assert_eq!(scheme_for(443), "https");
        assert_eq!(scheme_for(8443), "https");
        assert_eq!(scheme_for(80), "http");
        assert_eq!(scheme_for(8080), "http");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_not_accessible() {
        let port = {
            let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let result = probe_web("127.0.0.1", port, Duration::from_millis(500)).await;
        assert!(!result.accessible);
        assert!(result.warnings.is_empty());
        assert_eq!(result.severity, Severity::Low);
        assert!(!result.has_finding());
    }

    #[tokio::test]
    async fn test_probe_reports_missing_headers() {
        let port = test_server::spawn(|path| match path {
            "/" => (200, vec![("Strict-Transport-Security", "max-age=63072000")]),
            _ => (404, vec![]),
        })
        .await;

        let result = probe_web("127.0.0.1", port, Duration::from_secs(2)).await;

        assert!(result.accessible);
        assert_eq!(result.status, Some(200));
        let missing = result.warnings.iter().filter(|w| w.starts_with("Missing")).count();
        assert_eq!(missing, 4);
        assert!(result.vulnerabilities.is_empty());
        assert_eq!(result.severity, Severity::Medium);
        assert!(result.tls.is_none());
    }

    #[tokio::test]
    async fn test_exposed_admin_panel_is_high() {
        let port = test_server::spawn(|path| match path {
            "/" | "/admin" => (200, vec![]),
            _ => (404, vec![]),
        })
        .await;

        let result = probe_web("127.0.0.1", port, Duration::from_secs(2)).await;

        assert_eq!(result.vulnerabilities, vec!["Admin panel exposed: /admin"]);
        assert_eq!(result.severity, Severity::High);
    }
}
