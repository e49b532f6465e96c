//! Directory traversal and exposed admin panel checks.
//!
//! Traversal stops at the first hit; every admin path is tried.

use reqwest::{Client, StatusCode};
use tracing::trace;

/// Percent-encoded so the client does not collapse the dot segments.
pub const TRAVERSAL_PAYLOADS: [&str; 3] = [
    "..%2f..%2f..%2fetc%2fpasswd",
    "..%5c..%5c..%5cwindows%5csystem32%5cdrivers%5cetc%5chosts",
    "....//....//....//etc/passwd",
];

pub const ADMIN_PATHS: [&str; 5] = [
    "/admin",
    "/administrator",
    "/wp-admin",
    "/phpmyadmin",
    "/admin.php",
];

async fn answers_ok(client: &Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(response) => response.status() == StatusCode::OK,
        Err(e) => {
            trace!(%url, error = %e, "request failed");
            false
        }
    }
}

/// Findings for `base` (scheme and authority, no trailing slash).
pub async fn probe_common_vulnerabilities(client: &Client, base: &str) -> Vec<String> {
    let mut hits = Vec::new();

    for payload in TRAVERSAL_PAYLOADS {
        if answers_ok(client, &format!("{}/{}", base, payload)).await {
            hits.push(format!("Potential directory traversal: /{}", payload));
            break;
        }
    }

    for path in ADMIN_PATHS {
        if answers_ok(client, &format!("{}{}", base, path)).await {
            hits.push(format!("Admin panel exposed: {}", path));
        }
    }

    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::web::{http_client, test_server};
    use std::time::Duration;

    #[tokio::test]
    async fn test_traversal_short_circuits_admin_does_not() {
        let port = test_server::spawn(|_| (200, vec![])).await;
        let client = http_client(Duration::from_secs(2)).unwrap();
        let hits = probe_common_vulnerabilities(&client, &format!("http://127.0.0.1:{}", port)).await;

        let traversal = hits.iter().filter(|h| h.contains("traversal")).count();
        let admin = hits.iter().filter(|h| h.starts_with("Admin panel")).count();
        assert_eq!(traversal, 1);
        assert_eq!(admin, ADMIN_PATHS.len());
    }

    #[tokio::test]
    async fn test_encoded_payload_reaches_server_intact() {
        let port = test_server::spawn(|path| {
            if path == "/..%2f..%2f..%2fetc%2fpasswd" {
                (200, vec![])
            } else {
                (404, vec![])
            }
        })
        .await;
        let client = http_client(Duration::from_secs(2)).unwrap();
        let hits = probe_common_vulnerabilities(&client, &format!("http://127.0.0.1:{}", port)).await;
        assert_eq!(hits, vec!["Potential directory traversal: /..%2f..%2f..%2fetc%2fpasswd"]);
    }

    #[tokio::test]
    async fn test_clean_server_has_no_hits() {
        let port = test_server::spawn(|_| (404, vec![])).await;
        let client = http_client(Duration::from_secs(2)).unwrap();
        let hits = probe_common_vulnerabilities(&client, &format!("http://127.0.0.1:{}", port)).await;
        assert!(hits.is_empty());
    }
}
