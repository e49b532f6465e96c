//! Security header policy.

use super::Assessment;
use crate::types::Severity;
use reqwest::header::HeaderMap;
use std::borrow::Cow;

/// Required security headers and the warning emitted when one is absent.
pub const REQUIRED_HEADERS: [(&str, &str); 5] = [
    ("content-security-policy", "Missing Content Security Policy"),
    (
        "x-frame-options",
        "Missing X-Frame-Options (clickjacking protection)",
    ),
    ("x-content-type-options", "Missing X-Content-Type-Options"),
    ("strict-transport-security", "Missing HSTS header"),
    ("x-xss-protection", "Missing XSS Protection header"),
];

/// Headers that leak server or framework versions.
const DISCLOSURE_HEADERS: [(&str, &str); 4] = [
    ("server", "Server"),
    ("x-powered-by", "X-Powered-By"),
    ("x-aspnet-version", "X-AspNet-Version"),
    ("x-aspnetmvc-version", "X-AspNetMvc-Version"),
];

/// Server header prefixes of releases with known critical vulnerabilities.
const OUTDATED_SERVERS: [&str; 2] = ["Apache/2.2.", "nginx/1.1."];

/// Header value with non-UTF-8 bytes replaced rather than dropped.
fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<Cow<'a, str>> {
    headers.get(name).map(|v| String::from_utf8_lossy(v.as_bytes()))
}

/// Check response headers against the policy.
pub fn check_headers(headers: &HeaderMap) -> Assessment {
    let mut assessment = Assessment::default();

    for (name, warning) in REQUIRED_HEADERS {
        if !headers.contains_key(name) {
            assessment.flag(warning, Severity::Medium);
        }
    }

    if header(headers, "x-frame-options").is_some_and(|v| v.trim().eq_ignore_ascii_case("ALLOWALL")) {
        assessment.flag(
            "X-Frame-Options set to ALLOWALL (framing allowed from any origin)",
            Severity::High,
        );
    }

    for (name, display) in DISCLOSURE_HEADERS {
        if let Some(value) = header(headers, name) {
            assessment.note(format!("{} header discloses: {}", display, value));
        }
    }

    if let Some(server) = header(headers, "server") {
        if OUTDATED_SERVERS.iter().any(|prefix| server.contains(prefix)) {
            assessment.flag(format!("Outdated web server: {}", server), Severity::Medium);
        }
    }

    assessment
}
