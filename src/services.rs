//! Service identification.
//!
//! Classification is a hard lookup by well-known port number. A banner, when
//! one can be read, only annotates that classification; it never changes it.

use crate::banner::grab_banner;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

/// Sentinel name for ports missing from the table.
pub const UNKNOWN_SERVICE: &str = "Unknown";

/// Maximum characters of banner text carried into a service label.
pub const MAX_VERSION_LEN: usize = 50;

/// Static map of well-known ports to canonical service names.
static PORT_SERVICES: LazyLock<HashMap<u16, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        (21, "FTP"),
        (22, "SSH"),
        (23, "Telnet"),
        (25, "SMTP"),
        (53, "DNS"),
        (80, "HTTP"),
        (110, "POP3"),
        (143, "IMAP"),
        (443, "HTTPS"),
        (993, "IMAPS"),
        (995, "POP3S"),
        (3306, "MySQL"),
        (3389, "RDP"),
        (5432, "PostgreSQL"),
        (5900, "VNC"),
        (6379, "Redis"),
        (8080, "HTTP-Alt"),
        (8443, "HTTPS-Alt"),
        (27017, "MongoDB"),
        (27018, "MongoDB"),
        (27019, "MongoDB"),
    ])
});

/// What is listening on one open port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub port: u16,
    /// Canonical name, annotated with the banner excerpt when one was read.
    pub service: String,
    /// Banner excerpt, at most [`MAX_VERSION_LEN`] characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ServiceInfo {
    /// Build from a port and an optional banner.
    pub fn new(port: u16, banner: Option<&str>) -> Self {
        let name = identify_service(port);
        let version = banner
            .map(|b| b.chars().take(MAX_VERSION_LEN).collect::<String>())
            .filter(|b| !b.is_empty());

        let service = match &version {
            Some(v) => format!("{} ({})", name, v),
            None => name.to_string(),
        };

        Self {
            port,
            service,
            version,
        }
    }

    /// The canonical name without banner annotation.
    pub fn base_name(&self) -> &'static str {
        identify_service(self.port)
    }
}

/// Look up the canonical service name for a port.
///
/// Returns [`UNKNOWN_SERVICE`] if the port is not recognized.
pub fn identify_service(port: u16) -> &'static str {
    PORT_SERVICES.get(&port).copied().unwrap_or(UNKNOWN_SERVICE)
}

/// Identify the service on an open port, enriching it with a banner if one
/// arrives within `banner_timeout`. Banner failures are absorbed.
pub async fn describe_service(host: &str, port: u16, banner_timeout: Duration) -> ServiceInfo {
    let banner = grab_banner(host, port, banner_timeout).await;
    ServiceInfo::new(port, banner.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_common_ports() {
        assert_eq!(identify_service(22), "SSH");
        assert_eq!(identify_service(80), "HTTP");
        assert_eq!(identify_service(443), "HTTPS");
        assert_eq!(identify_service(3306), "MySQL");
        assert_eq!(identify_service(27018), "MongoDB");
    }

    #[test]
    fn test_unknown_port() {
        assert_eq!(identify_service(12345), UNKNOWN_SERVICE);
    }

    #[test]
    fn test_banner_annotation_is_truncated() {
        let banner = "X".repeat(80);
        let info = ServiceInfo::new(22, Some(&banner));
        assert_eq!(info.version.as_ref().unwrap().len(), MAX_VERSION_LEN);
        assert_eq!(info.service, format!("SSH ({})", "X".repeat(MAX_VERSION_LEN)));
        assert_eq!(info.base_name(), "SSH");
    }

    #[test]
    fn test_no_banner_keeps_base_name() {
        let info = ServiceInfo::new(80, None);
        assert_eq!(info.service, "HTTP");
        assert!(info.version.is_none());
    }

    #[tokio::test]
    async fn test_describe_service_reads_banner() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"SSH-2.0-OpenSSH_8.9\r\n").await.unwrap();
        });

        let info = describe_service("127.0.0.1", port, Duration::from_secs(2)).await;
        assert_eq!(info.version.as_deref(), Some("SSH-2.0-OpenSSH_8.9"));
        assert_eq!(info.service, "Unknown (SSH-2.0-OpenSSH_8.9)");
    }

    #[tokio::test]
    async fn test_silent_service_gets_base_name() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let info = describe_service("127.0.0.1", port, Duration::from_millis(100)).await;
        assert_eq!(info.service, UNKNOWN_SERVICE);
        assert!(info.version.is_none());
    }
}
