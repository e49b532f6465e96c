//! TCP Connect Scanner implementation.
//!
//! Performs standard TCP connect scans using the operating system's
//! socket API. The connection is closed as soon as it is established;
//! no data is exchanged.

use crate::error::{ScanError, ScanResult};
use crate::scanner::traits::Scanner;
use crate::types::Port;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// TCP Connect Scanner.
///
/// Uses standard socket connect() calls to determine port status.
/// Does not require elevated privileges.
pub struct TcpConnectScanner {
    target: String,
    timeout: Duration,
}

impl TcpConnectScanner {
    /// Create a new TCP connect scanner.
    ///
    /// # Arguments
    /// * `target` - Hostname or IP address to scan
    /// * `timeout` - Connection timeout per port
    pub fn new(target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            timeout,
        }
    }

    /// Attempt to connect to the target port.
    async fn attempt_connect(&self, port: u16) -> ScanResult<TcpStream> {
        match timeout(self.timeout, TcpStream::connect((self.target.as_str(), port))).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                Err(ScanError::ConnectionRefused)
            }
            Ok(Err(e)) => Err(ScanError::ConnectionFailed {
                target: self.target.clone(),
                port,
                reason: e.to_string(),
            }),
            Err(_) => Err(ScanError::Timeout),
        }
    }
}

#[async_trait]
impl Scanner for TcpConnectScanner {
    fn target(&self) -> &str {
        &self.target
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn probe(&self, port: Port) -> bool {
        match self.attempt_connect(port.as_u16()).await {
            Ok(stream) => {
                drop(stream);
                true
            }
            Err(e) => {
                trace!(target = %self.target, %port, error = %e, "port not open");
                false
            }
        }
    }
}
