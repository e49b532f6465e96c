//! Minimal raw TCP exchange used by the handshake probes.
//!
//! Every call opens its own connection; nothing is pooled. All waits are
//! bounded by the session timeout and every read is bounded in size.

use crate::error::{ScanError, ScanResult};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Upper bound on any single response buffer.
pub const MAX_RESPONSE: usize = 64 * 1024;

/// One short-lived TCP conversation with a target.
pub struct RawSession {
    stream: TcpStream,
    timeout: Duration,
}

impl RawSession {
    /// Connect to `host:port` within `wait`.
    pub async fn connect(host: &str, port: u16, wait: Duration) -> ScanResult<Self> {
        let stream = match timeout(wait, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                return Err(ScanError::ConnectionRefused)
            }
            Ok(Err(e)) => {
                return Err(ScanError::ConnectionFailed {
                    target: host.to_string(),
                    port,
                    reason: e.to_string(),
                })
            }
            Err(_) => return Err(ScanError::Timeout),
        };

        Ok(Self {
            stream,
            timeout: wait,
        })
    }

    /// Write the whole buffer.
    pub async fn send(&mut self, payload: &[u8]) -> ScanResult<()> {
        timeout(self.timeout, self.stream.write_all(payload))
            .await
            .map_err(|_| ScanError::Timeout)??;
        Ok(())
    }

    /// A single read of at most `max` bytes. An empty read is an error.
    pub async fn read_some(&mut self, max: usize) -> ScanResult<Vec<u8>> {
        let mut buf = vec![0u8; max.min(MAX_RESPONSE)];
        let n = timeout(self.timeout, self.stream.read(&mut buf))
            .await
            .map_err(|_| ScanError::Timeout)??;
        if n == 0 {
            return Err(ScanError::ConnectionClosed);
        }
        buf.truncate(n);
        Ok(buf)
    }

    /// Read until `complete` accepts the buffer, the peer closes, or `max`
    /// bytes have arrived. Returns whatever was read if anything was.
    pub async fn read_until<F>(&mut self, max: usize, complete: F) -> ScanResult<Vec<u8>>
    where
        F: Fn(&[u8]) -> bool,
    {
        let max = max.min(MAX_RESPONSE);
        let mut buf = Vec::with_capacity(4096.min(max));
        let mut chunk = [0u8; 4096];

        while buf.len() < max && !complete(&buf) {
            let want = chunk.len().min(max - buf.len());
            match timeout(self.timeout, self.stream.read(&mut chunk[..want])).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) if buf.is_empty() => return Err(e.into()),
                Err(_) if buf.is_empty() => return Err(ScanError::Timeout),
                _ => break,
            }
        }

        if buf.is_empty() {
            return Err(ScanError::ConnectionClosed);
        }
        Ok(buf)
    }

    /// Send `payload` and read one bounded response.
    pub async fn request<F>(&mut self, payload: &[u8], max: usize, complete: F) -> ScanResult<Vec<u8>>
    where
        F: Fn(&[u8]) -> bool,
    {
        self.send(payload).await?;
        self.read_until(max, complete).await
    }

    /// Read one CRLF-terminated line (or whatever arrives first).
    pub async fn read_line(&mut self) -> ScanResult<String> {
        let buf = self
            .read_until(4096, |b| b.windows(2).any(|w| w == b"\r\n") || b.ends_with(b"\n"))
            .await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Format `host:port` for URLs, bracketing IPv6 literals.
pub fn authority(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_authority() {
        assert_eq!(authority("example.com", 80), "example.com:80");
        assert_eq!(authority("::1", 443), "[::1]:443");
    }

    #[tokio::test]
    async fn test_request_reads_until_complete() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let _ = sock.read(&mut buf).await;
            sock.write_all(b"hel").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            sock.write_all(b"lo!").await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let mut session = RawSession::connect("127.0.0.1", port, Duration::from_millis(500))
            .await
            .unwrap();
        let reply = session
            .request(b"ping", 1024, |b| b.ends_with(b"!"))
            .await
            .unwrap();
        assert_eq!(reply, b"hello!");
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let mut session = RawSession::connect("127.0.0.1", port, Duration::from_millis(100))
            .await
            .unwrap();
        assert!(matches!(session.read_some(64).await, Err(ScanError::Timeout)));
    }
}
