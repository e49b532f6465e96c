//! Banner grabbing functionality for TCP connections.
//!
//! Reads whatever a service sends unprompted right after the connection is
//! established. Nothing is written to the peer.

use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// Maximum bytes to read for a banner.
const MAX_BANNER_SIZE: usize = 1024;

/// Default timeout for banner grabbing.
pub const BANNER_TIMEOUT: Duration = Duration::from_secs(3);

/// Grab a banner from an open TCP port.
///
/// Returns `None` on connect failure, timeout, reset, or an empty read.
/// None of these are reportable errors.
pub async fn grab_banner(host: &str, port: u16, wait: Duration) -> Option<String> {
    let stream = match timeout(wait, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            trace!(host, port, error = %e, "banner connect failed");
            return None;
        }
        Err(_) => {
            trace!(host, port, "banner connect timed out");
            return None;
        }
    };

    grab_banner_from_stream(stream, wait).await
}

/// Grab banner from an existing TCP stream.
pub async fn grab_banner_from_stream(mut stream: TcpStream, wait: Duration) -> Option<String> {
    let mut buffer = vec![0u8; MAX_BANNER_SIZE];

    match timeout(wait, stream.read(&mut buffer)).await {
        Ok(Ok(n)) if n > 0 => {
            let banner = sanitize_banner(&buffer[..n]);
            (!banner.is_empty()).then_some(banner)
        }
        _ => None,
    }
}

/// Sanitize banner by removing non-printable characters and limiting length.
pub(crate) fn sanitize_banner(data: &[u8]) -> String {
    let s: String = data
        .iter()
        .take(256)
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else if b == b'\r' || b == b'\n' || b == b'\t' {
                ' '
            } else {
                '.'
            }
        })
        .collect();

    // Collapse multiple spaces and trim
    let mut result = String::with_capacity(s.len());
    let mut prev_space = false;
    for c in s.chars() {
        if c == ' ' {
            if !prev_space {
                result.push(c);
            }
            prev_space = true;
        } else {
            result.push(c);
            prev_space = false;
        }
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_banner() {
        let data = b"SSH-2.0-OpenSSH_8.9\r\n";
        assert_eq!(sanitize_banner(data), "SSH-2.0-OpenSSH_8.9");
    }

    #[test]
    fn test_sanitize_binary_data() {
        let data = b"\x00\x01Hello\x02World\x03";
        assert_eq!(sanitize_banner(data), "..Hello.World.");
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize_banner(b"220   ready\r\n\r\n"), "220 ready");
    }

    #[tokio::test]
    async fn test_refused_connection_is_none() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(grab_banner("127.0.0.1", port, Duration::from_millis(200)).await.is_none());
    }
}
