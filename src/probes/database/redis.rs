//! Redis probe over raw RESP.

use super::{version_numbers, Credential, CredentialProbe, DatabaseKind, Escalation};
use crate::probes::transport::RawSession;
use crate::types::Severity;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, trace};

const MAX_REPLY: usize = 32 * 1024;

static REDIS_CREDENTIALS: &[Credential] = &[
    Credential::new("default", "redis"),
    Credential::new("default", "foobared"),
    Credential::new("default", "password"),
    Credential::new("default", "admin"),
];

pub struct RedisProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl RedisProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// INFO on an already-authenticated (or open) session, plus follow-ups.
    async fn inspect(&self, session: &mut RawSession) -> Option<Vec<Escalation>> {
        let info = session
            .request(&command(&["INFO"]), MAX_REPLY, reply_complete)
            .await
            .ok()?;
        let info = String::from_utf8_lossy(&info);
        if !info.contains("redis_version") {
            trace!(port = self.port, "INFO reply without redis_version");
            return None;
        }

        let mut findings = Vec::new();
        if let Some(version) = info_field(&info, "redis_version") {
            if version_numbers(version).first().is_some_and(|major| *major < 6) {
                findings.push(Escalation::raise(
                    format!("Outdated Redis version: {}", version),
                    Severity::Medium,
                ));
            }
        }

        match session
            .request(&command(&["CONFIG", "GET", "requirepass"]), MAX_REPLY, reply_complete)
            .await
        {
            Ok(reply) if requirepass_empty(&reply) => {
                findings.push(Escalation::raise("No password set for Redis", Severity::Critical));
                findings.push(Escalation::warn("Dangerous Redis commands are enabled"));
            }
            Ok(_) => {}
            Err(e) => debug!(port = self.port, error = %e, "CONFIG GET failed"),
        }

        Some(findings)
    }
}

/// Encode a command as a RESP array of bulk strings.
fn command(parts: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", parts.len()).into_bytes();
    for part in parts {
        out.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
        out.extend_from_slice(part.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

fn first_line(buf: &[u8]) -> Option<&[u8]> {
    let end = buf.windows(2).position(|w| w == b"\r\n")?;
    Some(&buf[..end])
}

/// True once one complete reply of the shapes we send for has arrived.
fn reply_complete(buf: &[u8]) -> bool {
    let Some(line) = first_line(buf) else {
        return false;
    };
    match line.first() {
        Some(b'+') | Some(b'-') | Some(b':') => true,
        Some(b'$') => {
            let Some(len) = std::str::from_utf8(&line[1..])
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
            else {
                return true;
            };
            if len < 0 {
                return true;
            }
            usize::try_from(len)
                .ok()
                .and_then(|len| len.checked_add(line.len() + 4))
                .is_some_and(|needed| buf.len() >= needed)
        }
        // Arrays: CONFIG GET answers with two bulk strings.
        Some(b'*') => {
            let count = std::str::from_utf8(&line[1..])
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(0);
            count
                .checked_mul(2)
                .is_some_and(|lines| buf.windows(2).filter(|w| w == b"\r\n").count() > lines)
        }
        _ => true,
    }
}

/// Value of `name:value` in an INFO reply.
fn info_field<'a>(info: &'a str, name: &str) -> Option<&'a str> {
    info.lines().find_map(|line| {
        line.strip_prefix(name)
            .and_then(|rest| rest.strip_prefix(':'))
            .map(str::trim)
    })
}

/// `CONFIG GET requirepass` answered with an empty value.
fn requirepass_empty(reply: &[u8]) -> bool {
    let text = String::from_utf8_lossy(reply);
    let lines: Vec<&str> = text.split("\r\n").collect();
    matches!(lines.as_slice(), ["*2", _, "requirepass", "$0", ..])
}

#[async_trait]
impl CredentialProbe for RedisProbe {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Redis
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn default_credentials(&self) -> &[Credential] {
        REDIS_CREDENTIALS
    }

    fn allows_unauthenticated(&self) -> bool {
        true
    }

    async fn try_login(&self, credential: Option<&Credential>) -> Option<Vec<Escalation>> {
        let mut session = RawSession::connect(&self.host, self.port, self.timeout)
            .await
            .ok()?;

        if let Some(credential) = credential {
            let reply = session
                .request(&command(&["AUTH", credential.password]), MAX_REPLY, reply_complete)
                .await
                .ok()?;
            if !reply.starts_with(b"+OK") {
                trace!(port = self.port, %credential, "AUTH rejected");
                return None;
            }
        }

        self.inspect(&mut session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::database::run_credential_probe;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_command_encoding() {
        assert_eq!(command(&["INFO"]), b"*1\r\n$4\r\nINFO\r\n".to_vec());
        assert_eq!(
            command(&["AUTH", "redis"]),
            b"*2\r\n$4\r\nAUTH\r\n$5\r\nredis\r\n".to_vec()
        );
    }

    #[test]
    fn test_reply_complete() {
        assert!(reply_complete(b"+OK\r\n"));
        assert!(reply_complete(b"-NOAUTH Authentication required.\r\n"));
        assert!(!reply_complete(b"$10\r\nredis_"));
        assert!(reply_complete(b"$5\r\nhello\r\n"));
        assert!(!reply_complete(b"*2\r\n$11\r\nrequirepass\r\n"));
        assert!(reply_complete(b"*2\r\n$11\r\nrequirepass\r\n$0\r\n\r\n"));
    }

    #[test]
    fn test_huge_declared_lengths_wait_for_more_data() {
        assert!(!reply_complete(b"*9223372036854775808\r\n"));
        assert!(!reply_complete(b"*18446744073709551615\r\n$1\r\na\r\n"));
        assert!(!reply_complete(b"$9223372036854775807\r\nabc"));
    }

    #[test]
    fn test_info_field() {
        let info = "# Server\r\nredis_version:5.0.7\r\nredis_mode:standalone\r\n";
        assert_eq!(info_field(info, "redis_version"), Some("5.0.7"));
        assert_eq!(info_field(info, "uptime"), None);
    }

    #[test]
    fn test_requirepass_empty() {
        assert!(requirepass_empty(b"*2\r\n$11\r\nrequirepass\r\n$0\r\n\r\n"));
        assert!(!requirepass_empty(b"*2\r\n$11\r\nrequirepass\r\n$6\r\nsecret\r\n"));
        assert!(!requirepass_empty(b"-NOAUTH\r\n"));
    }

    /// Answers every command with the same INFO blob.
    async fn spawn_open_redis() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let body = "# Server\r\nredis_version:7.2.4\r\n";
                    let reply = format!("${}\r\n{}\r\n", body.len(), body);
                    let mut buf = vec![0u8; 1024];
                    while let Ok(n) = sock.read(&mut buf).await {
                        if n == 0 || sock.write_all(reply.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        port
    }

    #[tokio::test]
    async fn test_open_redis_is_critical() {
        let port = spawn_open_redis().await;
        let probe = RedisProbe::new("127.0.0.1", port, Duration::from_millis(500));
        let result = run_credential_probe(&probe).await;

        assert!(result.accessible);
        assert_eq!(result.severity, Severity::Critical);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("accessible without authentication")));
    }

    #[tokio::test]
    async fn test_closed_port_is_not_accessible() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let probe = RedisProbe::new("127.0.0.1", port, Duration::from_millis(200));
        let result = run_credential_probe(&probe).await;
        assert!(!result.accessible);
        assert_eq!(result.severity, Severity::Low);
    }
}
