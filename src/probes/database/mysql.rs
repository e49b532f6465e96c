//! MySQL default-credential probe, driven through `sqlx`.

use super::{version_numbers, Credential, CredentialProbe, DatabaseKind, Escalation};
use crate::types::Severity;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlSslMode};
use sqlx::{ConnectOptions, Connection};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

const DEFAULT_CREDENTIALS: &[Credential] = &[
    Credential::new("root", ""),
    Credential::new("root", "root"),
    Credential::new("root", "password"),
    Credential::new("admin", "admin"),
    Credential::new("mysql", "mysql"),
    Credential::new("test", "test"),
];

pub struct MySqlProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl MySqlProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    async fn connect(&self, username: &str, password: &str) -> Option<MySqlConnection> {
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(username)
            .password(password)
            .ssl_mode(MySqlSslMode::Disabled)
            .disable_statement_logging();

        match timeout(self.timeout, MySqlConnection::connect_with(&options)).await {
            Ok(Ok(conn)) => Some(conn),
            Ok(Err(e)) => {
                debug!(port = self.port, username, error = %e, "mysql login rejected");
                None
            }
            Err(_) => {
                debug!(port = self.port, username, "mysql login timed out");
                None
            }
        }
    }

    async fn follow_up(&self, conn: &mut MySqlConnection) -> Vec<Escalation> {
        let mut findings = Vec::new();

        let anonymous = timeout(
            self.timeout,
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM mysql.user WHERE user = ''")
                .fetch_one(&mut *conn),
        )
        .await;
        if let Ok(Ok(count)) = anonymous {
            if count > 0 {
                findings.push(Escalation::raise(
                    "Anonymous users found in MySQL",
                    Severity::High,
                ));
            }
        }

        let empty_passwords = timeout(
            self.timeout,
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM mysql.user WHERE authentication_string = ''",
            )
            .fetch_one(&mut *conn),
        )
        .await;
        if let Ok(Ok(count)) = empty_passwords {
            if count > 0 {
                findings.push(Escalation::raise(
                    "Users with empty passwords found",
                    Severity::Critical,
                ));
            }
        }

        let version = timeout(
            self.timeout,
            sqlx::query_scalar::<_, String>("SELECT VERSION()").fetch_one(&mut *conn),
        )
        .await;
        if let Ok(Ok(version)) = version {
            if is_outdated(&version) {
                findings.push(Escalation::raise(
                    format!("Outdated MySQL version: {}", version),
                    Severity::Medium,
                ));
            }
        }

        findings
    }
}

/// MySQL 5.6 and older are past end of life.
fn is_outdated(version: &str) -> bool {
    matches!(version_numbers(version).as_slice(), [major, minor, ..] if *major < 5 || (*major == 5 && *minor <= 6))
}

#[async_trait]
impl CredentialProbe for MySqlProbe {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MySql
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn default_credentials(&self) -> &[Credential] {
        DEFAULT_CREDENTIALS
    }

    fn allows_unauthenticated(&self) -> bool {
        true
    }

    async fn try_login(&self, credential: Option<&Credential>) -> Option<Vec<Escalation>> {
        let (username, password) = credential.map_or(("", ""), |c| (c.username, c.password));
        let mut conn = self.connect(username, password).await?;
        let findings = self.follow_up(&mut conn).await;
        let _ = conn.close().await;
        Some(findings)
    }
}
