//! PostgreSQL default-credential probe, driven through `sqlx`.

use super::{Credential, CredentialProbe, DatabaseKind, Escalation};
use crate::types::Severity;
use async_trait::async_trait;
use regex::Regex;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::{ConnectOptions, Connection};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

const DEFAULT_CREDENTIALS: &[Credential] = &[
    Credential::new("postgres", ""),
    Credential::new("postgres", "postgres"),
    Credential::new("postgres", "password"),
    Credential::new("admin", "admin"),
];

static PG_VERSION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"PostgreSQL (\d+)(?:\.(\d+))?").ok());

pub struct PostgresProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl PostgresProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    async fn follow_up(&self, conn: &mut PgConnection) -> Vec<Escalation> {
        let mut findings = Vec::new();

        let version = timeout(
            self.timeout,
            sqlx::query_scalar::<_, String>("SELECT version()").fetch_one(&mut *conn),
        )
        .await;
        if let Ok(Ok(version)) = version {
            if is_outdated(&version) {
                findings.push(Escalation::raise(
                    format!("Outdated PostgreSQL version: {}", version),
                    Severity::Medium,
                ));
            }
        }

        let superusers = timeout(
            self.timeout,
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pg_user WHERE usesuper = true")
                .fetch_one(&mut *conn),
        )
        .await;
        if let Ok(Ok(count)) = superusers {
            if count > 1 {
                findings.push(Escalation::raise(
                    format!("Multiple superuser accounts found: {}", count),
                    Severity::Medium,
                ));
            }
        }

        findings
    }
}

/// Major versions before 10 are unsupported.
fn is_outdated(version: &str) -> bool {
    PG_VERSION
        .as_ref()
        .and_then(|re| re.captures(version))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .is_some_and(|major| major < 10)
}

#[async_trait]
impl CredentialProbe for PostgresProbe {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::PostgreSql
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

    /// The startup message always names a role.
    fn allows_unauthenticated(&self) -> bool {
        false
    }

    async fn try_login(&self, credential: Option<&Credential>) -> Option<Vec<Escalation>> {
        let credential = credential?;
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(credential.username)
            .password(credential.password)
            .database("postgres")
            .ssl_mode(PgSslMode::Disable)
            .disable_statement_logging();

        let mut conn = match timeout(self.timeout, PgConnection::connect_with(&options)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                debug!(port = self.port, %credential, error = %e, "postgres login rejected");
                return None;
            }
            Err(_) => {
                debug!(port = self.port, %credential, "postgres login timed out");
                return None;
            }
        };

        let findings = self.follow_up(&mut conn).await;
        let _ = conn.close().await;
        Some(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outdated_versions() {
        assert!(is_outdated(
            "PostgreSQL 9.6.24 on x86_64-pc-linux-gnu, compiled by gcc 6.3.0"
        ));
        assert!(!is_outdated(
            "PostgreSQL 15.4 on x86_64-pc-linux-gnu, compiled by gcc (GCC) 9.3.0"
        ));
        assert!(!is_outdated("not a version"));
    }

    #[tokio::test]
    async fn test_no_unauthenticated_attempt() {
        let probe = PostgresProbe::new("127.0.0.1", 1, Duration::from_millis(100));
        assert!(!probe.allows_unauthenticated());
        assert!(probe.try_login(None).await.is_none());
    }
}
