//! Database default-credential probes.
//!
//! One sub-probe per database family, selected solely by port number. Every
//! family follows the same policy, implemented once in
//! [`run_credential_probe`]:
//!
//! 1. try each default credential pair in order, stopping at the first success;
//! 2. if none succeeds, try one unauthenticated login where the protocol allows it;
//! 3. once connected, run the family's follow-up checks and escalate severity.
//!
//! Connection errors, timeouts and malformed replies never fail the probe;
//! they only mean "no finding for this step".

mod mongodb;
mod mysql;
mod postgres;
mod redis;

pub use mongodb::MongoProbe;
pub use mysql::MySqlProbe;
pub use postgres::PostgresProbe;
pub use redis::RedisProbe;

use super::Finding;
use crate::types::Severity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Default per-attempt timeout for database probes.
pub const DATABASE_TIMEOUT: Duration = Duration::from_secs(3);

/// Database families with a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseKind {
    MySql,
    PostgreSql,
    MongoDb,
    Redis,
}

impl DatabaseKind {
    /// Which family, if any, owns this well-known port.
    pub fn for_port(port: u16) -> Option<Self> {
        match port {
            3306 => Some(Self::MySql),
            5432 => Some(Self::PostgreSql),
            27017..=27019 => Some(Self::MongoDb),
            6379 => Some(Self::Redis),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::MySql => "MySQL",
            Self::PostgreSql => "PostgreSQL",
            Self::MongoDb => "MongoDB",
            Self::Redis => "Redis",
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A username/password pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credential {
    pub username: &'static str,
    pub password: &'static str,
}

impl Credential {
    pub const fn new(username: &'static str, password: &'static str) -> Self {
        Self { username, password }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.username, self.password)
    }
}

/// A follow-up finding produced while holding a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    pub message: String,
    pub severity: Option<Severity>,
}

impl Escalation {
    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: None,
        }
    }

    pub fn raise(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity: Some(severity),
        }
    }
}

/// Result of probing one database port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseProbeResult {
    pub service: DatabaseKind,
    pub host: String,
    pub port: u16,
    pub accessible: bool,
    /// The credential pair that worked, if access was by credentials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    pub warnings: Vec<String>,
    pub severity: Severity,
}

impl DatabaseProbeResult {
    pub fn new(service: DatabaseKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            service,
            host: host.into(),
            port,
            accessible: false,
            credential: None,
            warnings: Vec::new(),
            severity: Severity::Low,
        }
    }

    fn apply(&mut self, escalations: Vec<Escalation>) {
        for e in escalations {
            if let Some(severity) = e.severity {
                self.severity.raise(severity);
            }
            self.warnings.push(e.message);
        }
    }
}

impl Finding for DatabaseProbeResult {
    fn service(&self) -> &str {
        self.service.name()
    }

    fn has_finding(&self) -> bool {
        self.accessible
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// One database family's login and follow-up logic.
#[async_trait]
pub trait CredentialProbe: Send + Sync {
    fn kind(&self) -> DatabaseKind;

    fn host(&self) -> &str;

    fn port(&self) -> u16;

    /// Default pairs to try, in order.
    fn default_credentials(&self) -> &[Credential];

    /// Whether an empty/absent credential login makes sense for this protocol.
    fn allows_unauthenticated(&self) -> bool;

    /// Attempt one login (`None` = unauthenticated). On success, run the
    /// follow-up checks on the live session and return their findings.
    /// Any failure returns `None`.
    async fn try_login(&self, credential: Option<&Credential>) -> Option<Vec<Escalation>>;
}

/// Apply the shared credential policy to one family.
pub async fn run_credential_probe<P>(probe: &P) -> DatabaseProbeResult
where
    P: CredentialProbe + ?Sized,
{
    let kind = probe.kind();
    let mut result = DatabaseProbeResult::new(kind, probe.host(), probe.port());

    for credential in probe.default_credentials() {
        if let Some(escalations) = probe.try_login(Some(credential)).await {
            info!(service = %kind, port = probe.port(), %credential, "default credentials accepted");
            result.accessible = true;
            result.credential = Some(credential.to_string());
            result.warnings.push(format!(
                "{} accessible with default credentials: {}",
                kind, credential
            ));
            result.severity = Severity::Critical;
            result.apply(escalations);
            return result;
        }
    }

    if probe.allows_unauthenticated() {
        if let Some(escalations) = probe.try_login(None).await {
            info!(service = %kind, port = probe.port(), "unauthenticated access accepted");
            result.accessible = true;
            result
                .warnings
                .push(format!("{} accessible without authentication", kind));
            result.severity = Severity::Critical;
            result.apply(escalations);
            return result;
        }
    }

    debug!(service = %kind, port = probe.port(), "database not accessible");
    result
}

/// Probe `host:port` with whichever family owns the port.
pub async fn probe_database(host: &str, port: u16, wait: Duration) -> Option<DatabaseProbeResult> {
    let kind = DatabaseKind::for_port(port)?;
    let result = match kind {
        DatabaseKind::MySql => run_credential_probe(&MySqlProbe::new(host, port, wait)).await,
        DatabaseKind::PostgreSql => {
            run_credential_probe(&PostgresProbe::new(host, port, wait)).await
        }
        DatabaseKind::MongoDb => run_credential_probe(&MongoProbe::new(host, port, wait)).await,
        DatabaseKind::Redis => run_credential_probe(&RedisProbe::new(host, port, wait)).await,
    };
    Some(result)
}

/// Leading numeric components of a version string, e.g. `"5.6.51-log"` → `[5, 6, 51]`.
pub(crate) fn version_numbers(version: &str) -> Vec<u32> {
    version
        .trim()
        .split(|c: char| !c.is_ascii_digit())
        .take_while(|part| !part.is_empty())
        .filter_map(|part| part.parse().ok())
        .collect()
}
