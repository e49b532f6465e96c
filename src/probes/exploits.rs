//! Benign raw-handshake checks for legacy cleartext services.
//!
//! Every check stops as soon as the answer is known and never sends
//! anything beyond the handshake needed to observe the behavior.

use super::transport::RawSession;
use super::Finding;
use crate::types::Severity;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};

static OPENSSH_VERSION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"OpenSSH_(\d+)\.(\d+)").ok());

/// One check per service port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExploitKind {
    FtpAnonymous,
    SshLegacy,
    TelnetOpen,
    SmtpUserEnum,
    VncNoAuth,
}

impl ExploitKind {
    pub fn for_port(port: u16) -> Option<Self> {
        match port {
            21 => Some(Self::FtpAnonymous),
            22 => Some(Self::SshLegacy),
            23 => Some(Self::TelnetOpen),
            25 => Some(Self::SmtpUserEnum),
            5900 => Some(Self::VncNoAuth),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::FtpAnonymous => "FTP Anonymous Login",
            Self::SshLegacy => "SSH Legacy Protocol",
            Self::TelnetOpen => "Telnet Cleartext Access",
            Self::SmtpUserEnum => "SMTP User Enumeration",
            Self::VncNoAuth => "VNC Authentication Bypass",
        }
    }

    fn service(self) -> &'static str {
        match self {
            Self::FtpAnonymous => "FTP",
            Self::SshLegacy => "SSH",
            Self::TelnetOpen => "Telnet",
            Self::SmtpUserEnum => "SMTP",
            Self::VncNoAuth => "VNC",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploitProbeResult {
    pub kind: ExploitKind,
    pub exploit_name: String,
    pub host: String,
    pub port: u16,
    pub success: bool,
    pub severity: Severity,
    pub details: String,
    pub warnings: Vec<String>,
}

impl ExploitProbeResult {
    fn new(kind: ExploitKind, host: &str, port: u16) -> Self {
        Self {
            kind,
            exploit_name: kind.name().to_string(),
            host: host.to_string(),
            port,
            success: false,
            severity: Severity::Low,
            details: String::new(),
            warnings: Vec::new(),
        }
    }

    fn hit(&mut self, details: impl Into<String>, severity: Severity) {
        let details = details.into();
        self.success = true;
        self.severity.raise(severity);
        self.warnings.push(details.clone());
        if self.details.is_empty() {
            self.details = details;
        }
    }
}

impl Finding for ExploitProbeResult {
    fn service(&self) -> &str {
        self.kind.service()
    }

    fn has_finding(&self) -> bool {
        self.success
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Three-digit status code at the start of an FTP/SMTP reply.
fn reply_code(reply: &str) -> Option<u16> {
    reply.get(..3).and_then(|code| code.parse().ok())
}

/// A multi-line FTP/SMTP reply is complete once a line reads `NNN text`.
fn reply_complete(buf: &[u8]) -> bool {
    if !buf.ends_with(b"\r\n") && !buf.ends_with(b"\n") {
        return false;
    }
    String::from_utf8_lossy(buf)
        .lines()
        .last()
        .is_some_and(|line| line.len() >= 4 && line.as_bytes()[3] == b' ')
}

async fn command(session: &mut RawSession, line: &str) -> Option<String> {
    let reply = session
        .request(format!("{}\r\n", line).as_bytes(), 4096, reply_complete)
        .await
        .ok()?;
    Some(String::from_utf8_lossy(&reply).into_owned())
}

async fn greeting(session: &mut RawSession) -> Option<String> {
    let reply = session.read_until(4096, reply_complete).await.ok()?;
    Some(String::from_utf8_lossy(&reply).into_owned())
}

async fn ftp_anonymous(result: &mut ExploitProbeResult, session: &mut RawSession) -> Option<()> {
    greeting(session).await?;
    let user = command(session, "USER anonymous").await?;
    let code = match reply_code(&user)? {
        331 => reply_code(&command(session, "PASS anonymous@example.com").await?)?,
        other => other,
    };
    if code == 230 {
        result.hit("Anonymous FTP login allowed", Severity::High);
    }
    Some(())
}

/// Findings derived from an SSH identification string.
fn assess_ssh_banner(banner: &str) -> Vec<(String, Severity)> {
    let mut findings = Vec::new();
    if banner.starts_with("SSH-1.") {
        findings.push((
            format!("SSH protocol version 1 supported: {}", banner),
            Severity::High,
        ));
    }

    let major = OPENSSH_VERSION
        .as_ref()
        .and_then(|re| re.captures(banner))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok());
    if major.is_some_and(|m| m < 7) {
        findings.push((format!("Outdated OpenSSH version: {}", banner), Severity::Medium));
    }
    findings
}

async fn ssh_legacy(result: &mut ExploitProbeResult, session: &mut RawSession) -> Option<()> {
    let banner = session.read_line().await.ok()?;
    for (message, severity) in assess_ssh_banner(banner.trim()) {
        result.hit(message, severity);
    }
    Some(())
}

async fn smtp_user_enum(result: &mut ExploitProbeResult, session: &mut RawSession) -> Option<()> {
    let hello = greeting(session).await?;
    if reply_code(&hello)? != 220 {
        return None;
    }
    command(session, "HELO hostaudit.local").await?;
    let vrfy = command(session, "VRFY root").await?;
    if matches!(reply_code(&vrfy), Some(250) | Some(252)) {
        result.hit("SMTP VRFY command allows user enumeration", Severity::Medium);
    }
    let _ = session.send(b"QUIT\r\n").await;
    Some(())
}

/// Security types offered by an RFB server after the version exchange.
fn rfb_security_types(version: &[u8], reply: &[u8]) -> Vec<u8> {
    let legacy = version.starts_with(b"RFB 003.003");
    if legacy {
        // 3.3 servers pick the type themselves as a big-endian u32.
        return reply
            .get(..4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .and_then(|t| u8::try_from(t).ok())
            .into_iter()
            .collect();
    }
    match reply.split_first() {
        Some((&count, types)) if count > 0 => types.iter().take(count as usize).copied().collect(),
        _ => Vec::new(),
    }
}

async fn vnc_no_auth(result: &mut ExploitProbeResult, session: &mut RawSession) -> Option<()> {
    let version = session.read_some(12).await.ok()?;
    if !version.starts_with(b"RFB ") {
        return None;
    }
    let reply = session
        .request(&version, 256, |buf| !buf.is_empty())
        .await
        .ok()?;
    if rfb_security_types(&version, &reply).contains(&1) {
        result.hit("VNC server allows connections without authentication", Severity::Critical);
    }
    Some(())
}

/// Run the check owning `port`, if any.
pub async fn probe_exploit(host: &str, port: u16, wait: Duration) -> Option<ExploitProbeResult> {
    let kind = ExploitKind::for_port(port)?;
    Some(run_check(kind, host, port, wait).await)
}

/// Run one check against `host:port` regardless of the port number.
pub async fn run_check(kind: ExploitKind, host: &str, port: u16, wait: Duration) -> ExploitProbeResult {
    let mut result = ExploitProbeResult::new(kind, host, port);

    let mut session = match RawSession::connect(host, port, wait).await {
        Ok(session) => session,
        Err(e) => {
            debug!(%host, port, error = %e, "exploit check could not connect");
            return result;
        }
    };

    let outcome = match kind {
        ExploitKind::FtpAnonymous => ftp_anonymous(&mut result, &mut session).await,
        ExploitKind::SshLegacy => ssh_legacy(&mut result, &mut session).await,
        ExploitKind::TelnetOpen => {
            result.hit("Telnet service accepting connections (cleartext remote shell)", Severity::High);
            Some(())
        }
        ExploitKind::SmtpUserEnum => smtp_user_enum(&mut result, &mut session).await,
        ExploitKind::VncNoAuth => vnc_no_auth(&mut result, &mut session).await,
    };

    if outcome.is_none() {
        debug!(%host, port, check = kind.name(), "unexpected reply, no finding");
    } else if result.success {
        info!(%host, port, check = kind.name(), severity = %result.severity, "check succeeded");
    }
    result
}
