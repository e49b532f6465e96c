//! TLS inspection.
//!
//! The current protocol, cipher and leaf certificate come from a rustls
//! handshake that accepts any certificate. Support for SSL 3.0, TLS 1.0 and
//! TLS 1.1 (which rustls will not speak) and RC4 selection are detected
//! with hand-built ClientHello records, reading only the ServerHello.

use super::Assessment;
use crate::error::{ScanError, ScanResult};
use crate::probes::transport::RawSession;
use crate::types::Severity;
use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{self, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ProtocolVersion, SignatureScheme};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};
use x509_parser::x509::X509Name;

/// Certificates expiring within this many days get a warning.
pub const EXPIRY_WARNING_DAYS: i64 = 30;

const SSL3: u16 = 0x0300;
const TLS10: u16 = 0x0301;
const TLS11: u16 = 0x0302;
const TLS12: u16 = 0x0303;

const LEGACY_VERSIONS: [(u16, &str); 3] = [(SSL3, "SSL 3.0"), (TLS10, "TLS 1.0"), (TLS11, "TLS 1.1")];

/// Suites a pre-1.2 server is likely to accept.
const LEGACY_SUITES: [u16; 9] = [
    0xc013, 0xc014, 0xc009, 0xc00a, 0x002f, 0x0035, 0x000a, 0x0005, 0x0004,
];

const RC4_SUITES: [(u16, &str); 4] = [
    (0xc011, "TLS_ECDHE_RSA_WITH_RC4_128_SHA"),
    (0xc007, "TLS_ECDHE_ECDSA_WITH_RC4_128_SHA"),
    (0x0005, "TLS_RSA_WITH_RC4_128_SHA"),
    (0x0004, "TLS_RSA_WITH_RC4_128_MD5"),
];

const WEAK_CIPHER_MARKERS: [&str; 5] = ["RC4", "DES", "NULL", "EXPORT", "anon"];

/// Fields of the leaf certificate the checks look at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSummary {
    pub subject_cn: Option<String>,
    pub issuer_cn: Option<String>,
    pub not_after: DateTime<Utc>,
}

impl CertificateSummary {
    pub fn is_self_signed(&self) -> bool {
        matches!((&self.subject_cn, &self.issuer_cn), (Some(s), Some(i)) if s == i)
    }
}

/// Everything learned about a server's TLS configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsReport {
    /// Protocol negotiated by a modern client.
    pub protocol: Option<String>,
    pub cipher: Option<String>,
    pub certificate: Option<CertificateSummary>,
    /// Deprecated protocol versions the server accepted.
    pub legacy_protocols: Vec<String>,
    /// Weak suites the server selected when offered nothing else.
    pub legacy_ciphers: Vec<String>,
}

impl TlsReport {
    fn is_empty(&self) -> bool {
        self.protocol.is_none() && self.legacy_protocols.is_empty() && self.legacy_ciphers.is_empty()
    }
}

pub fn is_weak_cipher(name: &str) -> bool {
    WEAK_CIPHER_MARKERS.iter().any(|m| name.contains(m))
}

/// Certificate date and issuer warnings as of `now`.
pub fn check_certificate(cert: &CertificateSummary, now: DateTime<Utc>) -> Vec<String> {
    let mut warnings = Vec::new();
    let remaining = cert.not_after.signed_duration_since(now);

    if remaining.num_seconds() < 0 {
        warnings.push(format!(
            "SSL certificate expired on {}",
            cert.not_after.format("%Y-%m-%d")
        ));
    }
    if remaining.num_days() < EXPIRY_WARNING_DAYS {
        warnings.push(format!(
            "SSL certificate expires soon ({} days left)",
            remaining.num_days()
        ));
    }

    if cert.is_self_signed() {
        warnings.push("Self-signed certificate detected".to_string());
    }

    warnings
}

/// Turn a report into warnings. Every flag lifts severity to at least Medium.
pub fn evaluate(report: &TlsReport, now: DateTime<Utc>) -> Assessment {
    let mut assessment = Assessment::default();

    for protocol in &report.legacy_protocols {
        assessment.flag(format!("Deprecated protocol supported: {}", protocol), Severity::Medium);
    }

    let mut weak: Vec<&str> = report.legacy_ciphers.iter().map(String::as_str).collect();
    if let Some(cipher) = report.cipher.as_deref().filter(|c| is_weak_cipher(c)) {
        weak.push(cipher);
    }
    weak.dedup();
    for cipher in weak {
        assessment.flag(format!("Weak cipher suite: {}", cipher), Severity::Medium);
    }

    if let Some(cert) = &report.certificate {
        for warning in check_certificate(cert, now) {
            assessment.flag(warning, Severity::Medium);
        }
    }

    assessment
}

/// Accepts every certificate; signatures are still checked so the
/// handshake completes normally.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

fn common_name(name: &X509Name<'_>) -> Option<String> {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
}

/// Parse the fields we need out of a DER certificate.
pub fn summarize_certificate(der: &[u8]) -> Option<CertificateSummary> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).ok()?;
    let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)?;
    Some(CertificateSummary {
        subject_cn: common_name(cert.subject()),
        issuer_cn: common_name(cert.issuer()),
        not_after,
    })
}

fn protocol_name(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_3 => "TLS 1.3".to_string(),
        ProtocolVersion::TLSv1_2 => "TLS 1.2".to_string(),
        other => format!("{:?}", other),
    }
}

/// Handshake with rustls and record what was negotiated.
async fn modern_handshake(host: &str, port: u16, wait: Duration) -> ScanResult<TlsReport> {
    let provider = Arc::new(crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| ScanError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let server_name = ServerName::try_from(host)
        .map_err(|e| ScanError::Tls(e.to_string()))?
        .to_owned();

    let tcp = timeout(wait, TcpStream::connect((host, port)))
        .await
        .map_err(|_| ScanError::Timeout)??;
    let stream = timeout(wait, connector.connect(server_name, tcp))
        .await
        .map_err(|_| ScanError::Timeout)??;

    let (_, conn) = stream.get_ref();
    Ok(TlsReport {
        protocol: conn.protocol_version().map(protocol_name),
        cipher: conn
            .negotiated_cipher_suite()
            .map(|suite| format!("{:?}", suite.suite())),
        certificate: conn
            .peer_certificates()
            .and_then(|certs| certs.first())
            .and_then(|der| summarize_certificate(der.as_ref())),
        ..TlsReport::default()
    })
}

/// Build a ClientHello record offering exactly `version` and `suites`.
fn client_hello(version: u16, suites: &[u16], server_name: Option<&str>) -> Vec<u8> {
    let mut body = Vec::with_capacity(128);
    body.extend_from_slice(&version.to_be_bytes());
    body.extend_from_slice(&rand::random::<[u8; 32]>());
    body.push(0);
    body.extend_from_slice(&((suites.len() * 2) as u16).to_be_bytes());
    for suite in suites {
        body.extend_from_slice(&suite.to_be_bytes());
    }
    body.extend_from_slice(&[1, 0]);

    if version > SSL3 {
        let mut ext = Vec::new();
        if let Some(name) = server_name {
            let name = name.as_bytes();
            ext.extend_from_slice(&[0x00, 0x00]);
            ext.extend_from_slice(&((name.len() + 5) as u16).to_be_bytes());
            ext.extend_from_slice(&((name.len() + 3) as u16).to_be_bytes());
            ext.push(0);
            ext.extend_from_slice(&(name.len() as u16).to_be_bytes());
            ext.extend_from_slice(name);
        }
        // supported_groups: secp256r1, secp384r1
        ext.extend_from_slice(&[0x00, 0x0a, 0x00, 0x06, 0x00, 0x04, 0x00, 0x17, 0x00, 0x18]);
        // ec_point_formats: uncompressed
        ext.extend_from_slice(&[0x00, 0x0b, 0x00, 0x02, 0x01, 0x00]);
        body.extend_from_slice(&(ext.len() as u16).to_be_bytes());
        body.extend_from_slice(&ext);
    }

    let mut handshake = vec![0x01];
    handshake.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    handshake.extend_from_slice(&body);

    let mut record = vec![0x16];
    record.extend_from_slice(&version.min(TLS10).to_be_bytes());
    record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
    record.extend_from_slice(&handshake);
    record
}

/// Whether a full first record has arrived.
fn record_complete(buf: &[u8]) -> bool {
    buf.len() >= 5 && buf.len() >= 5 + u16::from_be_bytes([buf[3], buf[4]]) as usize
}

/// `(version, cipher suite)` chosen in a ServerHello, if that is what `buf` holds.
fn parse_server_hello(buf: &[u8]) -> Option<(u16, u16)> {
    if buf.first() != Some(&0x16) || buf.get(5) != Some(&0x02) {
        return None;
    }
    let version = u16::from_be_bytes([*buf.get(9)?, *buf.get(10)?]);
    let session_len = *buf.get(43)? as usize;
    let at = 44 + session_len;
    let suite = u16::from_be_bytes([*buf.get(at)?, *buf.get(at + 1)?]);
    Some((version, suite))
}

async fn offer(host: &str, port: u16, wait: Duration, version: u16, suites: &[u16]) -> Option<(u16, u16)> {
    let sni = host.parse::<IpAddr>().is_err().then_some(host);
    let mut session = RawSession::connect(host, port, wait).await.ok()?;
    let reply = session
        .request(&client_hello(version, suites, sni), 4096, record_complete)
        .await
        .ok()?;
    let hello = parse_server_hello(&reply);
    trace!(port, version, ?hello, "legacy ClientHello answered");
    hello
}

/// Inspect `host:port`. `None` when no TLS conversation was possible at all.
pub async fn inspect(host: &str, port: u16, wait: Duration) -> Option<TlsReport> {
    let mut report = match modern_handshake(host, port, wait).await {
        Ok(report) => report,
        Err(e) => {
            debug!(%host, port, error = %e, "TLS handshake failed");
            TlsReport::default()
        }
    };

    for (version, name) in LEGACY_VERSIONS {
        if let Some((chosen, _)) = offer(host, port, wait, version, &LEGACY_SUITES).await {
            if chosen == version {
                report.legacy_protocols.push(name.to_string());
            }
        }
    }

    let rc4: Vec<u16> = RC4_SUITES.iter().map(|(id, _)| *id).collect();
    if let Some((_, chosen)) = offer(host, port, wait, TLS12, &rc4).await {
        if let Some((_, name)) = RC4_SUITES.iter().find(|(id, _)| *id == chosen) {
            report.legacy_ciphers.push(name.to_string());
        }
    }

    (!report.is_empty()).then_some(report)
}
