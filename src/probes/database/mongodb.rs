//! MongoDB unauthenticated-access probe over raw OP_MSG.
//!
//! There are no default credentials to try: the probe issues
//! `listDatabases` with no authentication. A reply with a recognizable
//! opcode and `ok: 1.0` means the server serves data to anyone.

use super::{version_numbers, Credential, CredentialProbe, DatabaseKind, Escalation};
use crate::probes::transport::RawSession;
use crate::types::Severity;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

const OP_REPLY: i32 = 1;
const OP_MSG: i32 = 2013;
const HEADER_LEN: usize = 16;
const MAX_REPLY: usize = 16 * 1024;

pub struct MongoProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl MongoProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    async fn command(&self, session: &mut RawSession, request_id: i32, doc: &[u8]) -> Option<Vec<u8>> {
        let msg = op_msg(request_id, doc);
        match session.request(&msg, MAX_REPLY, message_complete).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                debug!(port = self.port, error = %e, "mongodb command failed");
                None
            }
        }
    }
}

/// Minimal BSON document writer.
#[derive(Default)]
struct BsonDoc {
    body: Vec<u8>,
}

impl BsonDoc {
    fn int32(mut self, name: &str, value: i32) -> Self {
        self.body.push(0x10);
        self.cstring(name);
        self.body.extend_from_slice(&value.to_le_bytes());
        self
    }

    fn boolean(mut self, name: &str, value: bool) -> Self {
        self.body.push(0x08);
        self.cstring(name);
        self.body.push(u8::from(value));
        self
    }

    fn string(mut self, name: &str, value: &str) -> Self {
        self.body.push(0x02);
        self.cstring(name);
        self.body
            .extend_from_slice(&((value.len() + 1) as i32).to_le_bytes());
        self.body.extend_from_slice(value.as_bytes());
        self.body.push(0);
        self
    }

    fn cstring(&mut self, s: &str) {
        self.body.extend_from_slice(s.as_bytes());
        self.body.push(0);
    }

    fn finish(self) -> Vec<u8> {
        let len = (self.body.len() + 5) as i32;
        let mut out = Vec::with_capacity(len as usize);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&self.body);
        out.push(0);
        out
    }
}

/// Wrap one BSON document in an OP_MSG with a single kind-0 section.
fn op_msg(request_id: i32, doc: &[u8]) -> Vec<u8> {
    let total = (HEADER_LEN + 4 + 1 + doc.len()) as i32;
    let mut msg = Vec::with_capacity(total as usize);
    msg.extend_from_slice(&total.to_le_bytes());
    msg.extend_from_slice(&request_id.to_le_bytes());
    msg.extend_from_slice(&0i32.to_le_bytes());
    msg.extend_from_slice(&OP_MSG.to_le_bytes());
    msg.extend_from_slice(&0u32.to_le_bytes());
    msg.push(0);
    msg.extend_from_slice(doc);
    msg
}

/// Random non-negative request id.
fn request_id() -> i32 {
    rand::random::<i32>() & i32::MAX
}

fn read_i32(buf: &[u8], at: usize) -> Option<i32> {
    let bytes: [u8; 4] = buf.get(at..at + 4)?.try_into().ok()?;
    Some(i32::from_le_bytes(bytes))
}

/// True once the buffer holds the full message announced by its header.
fn message_complete(buf: &[u8]) -> bool {
    read_i32(buf, 0).is_some_and(|len| len > 0 && buf.len() >= len as usize)
}

/// Reply opcode if the buffer starts with a plausible wire header.
fn reply_opcode(buf: &[u8]) -> Option<i32> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    read_i32(buf, 12).filter(|op| *op == OP_MSG || *op == OP_REPLY)
}

/// `ok: 1.0` encoded as a BSON double.
fn reply_ok(buf: &[u8]) -> bool {
    let mut needle = vec![0x01];
    needle.extend_from_slice(b"ok\0");
    needle.extend_from_slice(&1.0f64.to_le_bytes());
    buf.windows(needle.len()).any(|w| w == needle.as_slice())
}

/// Value of a top-level-looking BSON string element named `name`.
fn bson_string(buf: &[u8], name: &str) -> Option<String> {
    let mut needle = vec![0x02];
    needle.extend_from_slice(name.as_bytes());
    needle.push(0);
    let at = buf.windows(needle.len()).position(|w| w == needle.as_slice())? + needle.len();
    let len = read_i32(buf, at)?;
    if len <= 0 {
        return None;
    }
    let raw = buf.get(at + 4..at + 4 + len as usize - 1)?;
    Some(String::from_utf8_lossy(raw).into_owned())
}

/// Count `name` string elements inside the reply (one per listed database).
fn count_names(buf: &[u8]) -> usize {
    let needle = b"\x02name\0";
    buf.windows(needle.len()).filter(|w| w == needle).count()
}

/// Whether a reply says the command succeeded without authentication.
fn accessible_reply(buf: &[u8]) -> bool {
    reply_opcode(buf).is_some() && reply_ok(buf)
}

#[async_trait]
impl CredentialProbe for MongoProbe {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MongoDb
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn default_credentials(&self) -> &[Credential] {
        &[]
    }

    fn allows_unauthenticated(&self) -> bool {
        true
    }

    async fn try_login(&self, credential: Option<&Credential>) -> Option<Vec<Escalation>> {
        if credential.is_some() {
            return None;
        }

        let mut session = RawSession::connect(&self.host, self.port, self.timeout)
            .await
            .ok()?;

        let list = BsonDoc::default()
            .int32("listDatabases", 1)
            .boolean("nameOnly", true)
            .string("$db", "admin")
            .finish();
        let reply = self.command(&mut session, request_id(), &list).await?;
        if !accessible_reply(&reply) {
            debug!(port = self.port, "mongodb refused unauthenticated listDatabases");
            return None;
        }

        let mut findings = Vec::new();
        let databases = count_names(&reply);
        if databases > 0 {
            findings.push(Escalation::warn(format!(
                "{} databases listed without authentication",
                databases
            )));
        }

        let build_info = BsonDoc::default()
            .int32("buildInfo", 1)
            .string("$db", "admin")
            .finish();
        if let Some(reply) = self.command(&mut session, request_id(), &build_info).await {
            if let Some(version) = bson_string(&reply, "version") {
                if version_numbers(&version).first().is_some_and(|major| *major < 4) {
                    findings.push(Escalation::raise(
                        format!("Outdated MongoDB version: {}", version),
                        Severity::Medium,
                    ));
                }
            }
        }

        Some(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::database::run_credential_probe;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn reply(doc: Vec<u8>) -> Vec<u8> {
        op_msg(7, &doc)
    }

    #[test]
    fn test_request_ids_are_non_negative() {
        assert_eq!(i32::MIN & i32::MAX, 0);
        for _ in 0..10_000 {
            assert!(request_id() >= 0);
        }
    }

    fn ok_doc() -> BsonDoc {
        let mut doc = BsonDoc::default();
        doc.body.push(0x01);
        doc.cstring("ok");
        doc.body.extend_from_slice(&1.0f64.to_le_bytes());
        doc
    }

    #[test]
    fn test_bson_layout() {
        let doc = BsonDoc::default().int32("a", 1).finish();
        assert_eq!(doc, vec![12, 0, 0, 0, 0x10, b'a', 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_op_msg_header() {
        let doc = BsonDoc::default().int32("ping", 1).finish();
        let msg = op_msg(42, &doc);
        assert_eq!(read_i32(&msg, 0), Some(msg.len() as i32));
        assert_eq!(read_i32(&msg, 4), Some(42));
        assert_eq!(read_i32(&msg, 12), Some(OP_MSG));
        assert!(message_complete(&msg));
        assert!(!message_complete(&msg[..10]));
    }

    #[test]
    fn test_accessible_reply_requires_ok() {
        let ok = reply(ok_doc().finish());
        assert!(accessible_reply(&ok));

        let unauthorized = reply(
            BsonDoc::default()
                .string("errmsg", "command listDatabases requires authentication")
                .finish(),
        );
        assert!(!accessible_reply(&unauthorized));
        assert!(!accessible_reply(b"HTTP/1.0 200 OK\r\n\r\nIt looks like you are trying"));
    }

    #[test]
    fn test_bson_string_extraction() {
        let doc = BsonDoc::default().string("version", "3.6.23").finish();
        assert_eq!(bson_string(&reply(doc), "version").as_deref(), Some("3.6.23"));
    }

    #[tokio::test]
    async fn test_open_server_is_flagged() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            // listDatabases
            let _ = sock.read(&mut buf).await;
            let doc = ok_doc().string("name", "admin").string("name", "shop");
            sock.write_all(&reply(doc.finish())).await.unwrap();
            // buildInfo
            let _ = sock.read(&mut buf).await;
            let info = ok_doc().string("version", "3.4.1").finish();
            sock.write_all(&reply(info)).await.unwrap();
        });

        let probe = MongoProbe::new("127.0.0.1", port, Duration::from_secs(1));
        let result = run_credential_probe(&probe).await;

        assert!(result.accessible);
        assert_eq!(result.severity, Severity::Critical);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("accessible without authentication")));
        assert!(result.warnings.iter().any(|w| w.starts_with("2 databases")));
        assert!(result.warnings.iter().any(|w| w.contains("Outdated MongoDB version: 3.4.1")));
    }

    #[tokio::test]
    async fn test_garbage_reply_is_not_accessible() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let _ = sock.read(&mut buf).await;
            sock.write_all(b"not mongo at all").await.unwrap();
        });

        let probe = MongoProbe::new("127.0.0.1", port, Duration::from_millis(300));
        let result = run_credential_probe(&probe).await;
        assert!(!result.accessible);
        assert_eq!(result.severity, Severity::Low);
    }
}
