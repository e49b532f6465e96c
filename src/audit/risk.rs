//! Overall risk level.

use super::AuditResult;
use crate::probes::Finding;
use crate::types::Severity;

/// More raw misconfiguration strings than this force at least Medium.
pub const MISCONFIGURATION_THRESHOLD: usize = 2;

/// Highest severity present in `result`. Pure: depends only on its contents.
pub fn assess(result: &AuditResult) -> Severity {
    let mut severity = result
        .findings()
        .map(|finding| finding.effective_severity())
        .max()
        .unwrap_or_default();

    for vulnerability in &result.vulnerabilities {
        severity.raise(vulnerability.severity);
    }

    if result.misconfigurations.len() > MISCONFIGURATION_THRESHOLD {
        severity.raise(Severity::Medium);
    }

    severity
}
