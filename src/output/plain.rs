//! Plain text output formatting.
//!
//! Produces a human-readable executive summary with colors and formatting.

use crate::audit::AuditReport;
use crate::probes::Finding;
use crate::types::Severity;
use console::{style, Style};
use std::io::{self, Write};

const RULE: &str = "═══════════════════════════════════════════════════════════════";
const THIN_RULE: &str = "───────────────────────────────────────────────────────────────";

fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Critical => Style::new().red().bold(),
        Severity::High => Style::new().red(),
        Severity::Medium => Style::new().yellow(),
        Severity::Low => Style::new().green(),
    }
}

/// Write the executive summary.
pub fn write_plain<W: Write>(report: &AuditReport, out: &mut W) -> io::Result<()> {
    let audit = &report.audit;

    writeln!(out)?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(
        out,
        "                 {} Security Audit Summary",
        style("hostaudit").cyan().bold()
    )?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(out)?;

    writeln!(out, "  {} {}", style("Target:").bold(), audit.host)?;
    writeln!(
        out,
        "  {} {}",
        style("Completed:").bold(),
        report.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(
        out,
        "  {} {}",
        style("Risk Level:").bold(),
        severity_style(audit.severity).apply_to(audit.severity)
    )?;
    writeln!(out)?;

    writeln!(
        out,
        "  {} {} ports scanned in {:.2}s, {} open",
        style("Statistics:").bold(),
        report.scan.ports_scanned(),
        report.scan.duration_ms as f64 / 1000.0,
        style(report.scan.open_ports.len()).green().bold()
    )?;
    writeln!(
        out,
        "               {} vulnerabilities, {} misconfigurations, {} probe findings",
        audit.vulnerabilities.len(),
        audit.misconfigurations.len(),
        audit.findings().filter(|f| f.has_finding()).count()
    )?;
    writeln!(out)?;

    if audit.services.is_empty() {
        writeln!(out, "  {}", style("No open ports found.").dim())?;
    } else {
        writeln!(out, "  {}", style(THIN_RULE).dim())?;
        writeln!(
            out,
            "  {:>6}  {:<15}  {}",
            style("PORT").bold(),
            style("SERVICE").bold(),
            style("VERSION").bold()
        )?;
        writeln!(out, "  {}", style(THIN_RULE).dim())?;
        for service in &audit.services {
            let version = service
                .version
                .as_deref()
                .map(|v| truncate_string(v, 35))
                .unwrap_or_default();
            writeln!(
                out,
                "  {:>6}  {:<15}  {}",
                service.port,
                service.base_name(),
                style(version).dim()
            )?;
        }
        writeln!(out, "  {}", style(THIN_RULE).dim())?;
    }

    if let Some(recon) = &audit.recon {
        if !recon.technologies.is_empty() {
            writeln!(out)?;
            writeln!(
                out,
                "  {} {}",
                style("Technologies:").bold(),
                recon.technologies.join(", ")
            )?;
        }
        writeln!(
            out,
            "  {} {} ({} confidence)",
            style("OS Guess:").bold(),
            recon.os_fingerprint,
            recon.os_confidence
        )?;
    }

    let critical: Vec<&dyn Finding> = audit.issues_at_least(Severity::High).collect();
    if !critical.is_empty() {
        writeln!(out)?;
        writeln!(out, "  {}", style("Critical Issues:").red().bold())?;
        for finding in critical {
            writeln!(
                out,
                "    {} [{}]",
                style(finding.service()).bold(),
                severity_style(finding.severity()).apply_to(finding.severity())
            )?;
            for warning in finding.warnings() {
                writeln!(out, "      - {}", warning)?;
            }
        }
    }

    if !audit.vulnerabilities.is_empty() {
        writeln!(out)?;
        writeln!(out, "  {}", style("Vulnerabilities:").bold())?;
        for v in &audit.vulnerabilities {
            writeln!(
                out,
                "    {:>6}  {}  {} ({:.1}) {}",
                v.port,
                style(&v.cve).yellow(),
                severity_style(v.severity).apply_to(v.severity),
                v.score,
                v.description
            )?;
        }
    }

    if !audit.misconfigurations.is_empty() {
        writeln!(out)?;
        writeln!(out, "  {}", style("Misconfigurations:").bold())?;
        for m in &audit.misconfigurations {
            writeln!(out, "    - {}", m)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(out)?;

    Ok(())
}

/// Print a scan header before scanning begins.
pub fn print_scan_header(target: &str, ports: usize) {
    eprintln!();
    eprintln!(
        "{} {} v{}",
        style("Starting").cyan(),
        style("hostaudit").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("{} Target: {}", style("•").dim(), style(target).white().bold());
    eprintln!(
        "{} Scanning {} ports...",
        style("•").dim(),
        style(ports).white().bold()
    );
    eprintln!();
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", style("Error:").red().bold(), msg);
}

/// Print a warning message.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", style("Warning:").yellow().bold(), msg);
}

/// Truncate a string to at most `max_len` characters, adding an ellipsis if truncated.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
