//! Output formatting module.
//!
//! Provides the plain-text executive summary and the JSON report. Neither
//! printer makes decisions: everything shown is already in the report.

mod json_format;
mod plain;

pub use json_format::write_json;
pub use plain::{print_error, print_scan_header, print_warning, write_plain};

use crate::audit::AuditReport;
use crate::config::OutputFormat;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Render `report` in `format` to `path`, or to stdout when no path is given.
pub fn write_report(report: &AuditReport, format: OutputFormat, path: Option<&Path>) -> io::Result<()> {
    match path {
        Some(path) => {
            let mut out = BufWriter::new(File::create(path)?);
            render(report, format, &mut out)?;
            out.flush()
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            render(report, format, &mut out)
        }
    }
}

fn render<W: Write>(report: &AuditReport, format: OutputFormat, out: &mut W) -> io::Result<()> {
    match format {
        OutputFormat::Plain => write_plain(report, out),
        OutputFormat::Json => write_json(report, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditResult;
    use crate::scanner::PortScanResult;
    use chrono::Utc;

    #[test]
    fn test_write_report_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = AuditReport {
            timestamp: Utc::now(),
            scan: PortScanResult::default(),
            audit: AuditResult::new("10.0.0.5"),
        };

        write_report(&report, OutputFormat::Json, Some(&path)).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["audit"]["host"], "10.0.0.5");
    }
}
