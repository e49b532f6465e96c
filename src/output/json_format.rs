//! JSON output formatting.

use crate::audit::AuditReport;
use std::io::{self, Write};

/// Write the whole report as pretty JSON.
pub fn write_json<W: Write>(report: &AuditReport, out: &mut W) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, report).map_err(io::Error::other)?;
    writeln!(out)
}
