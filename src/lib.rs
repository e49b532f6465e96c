//! # hostaudit - Single-Host Network Security Auditor
//!
//! hostaudit connect-scans one host, identifies the services behind its
//! open ports, runs protocol probes against them and folds every finding
//! into a single risk level.
//!
//! ## Features
//!
//! - **Bounded Scanning**: TCP connect scan behind a fixed admission gate,
//!   with optional rate limiting and cancellation
//! - **Service Identification**: well-known port table plus passive banner reads
//! - **Database Probes**: default-credential and unauthenticated access checks
//!   for MySQL, PostgreSQL, MongoDB and Redis
//! - **Web Probes**: security headers, TLS configuration and common exposures
//! - **Handshake Checks**: anonymous FTP, legacy SSH, open Telnet, SMTP user
//!   enumeration and unauthenticated VNC
//! - **Recon**: DNS records, common subdomains, technology and OS hints
//! - **Local Checks**: SUID binaries, file permissions, risky processes
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use hostaudit::{run_audit, AuditOptions, ScanOptions, ScanTarget};
//!
//! #[tokio::main]
//! async fn main() {
//!     let target = ScanTarget::common("192.168.1.10").unwrap();
//!     let report = run_audit(&target, &ScanOptions::default(), AuditOptions::default()).await;
//!
//!     println!("Risk level: {}", report.audit.severity);
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`] - Ports, targets and severity
//! - [`scanner`] - The `Scanner` trait and the bounded-concurrency executor
//! - [`services`] / [`banner`] - Service identification
//! - [`probes`] - Protocol probes, one module per family
//! - [`audit`] - Dispatcher, aggregate result and risk scoring
//! - [`config`] - Settings file and XDG paths
//! - [`output`] - Plain and JSON report printers
//! - [`error`] - Error types

pub mod audit;
pub mod banner;
pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod probes;
pub mod scanner;
pub mod services;
pub mod types;

// Re-export commonly used types
pub use audit::{run_audit, AuditOptions, AuditReport, AuditResult, Auditor};
pub use error::{ConfigError, InputError, ScanError};
pub use probes::{Finding, ProbeResult};
pub use scanner::{run_scan, PortScanResult, ScanOptions, Scanner};
pub use types::{Port, PortSpec, ScanTarget, Severity, TargetSpec};
