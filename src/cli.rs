//! Command-line interface definitions for hostaudit.
//!
//! Uses `clap` derive macros for declarative argument parsing. Flags left
//! unset fall back to the settings file.

use crate::audit::AuditOptions;
use crate::config::{AuditSettings, OutputFormat};
use crate::error::{InputError, InputResult};
use crate::scanner::ScanOptions;
use crate::types::{Port, PortError, PortSpec, ScanTarget};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Single-host network security auditor.
#[derive(Parser, Debug)]
#[command(name = "hostaudit")]
#[command(version)]
#[command(about = "Scan a host, probe its services and score the risk", long_about = None)]
pub struct Args {
    /// Target IP address or hostname to audit
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// Ports to scan ("common", "80", "80,443", "1-1000", "22,80,8000-9000")
    #[arg(short, long)]
    pub ports: Option<String>,

    /// Connection timeout in milliseconds
    #[arg(short = 't', long)]
    pub timeout: Option<u64>,

    /// Maximum number of concurrent connection attempts
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Rate limit in connection attempts per second (0 = unlimited)
    #[arg(short = 'r', long = "rate")]
    pub rate_limit: Option<u32>,

    /// Output format for the report
    #[arg(short, long, value_enum)]
    pub output: Option<OutputArg>,

    /// Write the report to a file instead of stdout
    #[arg(long = "output-file", value_name = "PATH")]
    pub output_file: Option<PathBuf>,

    /// Skip DNS and technology reconnaissance
    #[arg(long)]
    pub skip_recon: bool,

    /// Skip raw-handshake exploit checks
    #[arg(long)]
    pub skip_exploits: bool,

    /// Also audit the local machine (SUID files, permissions, processes)
    #[arg(long)]
    pub local_checks: bool,

    /// Settings file to use instead of the default location
    #[arg(long, value_name = "PATH", env = "HOSTAUDIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose output (debug logging and scan progress)
    #[arg(short, long)]
    pub verbose: bool,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputArg {
    /// Human-readable executive summary
    Plain,
    /// JSON structured output
    Json,
}

impl From<OutputArg> for OutputFormat {
    fn from(arg: OutputArg) -> Self {
        match arg {
            OutputArg::Plain => OutputFormat::Plain,
            OutputArg::Json => OutputFormat::Json,
        }
    }
}

/// Everything the binary needs for one run, after merging flags and settings.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub target: ScanTarget,
    pub scan: ScanOptions,
    pub audit: AuditOptions,
    pub output: OutputFormat,
    pub output_path: Option<PathBuf>,
    pub local_checks: bool,
}

impl Args {
    /// Merge flags over `settings`. Invalid input is rejected here, before
    /// any connection is made.
    pub fn plan(&self, settings: &AuditSettings) -> InputResult<RunPlan> {
        let spec = match (&self.ports, settings.ports.is_empty()) {
            (Some(ports), _) => ports.parse::<PortSpec>()?,
            (None, true) => PortSpec::common(),
            (None, false) => settings_ports(&settings.ports)?,
        };

        let timeout_ms = self.timeout.unwrap_or(settings.timeout_ms);
        if timeout_ms == 0 {
            return Err(InputError::InvalidOption("timeout must be positive".to_string()));
        }
        let concurrency = self.concurrency.unwrap_or(settings.max_workers);
        if concurrency == 0 {
            return Err(InputError::InvalidOption("concurrency must be positive".to_string()));
        }

        let target = ScanTarget::from_spec(
            self.target.as_str(),
            &spec,
            std::time::Duration::from_millis(timeout_ms),
        )?;

        let mut scan = ScanOptions::default()
            .with_concurrency(concurrency)
            .with_rate_limit(self.rate_limit.unwrap_or(settings.rate_limit));
        if self.verbose {
            scan = scan.with_progress();
        }

        let audit = AuditOptions {
            skip_recon: self.skip_recon || settings.skip_recon,
            skip_exploits: self.skip_exploits || settings.skip_exploits,
            ..AuditOptions::default()
        };

        Ok(RunPlan {
            target,
            scan,
            audit,
            output: self.output.map(Into::into).unwrap_or(settings.output_format),
            output_path: self.output_file.clone().or_else(|| settings.output_path.clone()),
            local_checks: self.local_checks,
        })
    }
}

fn settings_ports(ports: &[u16]) -> InputResult<PortSpec> {
    let mut spec = PortSpec::new();
    for &p in ports {
        spec.add_port(Port::new(p).ok_or(PortError::OutOfRange(p))?);
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["hostaudit", "127.0.0.1"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults_come_from_settings() {
        let plan = args(&[]).plan(&AuditSettings::default()).unwrap();
        assert_eq!(plan.target.ports().len(), crate::types::COMMON_PORTS.len());
        assert_eq!(plan.target.timeout().as_millis(), 2000);
        assert_eq!(plan.scan.concurrency, 100);
        assert!(plan.scan.rate_limit.is_none());
        assert_eq!(plan.output, OutputFormat::Plain);
        assert!(!plan.local_checks);
    }

    #[test]
    fn test_flags_override_settings() {
        let settings = AuditSettings {
            ports: vec![22],
            output_format: OutputFormat::Json,
            ..AuditSettings::default()
        };
        let plan = args(&["-p", "80,443", "-t", "500", "-o", "plain", "--skip-recon"])
            .plan(&settings)
            .unwrap();
        let ports: Vec<u16> = plan.target.ports().iter().map(|p| p.as_u16()).collect();
        assert_eq!(ports, vec![80, 443]);
        assert_eq!(plan.target.timeout().as_millis(), 500);
        assert_eq!(plan.output, OutputFormat::Plain);
        assert!(plan.audit.skip_recon);
    }

    #[test]
    fn test_settings_ports_used_without_flag() {
        let settings = AuditSettings {
            ports: vec![3306, 22],
            ..AuditSettings::default()
        };
        let plan = args(&[]).plan(&settings).unwrap();
        let ports: Vec<u16> = plan.target.ports().iter().map(|p| p.as_u16()).collect();
        assert_eq!(ports, vec![22, 3306]);
    }

    #[test]
    fn test_invalid_port_spec_is_rejected() {
        assert!(matches!(
            args(&["-p", "100-50"]).plan(&AuditSettings::default()),
            Err(InputError::Port(PortError::InvalidRange(100, 50)))
        ));
        assert!(args(&["-p", "abc"]).plan(&AuditSettings::default()).is_err());
    }

    #[test]
    fn test_invalid_target_is_rejected() {
        let parsed = Args::parse_from(["hostaudit", "bad host!"]);
        assert!(matches!(
            parsed.plan(&AuditSettings::default()),
            Err(InputError::Target(_))
        ));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        assert!(matches!(
            args(&["-c", "0"]).plan(&AuditSettings::default()),
            Err(InputError::InvalidOption(_))
        ));
    }
}
