//! Audit settings and paths.
//!
//! Manages XDG-compliant paths for configuration.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Global paths singleton. `None` when no home directory could be found.
static PATHS: OnceLock<Option<Paths>> = OnceLock::new();

/// Application directory paths following XDG Base Directory Specification.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Configuration directory (~/.config/hostaudit)
    pub config_dir: PathBuf,
}

impl Paths {
    /// Get the global paths instance.
    pub fn get() -> ConfigResult<&'static Paths> {
        PATHS
            .get_or_init(Self::discover)
            .as_ref()
            .ok_or(ConfigError::DirectoryNotFound)
    }

    fn discover() -> Option<Self> {
        let project = ProjectDirs::from("com", "hostaudit", "hostaudit")?;
        Some(Self {
            config_dir: project.config_dir().to_path_buf(),
        })
    }

    /// Get the path to the settings file.
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }
}

/// Report format written by the binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" | "text" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidFormat(format!(
                "unknown output format '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Audit-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    /// Per-port connect timeout in milliseconds.
    pub timeout_ms: u64,
    /// Admission gate capacity for the port scan.
    pub max_workers: usize,
    /// Ports to scan; empty means the common port list.
    pub ports: Vec<u16>,
    /// Connection attempts per second, 0 for unlimited.
    pub rate_limit: u32,
    pub skip_exploits: bool,
    pub skip_recon: bool,
    pub output_format: OutputFormat,
    /// Write the report here instead of stdout.
    pub output_path: Option<PathBuf>,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            max_workers: 100,
            ports: Vec::new(),
            rate_limit: 0,
            skip_exploits: false,
            skip_recon: false,
            output_format: OutputFormat::Plain,
            output_path: None,
        }
    }
}

impl AuditSettings {
    /// Load settings from the default location. A missing file yields defaults.
    pub fn load() -> ConfigResult<Self> {
        let file = Paths::get()?.settings_file();
        if !file.exists() {
            debug!(path = %file.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&file)
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))
    }

    /// Load from `explicit` or the default location, falling back to
    /// defaults with a warning when the file cannot be used.
    pub fn load_or_default(explicit: Option<&Path>) -> Self {
        let loaded = match explicit {
            Some(path) => Self::load_from(path),
            None => Self::load(),
        };
        loaded.unwrap_or_else(|e| {
            warn!(error = %e, "could not load settings, using defaults");
            Self::default()
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = AuditSettings::default();
        assert_eq!(settings.max_workers, 100);
        assert_eq!(settings.timeout(), Duration::from_secs(2));
        assert!(settings.ports.is_empty());
        assert_eq!(settings.output_format, OutputFormat::Plain);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"timeout_ms": 500, "output_format": "json"}"#).unwrap();

        let settings = AuditSettings::load_from(&path).unwrap();
        assert_eq!(settings.timeout_ms, 500);
        assert_eq!(settings.output_format, OutputFormat::Json);
        assert_eq!(settings.max_workers, 100);
    }

    #[test]
    fn test_broken_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            AuditSettings::load_from(&path),
            Err(ConfigError::InvalidFormat(_))
        ));
        assert_eq!(AuditSettings::load_or_default(Some(&path)), AuditSettings::default());
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Plain);
        assert!("csv".parse::<OutputFormat>().is_err());
    }
}
