//! Local host introspection.
//!
//! These checks read the filesystem and process table of the machine the
//! auditor runs on, never the remote target. They are only run through
//! [`run_local_checks`] and attached to a report explicitly.
//!
//! Walk errors at any single path are skipped.

use super::Finding;
use crate::types::Severity;
use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Directories searched for SUID/SGID and world-writable entries.
pub const SCAN_DIRS: [&str; 5] = ["/bin", "/sbin", "/usr/bin", "/usr/sbin", "/usr/local/bin"];

/// Binaries that give a shell or arbitrary file access when SUID.
pub const RISKY_BINARIES: [&str; 20] = [
    "nmap", "vim", "find", "bash", "sh", "more", "less", "nano", "cp", "mv", "awk", "man", "wget",
    "curl", "tar", "zip", "unzip", "python", "perl", "ruby",
];

/// World-writable entries under these prefixes are critical.
pub const SENSITIVE_PREFIXES: [&str; 6] = ["/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot"];

/// Expected permission bits of well-known sensitive files.
pub const EXPECTED_MODES: [(&str, u32); 6] = [
    ("/etc/passwd", 0o644),
    ("/etc/shadow", 0o640),
    ("/etc/group", 0o644),
    ("/etc/gshadow", 0o640),
    ("/etc/sudoers", 0o440),
    ("/etc/ssh/sshd_config", 0o644),
];

/// Legacy cleartext daemons.
pub const RISKY_PROCESSES: [&str; 7] = ["telnetd", "rsh", "rlogin", "ftp", "tftp", "finger", "rexec"];

const SUID_COUNT_THRESHOLD: usize = 10;
const WRITABLE_COUNT_THRESHOLD: usize = 5;

const S_ISUID: u32 = 0o4000;
const S_ISGID: u32 = 0o2000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemProbeResult {
    pub check_type: String,
    pub findings: Vec<String>,
    pub severity: Severity,
}

impl SystemProbeResult {
    fn new(check_type: &str) -> Self {
        Self {
            check_type: check_type.to_string(),
            findings: Vec::new(),
            severity: Severity::Low,
        }
    }
}

impl Finding for SystemProbeResult {
    fn service(&self) -> &str {
        &self.check_type
    }

    fn has_finding(&self) -> bool {
        !self.findings.is_empty()
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn warnings(&self) -> &[String] {
        &self.findings
    }
}

/// Depth-first walk calling `visit` for every entry that can be stat'ed.
/// Symlinks are not followed.
fn walk(root: &Path, visit: &mut dyn FnMut(&Path, &fs::Metadata)) {
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                trace!(path = %path.display(), error = %e, "skipping");
                continue;
            }
        };
        visit(&path, &meta);

        if meta.is_dir() {
            match fs::read_dir(&path) {
                Ok(entries) => stack.extend(entries.filter_map(|e| e.ok()).map(|e| e.path())),
                Err(e) => trace!(path = %path.display(), error = %e, "cannot list"),
            }
        }
    }
}

/// `python3.11` matches `python`; `shred` does not match `sh`.
fn is_risky_binary(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    RISKY_BINARIES.iter().any(|risky| {
        name.strip_prefix(risky)
            .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit() || c == '.'))
    })
}

/// SUID/SGID regular files under `roots`.
pub fn check_suid_binaries(roots: &[PathBuf]) -> SystemProbeResult {
    let mut result = SystemProbeResult::new("SUID/SGID Binaries");
    let mut risky = false;

    for root in roots {
        walk(root, &mut |path, meta| {
            if !meta.is_file() {
                return;
            }
            let mode = meta.permissions().mode();
            if mode & S_ISUID != 0 {
                result.findings.push(format!("SUID binary: {}", path.display()));
                if is_risky_binary(path) {
                    result
                        .findings
                        .push(format!("RISKY SUID binary detected: {}", path.display()));
                    risky = true;
                }
            }
            if mode & S_ISGID != 0 {
                result.findings.push(format!("SGID binary: {}", path.display()));
            }
        });
    }

    if risky {
        result.severity.raise(Severity::High);
    }
    if result.findings.len() > SUID_COUNT_THRESHOLD {
        result.severity.raise(Severity::Medium);
    }
    result
}

fn is_sensitive(path: &Path) -> bool {
    SENSITIVE_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// World-writable entries under `roots`. Symlinks are skipped since their
/// own mode bits are meaningless.
pub fn check_world_writable(roots: &[PathBuf]) -> SystemProbeResult {
    let mut result = SystemProbeResult::new("World-Writable Files");

    for root in roots {
        walk(root, &mut |path, meta| {
            if meta.file_type().is_symlink() || meta.permissions().mode() & 0o002 == 0 {
                return;
            }
            result.findings.push(format!("World-writable: {}", path.display()));
            if is_sensitive(path) {
                result.findings.push(format!(
                    "CRITICAL: World-writable file in system directory: {}",
                    path.display()
                ));
                result.severity.raise(Severity::Critical);
            }
        });
    }

    if result.findings.len() > WRITABLE_COUNT_THRESHOLD {
        result.severity.raise(Severity::Medium);
    }
    result
}

/// Compare one file's mode with the expected one.
fn assess_mode(path: &str, actual: u32, expected: u32) -> Option<(String, Severity)> {
    if actual == expected {
        return None;
    }
    let message = format!(
        "Incorrect permissions on {}: {:o} (expected {:o})",
        path, actual, expected
    );
    let shadow = path.ends_with("shadow");
    let severity = if shadow && actual & 0o022 != 0 {
        Severity::Critical
    } else if actual & !expected != 0 {
        Severity::High
    } else {
        Severity::Low
    };
    Some((message, severity))
}

/// Check modes of files in `table`; missing files are skipped.
pub fn check_file_permissions(table: &[(&str, u32)]) -> SystemProbeResult {
    let mut result = SystemProbeResult::new("Critical File Permissions");

    for &(path, expected) in table {
        let actual = match fs::metadata(path) {
            Ok(meta) => meta.permissions().mode() & 0o777,
            Err(e) => {
                trace!(path, error = %e, "cannot stat");
                continue;
            }
        };
        if let Some((message, severity)) = assess_mode(path, actual, expected) {
            result.findings.push(message);
            result.severity.raise(severity);
        }
    }
    result
}

/// Scan a procfs-style directory for legacy daemons by process name.
pub fn check_processes(proc_dir: &Path) -> SystemProbeResult {
    let mut result = SystemProbeResult::new("Process Analysis");

    let entries = match fs::read_dir(proc_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(error = %e, "cannot read process table");
            result
                .findings
                .push(format!("Cannot access {} (not Linux?)", proc_dir.display()));
            return result;
        }
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let pid = entry.file_name().to_string_lossy().into_owned();
        if !pid.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let Ok(comm) = fs::read_to_string(entry.path().join("comm")) else {
            continue;
        };
        let comm = comm.trim();
        if let Some(risky) = RISKY_PROCESSES.iter().find(|r| comm == **r) {
            result
                .findings
                .push(format!("Risky process detected: {} (PID: {})", risky, pid));
            result.severity.raise(Severity::Medium);
        }
    }
    result
}

/// Effective-root and core dump pattern checks.
pub fn check_configuration(core_pattern: &Path) -> SystemProbeResult {
    let mut result = SystemProbeResult::new("System Configuration");

    // SAFETY: geteuid has no preconditions and cannot fail.
    if unsafe { libc::geteuid() } == 0 {
        result.findings.push("Running with root privileges".to_string());
        result.severity.raise(Severity::Medium);
    }

    if let Ok(pattern) = fs::read_to_string(core_pattern) {
        let pattern = pattern.trim();
        if !pattern.is_empty() && pattern != "core" {
            result
                .findings
                .push(format!("Core dumps may be enabled: {}", pattern));
        }
    }
    result
}

/// Run every local check against this machine.
pub fn run_local_checks() -> Vec<SystemProbeResult> {
    let roots: Vec<PathBuf> = SCAN_DIRS
        .iter()
        .map(PathBuf::from)
        .filter(|dir| dir.exists())
        .collect();

    let mut results = Vec::new();
    if !roots.is_empty() {
        results.push(check_suid_binaries(&roots));
        results.push(check_world_writable(&roots));
    }
    results.push(check_file_permissions(&EXPECTED_MODES));
    results.push(check_processes(Path::new("/proc")));
    results.push(check_configuration(Path::new("/proc/sys/kernel/core_pattern")));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::Permissions;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"").unwrap();
        fs::set_permissions(&path, Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn test_risky_binary_names() {
        assert!(is_risky_binary(Path::new("/usr/bin/python3.11")));
        assert!(is_risky_binary(Path::new("/bin/bash")));
        assert!(!is_risky_binary(Path::new("/usr/bin/shred")));
        assert!(!is_risky_binary(Path::new("/usr/bin/passwd")));
    }

    #[test]
    fn test_suid_detection() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "helper", 0o4755);
        touch(dir.path(), "plain", 0o755);

        let result = check_suid_binaries(&[dir.path().to_path_buf()]);
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.severity, Severity::Low);

        touch(dir.path(), "find", 0o4755);
        let result = check_suid_binaries(&[dir.path().to_path_buf()]);
        assert!(result.findings.iter().any(|f| f.starts_with("RISKY")));
        assert_eq!(result.severity, Severity::High);
    }

    #[test]
    fn test_world_writable_outside_system_dirs() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        touch(&nested, "open", 0o666);
        touch(&nested, "closed", 0o644);

        let result = check_world_writable(&[dir.path().to_path_buf()]);
        assert_eq!(result.findings.len(), 1);
        assert!(result.findings[0].ends_with("open"));
        assert_eq!(result.severity, Severity::Low);
    }

    #[test]
    fn test_missing_root_is_swallowed() {
        let result = check_world_writable(&[PathBuf::from("/nonexistent/hostaudit")]);
        assert!(result.findings.is_empty());
    }

    #[test]
    fn test_sensitive_prefix() {
        assert!(is_sensitive(Path::new("/etc/cron.d/job")));
        assert!(!is_sensitive(Path::new("/etcetera/file")));
    }

    #[test]
    fn test_assess_mode() {
        assert_eq!(assess_mode("/etc/passwd", 0o644, 0o644), None);
        assert_eq!(assess_mode("/etc/shadow", 0o666, 0o640).unwrap().1, Severity::Critical);
        assert_eq!(assess_mode("/etc/passwd", 0o666, 0o644).unwrap().1, Severity::High);
        assert_eq!(assess_mode("/etc/sudoers", 0o400, 0o440).unwrap().1, Severity::Low);
    }

    #[test]
    fn test_file_permission_table() {
        let dir = TempDir::new().unwrap();
        let loose = touch(dir.path(), "passwd", 0o666);
        let fine = touch(dir.path(), "group", 0o644);
        let loose = loose.to_str().unwrap().to_string();
        let fine = fine.to_str().unwrap().to_string();

        let table = [(loose.as_str(), 0o644), (fine.as_str(), 0o644), ("/nonexistent", 0o600)];
        let result = check_file_permissions(&table);
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.severity, Severity::High);
    }

    #[test]
    fn test_process_scan() {
        let dir = TempDir::new().unwrap();
        for (pid, comm) in [("1", "systemd\n"), ("42", "telnetd\n"), ("43", "sftp-server\n")] {
            let proc = dir.path().join(pid);
            fs::create_dir(&proc).unwrap();
            fs::write(proc.join("comm"), comm).unwrap();
        }
        fs::create_dir(dir.path().join("self")).unwrap();

        let result = check_processes(dir.path());
        assert_eq!(result.findings, vec!["Risky process detected: telnetd (PID: 42)"]);
        assert_eq!(result.severity, Severity::Medium);
    }

    #[test]
    fn test_core_pattern() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("core_pattern");
        fs::write(&path, "|/usr/share/apport/apport %p\n").unwrap();
        let result = check_configuration(&path);
        assert!(result.findings.iter().any(|f| f.starts_with("Core dumps may be enabled")));

        fs::write(&path, "core\n").unwrap();
        let result = check_configuration(&path);
        assert!(!result.findings.iter().any(|f| f.starts_with("Core dumps")));
    }
}
