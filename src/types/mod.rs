//! Value types shared by the scanner, the probes and the audit: ports and
//! port sets, the audit target, and finding severity.

mod port;
mod severity;
mod target;

pub use port::{Port, PortError, PortRange, PortSpec, COMMON_PORTS};
pub use severity::Severity;
pub use target::{ScanTarget, TargetError, TargetSpec, DEFAULT_CONNECT_TIMEOUT};
