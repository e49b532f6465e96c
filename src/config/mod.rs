//! Configuration management for hostaudit.
//!
//! Settings live in a JSON file under the XDG config directory. Command-line
//! flags override whatever the file says.

mod settings;

pub use settings::{AuditSettings, OutputFormat, Paths};
