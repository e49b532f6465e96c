//! Scanner trait abstraction.
//!
//! Defines the per-port probe interface used by the bounded-concurrency
//! executor, so that a real TCP connect scanner and instrumented test
//! scanners can be used interchangeably.

use crate::types::Port;
use async_trait::async_trait;
use std::time::Duration;

/// Trait for port scanner implementations.
///
/// A scanner classifies one port as open (`true`) or closed/filtered
/// (`false`). The two negative outcomes are deliberately not distinguished.
///
/// # Example
///
/// ```ignore
/// use hostaudit::scanner::Scanner;
///
/// async fn is_open<S: Scanner>(scanner: &S, port: Port) -> bool {
///     scanner.probe(port).await
/// }
/// ```
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Attempt one port. Must not retry.
    async fn probe(&self, port: Port) -> bool;

    /// The host being scanned.
    fn target(&self) -> &str;

    /// The configured per-port timeout.
    fn timeout(&self) -> Duration;
}
