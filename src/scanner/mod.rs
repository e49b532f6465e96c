//! Scanner module - bounded-concurrency TCP connect scanning.
//!
//! One task is spawned per candidate port. Every task must pass an admission
//! gate (a counting semaphore) before it may open a connection, so the number
//! of simultaneous attempts never exceeds the gate capacity no matter how many
//! ports are requested. Results are written into a shared map under a lock and
//! the caller is blocked until every port has been classified.

pub mod rate_limiter;
pub mod tcp;
pub mod traits;

pub use rate_limiter::RateLimiter;
pub use tcp::TcpConnectScanner;
pub use traits::Scanner;

use crate::types::{Port, ScanTarget};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default capacity of the admission gate.
pub const DEFAULT_CONCURRENCY: usize = 100;

/// Outcome of a port scan.
///
/// `results` has exactly one entry per requested port; `open_ports` is the
/// ascending list of ports marked `true` in `results`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortScanResult {
    pub host: String,
    pub results: BTreeMap<u16, bool>,
    pub open_ports: Vec<u16>,
    pub duration_ms: u64,
}

impl PortScanResult {
    fn from_map(host: String, results: BTreeMap<u16, bool>, duration_ms: u64) -> Self {
        let open_ports = results
            .iter()
            .filter_map(|(&port, &open)| open.then_some(port))
            .collect();
        Self {
            host,
            results,
            open_ports,
            duration_ms,
        }
    }

    /// Whether `port` was scanned and found open.
    pub fn is_open(&self, port: u16) -> bool {
        self.results.get(&port).copied().unwrap_or(false)
    }

    pub fn ports_scanned(&self) -> usize {
        self.results.len()
    }
}

/// Knobs for one scan run.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Admission gate capacity.
    pub concurrency: usize,
    /// Optional attempts-per-second cap.
    pub rate_limit: Option<RateLimiter>,
    /// Show a progress bar.
    pub progress: bool,
    /// Optional cancellation. `None` means every port runs to completion.
    pub cancel: Option<CancellationToken>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            rate_limit: None,
            progress: false,
            cancel: None,
        }
    }
}

impl ScanOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_rate_limit(mut self, rate: u32) -> Self {
        self.rate_limit = RateLimiter::new(rate);
        self
    }

    pub fn with_progress(mut self) -> Self {
        self.progress = true;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Connect-scan every port of `target`.
pub async fn run_scan(target: &ScanTarget, options: &ScanOptions) -> PortScanResult {
    let scanner = Arc::new(TcpConnectScanner::new(target.host(), target.timeout()));
    scan_ports(scanner, target.ports(), options).await
}

/// Generic scan executor with bounded concurrency.
pub async fn scan_ports<S>(scanner: Arc<S>, ports: &[Port], options: &ScanOptions) -> PortScanResult
where
    S: Scanner + 'static,
{
    let start_time = Instant::now();
    let host = scanner.target().to_string();
    info!(%host, ports = ports.len(), concurrency = options.concurrency, "starting port scan");

    let progress = options.progress.then(|| {
        let pb = ProgressBar::new(ports.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        ) {
            pb.set_style(style.progress_chars("=>-"));
        }
        pb
    });

    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let results: Arc<Mutex<BTreeMap<u16, bool>>> = Arc::new(Mutex::new(BTreeMap::new()));
    let mut set = JoinSet::new();

    for &port in ports {
        let sem = Arc::clone(&semaphore);
        let scanner = Arc::clone(&scanner);
        let results = Arc::clone(&results);
        let limiter = options.rate_limit.clone();
        let cancel = options.cancel.clone();
        let progress = progress.clone();

        set.spawn(async move {
            // The permit is held until the attempt is classified.
            let Ok(_permit) = sem.acquire_owned().await else {
                return;
            };

            let cancelled = cancel.as_ref().is_some_and(|c| c.is_cancelled());
            let open = if cancelled {
                false
            } else {
                if let Some(limiter) = &limiter {
                    limiter.wait().await;
                }
                scanner.probe(port).await
            };

            results.lock().await.insert(port.as_u16(), open);

            if let Some(pb) = &progress {
                pb.inc(1);
                if open {
                    pb.set_message(format!("Found open port: {}", port));
                }
            }
        });
    }

    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "scan task failed");
        }
    }

    if let Some(pb) = progress {
        pb.finish_with_message("Scan complete");
    }

    let mut map = std::mem::take(&mut *results.lock().await);
    // A task that never recorded its port is reported closed.
    for port in ports {
        map.entry(port.as_u16()).or_insert(false);
    }

    let result = PortScanResult::from_map(host, map, start_time.elapsed().as_millis() as u64);
    debug!(open = ?result.open_ports, "port scan complete");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scanner that records how many probes are in flight at once.
    struct CountingScanner {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl CountingScanner {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Scanner for CountingScanner {
        async fn probe(&self, port: Port) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            port.as_u16() % 3 == 0
        }

        fn target(&self) -> &str {
            "fake"
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(5)
        }
    }

    fn ports(range: std::ops::RangeInclusive<u16>) -> Vec<Port> {
        range.filter_map(Port::new).collect()
    }

    #[tokio::test]
    async fn test_every_port_reported_once() {
        let scanner = Arc::new(CountingScanner::new());
        let requested = ports(1..=300);
        let result = scan_ports(scanner.clone(), &requested, &ScanOptions::default()).await;

        assert_eq!(result.results.len(), 300);
        assert_eq!(scanner.calls.load(Ordering::SeqCst), 300);
        let expected: Vec<u16> = (1..=300).filter(|p| p % 3 == 0).collect();
        assert_eq!(result.open_ports, expected);
        for (port, open) in &result.results {
            assert_eq!(*open, result.open_ports.contains(port));
        }
    }

    #[tokio::test]
    async fn test_admission_gate_caps_in_flight() {
        let scanner = Arc::new(CountingScanner::new());
        let requested = ports(1..=200);
        let options = ScanOptions::default().with_concurrency(7);
        let result = scan_ports(scanner.clone(), &requested, &options).await;

        assert_eq!(result.results.len(), 200);
        let peak = scanner.peak.load(Ordering::SeqCst);
        assert!(peak <= 7, "peak in-flight was {}", peak);
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn test_cancelled_scan_still_reports_all_ports() {
        let scanner = Arc::new(CountingScanner::new());
        let token = CancellationToken::new();
        token.cancel();
        let requested = ports(1..=50);
        let options = ScanOptions::default().with_cancel(token);
        let result = scan_ports(scanner.clone(), &requested, &options).await;

        assert_eq!(result.results.len(), 50);
        assert!(result.open_ports.is_empty());
        assert_eq!(scanner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_scan_against_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = {
            let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };

        let target = ScanTarget::new(
            "127.0.0.1",
            [open, closed].into_iter().filter_map(Port::new),
            Duration::from_millis(500),
        )
        .unwrap();
        let result = run_scan(&target, &ScanOptions::default()).await;

        assert_eq!(result.ports_scanned(), 2);
        assert!(result.is_open(open));
        assert!(!result.is_open(closed));
        assert_eq!(result.open_ports, vec![open]);
    }
}
