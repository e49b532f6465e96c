//! Rate limiting for network scans.
//!
//! Provides token bucket rate limiting on top of the admission gate, for
//! callers that want to cap connection attempts per second as well as the
//! number in flight.

use governor::{Quota, RateLimiter as GovLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectLimiter = GovLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A rate limiter for controlling scan speed.
///
/// Uses a token bucket algorithm to enforce a maximum attempts-per-second limit.
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<DirectLimiter>,
}

impl RateLimiter {
    /// Create a new rate limiter with the specified attempts-per-second limit.
    ///
    /// Returns `None` for a rate of 0, which callers treat as unlimited.
    pub fn new(rate: u32) -> Option<Self> {
        let rate = NonZeroU32::new(rate)?;
        let limiter = GovLimiter::direct(Quota::per_second(rate));

        Some(Self {
            limiter: Arc::new(limiter),
        })
    }

    /// Wait until a token is available.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Try to acquire a token without waiting.
    ///
    /// Returns `true` if a token was available, `false` otherwise.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_is_unlimited() {
        assert!(RateLimiter::new(0).is_none());
    }

    #[tokio::test]
    async fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new(100).unwrap();
        assert!(limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_rate_limiter_wait() {
        let limiter = RateLimiter::new(1000).unwrap();
        limiter.wait().await;
    }

    #[test]
    fn test_clones_share_state() {
        let limiter1 = RateLimiter::new(1).unwrap();
        let limiter2 = limiter1.clone();

        assert!(limiter1.try_acquire());
        assert!(!limiter2.try_acquire());
    }
}
