//! Aggregate download rate limiting
//!
//! A single token bucket shared by every segment worker. Workers call
//! [`RateLimiter::acquire`] before writing each received chunk, so the
//! combined transfer rate stays at or below the configured limit no
//! matter how many segments are in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Token bucket rate limiter shared across all segment workers.
///
/// Tokens are bytes. They refill continuously at the configured rate and
/// the bucket caps at one second's worth, so a long idle period cannot
/// bank an unbounded burst. Lock-free: all state lives in atomics, and
/// `Clone` hands out another handle to the same bucket.
#[derive(Clone)]
pub struct RateLimiter {
    /// Limit in bytes per second; 0 means unlimited
    limit_bps: Arc<AtomicU64>,
    /// Bytes currently available for transfer
    tokens: Arc<AtomicU64>,
    /// Monotonic timestamp of the last refill, in nanoseconds
    last_refill: Arc<AtomicU64>,
}

impl RateLimiter {
    /// Create a limiter; `None` disables throttling entirely.
    #[must_use]
    pub fn new(limit_bps: Option<u64>) -> Self {
        let limit = limit_bps.unwrap_or(0);
        Self {
            limit_bps: Arc::new(AtomicU64::new(limit)),
            tokens: Arc::new(AtomicU64::new(limit)),
            last_refill: Arc::new(AtomicU64::new(Self::now_nanos())),
        }
    }

    /// Change the limit. Takes effect immediately, including for acquirers
    /// that are already waiting. Raising the limit tops up the bucket by
    /// the difference; lowering it lets existing tokens drain naturally.
    pub fn set_limit(&self, limit_bps: Option<u64>) {
        let new_limit = limit_bps.unwrap_or(0);
        let old_limit = self.limit_bps.swap(new_limit, Ordering::SeqCst);
        if new_limit > old_limit {
            self.tokens.fetch_add(new_limit - old_limit, Ordering::SeqCst);
        }
    }

    /// Current limit in bytes per second, or `None` when unlimited
    pub fn get_limit(&self) -> Option<u64> {
        match self.limit_bps.load(Ordering::Relaxed) {
            0 => None,
            limit => Some(limit),
        }
    }

    /// Wait until `bytes` may be transferred, then consume that many tokens.
    ///
    /// Returns immediately when unlimited or when `bytes` is zero. Partial
    /// consumption is allowed, so a large request drains whatever is
    /// available and sleeps only for the remainder.
    pub async fn acquire(&self, bytes: u64) {
        if bytes == 0 || self.limit_bps.load(Ordering::Relaxed) == 0 {
            return;
        }

        let mut remaining = bytes;
        loop {
            // Re-read each iteration so set_limit() reaches waiting acquirers
            let limit = self.limit_bps.load(Ordering::Relaxed);
            if limit == 0 {
                return;
            }

            self.refill();

            let available = self.tokens.load(Ordering::SeqCst);
            let take = remaining.min(available);
            if take > 0 {
                if self
                    .tokens
                    .compare_exchange(
                        available,
                        available - take,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
                {
                    remaining -= take;
                    if remaining == 0 {
                        return;
                    }
                }
                // Lost the race or still short; try again right away
                continue;
            }

            // Bucket empty. Sleep roughly until enough has refilled, capped
            // short so limit changes are noticed promptly.
            let wait_ms = (remaining as f64 / limit as f64 * 1000.0) as u64;
            tokio::time::sleep(Duration::from_millis(wait_ms.clamp(10, 100))).await;
        }
    }

    /// Credit tokens for the time elapsed since the last refill, capping
    /// the bucket at one second's worth.
    fn refill(&self) {
        let limit = self.limit_bps.load(Ordering::Relaxed);
        if limit == 0 {
            return;
        }

        let now = Self::now_nanos();
        let last = self.last_refill.load(Ordering::SeqCst);
        let elapsed_secs = now.saturating_sub(last) as f64 / 1_000_000_000.0;
        let earned = (limit as f64 * elapsed_secs) as u64;
        if earned == 0 {
            return;
        }

        // Only the thread that wins the timestamp race credits the bucket
        if self
            .last_refill
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let current = self.tokens.load(Ordering::SeqCst);
            self.tokens.store((current + earned).min(limit), Ordering::SeqCst);
        }
    }

    /// Monotonic nanoseconds since an arbitrary process-local epoch
    fn now_nanos() -> u64 {
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        START.get_or_init(Instant::now).elapsed().as_nanos() as u64
    }
}
