use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// Admission cap on job starts: a burst of `max_starts`, refilled at one
/// start every `window / max_starts`. Callers over the cap wait; nothing is
/// dropped.
pub struct AdmissionLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl AdmissionLimiter {
    pub fn new(max_starts: usize, window: Duration) -> Self {
        let burst = NonZeroU32::new(u32::try_from(max_starts).unwrap_or(u32::MAX))
            .unwrap_or(NonZeroU32::MIN);
        let period = (window / burst.get()).max(Duration::from_nanos(1));
        let quota = match Quota::with_period(period) {
            Some(quota) => quota.allow_burst(burst),
            None => Quota::per_second(burst),
        };
        debug!(
            burst = burst.get(),
            period_ms = period.as_millis() as u64,
            "Admission limiter configured"
        );

        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Wait until one more start is admitted, consuming it
    pub async fn until_ready(&self) {
        self.limiter.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn admits_burst_without_waiting() {
        let limiter = AdmissionLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.until_ready().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn over_cap_waits_for_refill() {
        // Two starts per 400ms: one cell back every 200ms
        let limiter = AdmissionLimiter::new(2, Duration::from_millis(400));
        let start = Instant::now();

        limiter.until_ready().await;
        limiter.until_ready().await;
        assert!(start.elapsed() < Duration::from_millis(50));

        limiter.until_ready().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(150), "waited {waited:?}");
        assert!(waited < Duration::from_secs(2));
    }
}
