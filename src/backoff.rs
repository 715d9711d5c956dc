use std::time::Duration;

use rand::Rng;

/// A restartable exponential-backoff generator with jitter.
///
/// Each retry or reconnect loop instantiates a fresh `Backoff` so a prior
/// burst of failures does not bias a later, unrelated one (spec.md section
/// 9, "Backoff generators as restartable lazy sequences" — generalized here
/// from the teacher's fixed-attempt-counter `exponential_backoff` helper
/// into a reusable generator struct, since spec.md models four distinct
/// backoff policies sharing the same shape).
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base: Duration,
    pub cap: Duration,
    pub growth: f64,
}

impl BackoffConfig {
    pub const fn new(base_ms: u64, cap_ms: u64, growth: f64) -> Self {
        Self {
            base: Duration::from_millis(base_ms),
            cap: Duration::from_millis(cap_ms),
            growth,
        }
    }

    pub fn generator(&self) -> Backoff {
        Backoff {
            config: *self,
            attempt: 0,
        }
    }
}

/// Defaults from spec.md section 6.
pub const RETRY_DELAY_LOW: BackoffConfig = BackoffConfig::new(500, 500 * 30, 3.0);
pub const RETRY_DELAY_HIGH: BackoffConfig = BackoffConfig::new(15_000, 15_000 * 4, 2.0);
pub const RECONNECT_DELAY: BackoffConfig = BackoffConfig::new(500, 500 * 64, 2.0);

/// An infinite iterator-like generator of delays. The loop's own budget
/// (attempts, deadline) is what terminates consumption, not the generator.
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    /// Produce the next delay and advance internal state. Never panics,
    /// never terminates: callers bound how many times they call this.
    pub fn next(&mut self) -> Duration {
        let mean_ms = (self.config.base.as_millis() as f64) * self.config.growth.powi(self.attempt as i32);
        let mean_ms = mean_ms.min(self.config.cap.as_millis() as f64);
        self.attempt = self.attempt.saturating_add(1);

        // uniform +/-25% jitter around the mean, per spec.md section 6.
        let jitter = rand::thread_rng().gen_range(-0.25..=0.25);
        let jittered = (mean_ms * (1.0 + jitter)).max(0.0);
        Duration::from_millis(jittered.round() as u64)
    }
}

/// `pages -> ms` anti-split delay budget. Default: `pages * 75 + 2500`
/// (spec.md section 6).
pub fn default_page_split_delay(pages: u32) -> Duration {
    Duration::from_millis(u64::from(pages) * 75 + 2500)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_starts_fresh_each_time() {
        let cfg = BackoffConfig::new(100, 10_000, 2.0);
        let mut gen_a = cfg.generator();
        let mut gen_b = cfg.generator();
        // first delay of a fresh generator should be in the same jittered
        // band for both instances (mean = base, not biased by a prior run).
        let a = gen_a.next();
        let b = gen_b.next();
        for d in [a, b] {
            assert!(d.as_millis() >= 75 && d.as_millis() <= 125, "{d:?}");
        }
    }

    #[test]
    fn delay_grows_and_is_capped() {
        let cfg = BackoffConfig::new(100, 1_000, 10.0);
        let mut gen = cfg.generator();
        let _ = gen.next(); // attempt 0: mean 100
        let _ = gen.next(); // attempt 1: mean 1000 (already at cap)
        let d = gen.next(); // attempt 2: mean would be 10000, capped at 1000
        assert!(d.as_millis() <= 1_000 + 1, "{d:?}");
    }

    #[test]
    fn page_split_delay_matches_default_formula() {
        assert_eq!(default_page_split_delay(10), Duration::from_millis(3250));
        assert_eq!(default_page_split_delay(1), Duration::from_millis(2575));
    }
}
