//! Per-domain request pacing
//!
//! Remembers when each domain last received a successful request and
//! computes how long the next request must wait. A fresh delay is sampled
//! for every request.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct DomainPacer {
    last_success: HashMap<String, Instant>,
}

impl DomainPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining wait before `domain` may be hit again, if any
    pub fn delay_for<R: Rng + ?Sized>(
        &self,
        domain: &str,
        now: Instant,
        range: (f64, f64),
        rng: &mut R,
    ) -> Option<Duration> {
        let last = self.last_success.get(domain)?;
        let gap = sample_seconds(rng, range);
        let ready_at = *last + gap;
        if ready_at > now {
            Some(ready_at - now)
        } else {
            None
        }
    }

    pub fn mark(&mut self, domain: &str, now: Instant) {
        self.last_success.insert(domain.to_string(), now);
    }

    pub fn last_success(&self, domain: &str) -> Option<Instant> {
        self.last_success.get(domain).copied()
    }

    pub fn forget(&mut self, domain: &str) {
        self.last_success.remove(domain);
    }
}

/// Uniform duration in `[min, max]` seconds
pub fn sample_seconds<R: Rng + ?Sized>(rng: &mut R, (min, max): (f64, f64)) -> Duration {
    let min = min.max(0.0);
    let max = max.max(min);
    if max <= min {
        return Duration::from_secs_f64(min);
    }
    Duration::from_secs_f64(rng.gen_range(min..=max))
}
