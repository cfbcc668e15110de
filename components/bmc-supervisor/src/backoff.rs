use std::time::{Duration, Instant};

use rand::Rng;

/// Exponential back-off with full jitter, bounded to `[100ms, 30s]`
/// (spec.md §4.2).
pub const MIN_BACKOFF: Duration = Duration::from_millis(100);
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub fn backoff_for_attempt(attempt: u32) -> Duration {
    let exp = attempt.min(16); // guard against overflow in the shift below
    let base_ms = (MIN_BACKOFF.as_millis() as u64).saturating_mul(1u64 << exp);
    let capped_ms = base_ms.min(MAX_BACKOFF.as_millis() as u64);
    let jittered_ms = rand::thread_rng().gen_range(0..=capped_ms.max(1));
    Duration::from_millis(jittered_ms.max(MIN_BACKOFF.as_millis() as u64))
}

/// Tracks restarts in a sliding window, used to decide whether a child has
/// exceeded its escalation bound (default N=5 within 10s, spec.md §4.2).
pub struct RestartWindow {
    window: Duration,
    max_restarts: u32,
    restarts: Vec<Instant>,
}

impl RestartWindow {
    pub fn new(max_restarts: u32, window: Duration) -> Self {
        RestartWindow {
            window,
            max_restarts,
            restarts: Vec::new(),
        }
    }

    /// Record a restart attempt now; returns `true` if this restart pushes
    /// the child over the bound and the tree should escalate.
    pub fn record_and_check_exceeded(&mut self) -> bool {
        let now = Instant::now();
        self.restarts.retain(|t| now.duration_since(*t) <= self.window);
        self.restarts.push(now);
        self.restarts.len() as u32 > self.max_restarts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_bounded() {
        for attempt in 0..40 {
            let d = backoff_for_attempt(attempt);
            assert!(d >= MIN_BACKOFF);
            assert!(d <= MAX_BACKOFF);
        }
    }

    #[test]
    fn escalates_after_bound_exceeded() {
        let mut window = RestartWindow::new(5, Duration::from_secs(10));
        for _ in 0..5 {
            assert!(!window.record_and_check_exceeded());
        }
        assert!(window.record_and_check_exceeded());
    }
}
