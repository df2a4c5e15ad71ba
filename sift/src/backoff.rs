//! Exponential backoff between retry attempts

use rand::Rng;
use std::time::Duration;

/// Jitter applied to the first wait, in milliseconds (+/-)
const JITTER_MS: i64 = 10;

/// Doubling wait sequence with a ceiling
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    retry: u32,
}

impl Backoff {
    /// Start at `initial` +/- 10ms, doubling up to `max`
    pub fn new(initial: Duration, max: Duration) -> Self {
        let jitter = rand::thread_rng().gen_range(-JITTER_MS..=JITTER_MS);
        let initial_ms = i64::try_from(initial.as_millis()).unwrap_or(i64::MAX);
        let initial_ms = u64::try_from(initial_ms.saturating_add(jitter)).unwrap_or(0);
        Self::without_jitter(Duration::from_millis(initial_ms), max)
    }

    pub fn without_jitter(initial: Duration, max: Duration) -> Self {
        Self {
            initial: initial.min(max),
            max,
            retry: 0,
        }
    }

    /// Wait before retry number `retry`, counting from 1
    pub fn nth_wait(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Wait to apply now; the following wait doubles
    pub fn next_wait(&mut self) -> Duration {
        self.retry = self.retry.saturating_add(1);
        self.nth_wait(self.retry)
    }
}
