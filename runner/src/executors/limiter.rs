use parking_lot::Mutex;
use std::{
    thread,
    time::{Duration, Instant},
};

/// Spaces out callers so that at most `rate` permits are handed out per second
///
/// Permits are reserved under the lock and slept for outside of it, concurrent callers
/// queue up behind each other instead of bursting.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn per_second(rate: f64) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / rate))
    }

    /// block until the next permit is available
    pub fn acquire(&self) {
        let wait = {
            let mut next_slot = self.next_slot.lock();
            let now = Instant::now();
            let slot = next_slot.map_or(now, |slot| slot.max(now));
            *next_slot = Some(slot + self.interval);

            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }
}
