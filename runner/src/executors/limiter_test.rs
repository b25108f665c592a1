use super::limiter::RateLimiter;
use parking_lot::Mutex;
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

#[test]
pub fn permits_are_spaced_out() {
    let limiter = RateLimiter::per_second(100.0);
    let start = Instant::now();

    for _ in 0..5 {
        limiter.acquire();
    }

    // the first permit is free, the other four wait one interval each
    assert!(start.elapsed() >= Duration::from_millis(38));
}

#[test]
pub fn concurrent_callers_queue_up() {
    let limiter = Arc::new(RateLimiter::new(Duration::from_millis(20)));
    let granted = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let limiter = limiter.clone();
            let granted = granted.clone();
            thread::spawn(move || {
                limiter.acquire();
                granted.lock().push(Instant::now());
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut granted = granted.lock().clone();
    granted.sort();
    assert!(granted[3] - granted[0] >= Duration::from_millis(55));
}
