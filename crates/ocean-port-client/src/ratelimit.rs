use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

const WIDEN_COOLDOWN: Duration = Duration::from_secs(30);

struct State {
    current: usize,
    throttled_since_widen: bool,
    last_widen: Instant,
}

/// RateLimiter caps in-flight Port requests and narrows that cap under sustained
/// 429/5xx pressure (multiplicative decrease), widening it again after a
/// cool-down with no further throttling signals (additive increase). Shared
/// across every kind pipeline and the webhook dispatcher, as `spec.md` §4.C2
/// requires a single rate-limit state for the whole client.
pub(crate) struct RateLimiter {
    semaphore: Arc<Semaphore>,
    state: Mutex<State>,
    min: usize,
    max: usize,
}

impl RateLimiter {
    pub(crate) fn new(initial: usize, min: usize, max: usize) -> Self {
        let initial = initial.clamp(min, max);
        Self {
            semaphore: Arc::new(Semaphore::new(initial)),
            state: Mutex::new(State {
                current: initial,
                throttled_since_widen: false,
                last_widen: Instant::now(),
            }),
            min,
            max,
        }
    }

    /// Acquire blocks until a concurrency slot is available.
    pub(crate) async fn acquire(&self) -> OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("rate limiter semaphore is never closed")
    }

    /// On_throttled narrows the concurrency cap by half, down to `min`, in
    /// response to a 429 or a 5xx the caller treats as a rate-limit signal.
    pub(crate) fn on_throttled(&self) {
        let mut state = self.state.lock();
        let halved = state.current.checked_div(2).unwrap_or(state.current);
        let target = halved.max(self.min);
        if target < state.current {
            let shrink_by = state.current.saturating_sub(target);
            for _ in 0..shrink_by {
                match self.semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit.forget(),
                    Err(_) => break,
                }
            }
            state.current = target;
        }
        state.throttled_since_widen = true;
    }

    /// On_success widens the concurrency cap by one, at most once per cool-down
    /// window, as long as no throttling signal has been seen since the last
    /// widen.
    pub(crate) fn on_success(&self) {
        let mut state = self.state.lock();
        if state.throttled_since_widen {
            state.throttled_since_widen = false;
            return;
        }
        if state.current >= self.max {
            return;
        }
        if state.last_widen.elapsed() < WIDEN_COOLDOWN {
            return;
        }
        self.semaphore.add_permits(1);
        state.current = state.current.saturating_add(1);
        state.last_widen = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn throttle_halves_limit_down_to_min() {
        let rl = RateLimiter::new(8, 2, 16);
        rl.on_throttled();
        assert_eq!(rl.state.lock().current, 4);
        rl.on_throttled();
        assert_eq!(rl.state.lock().current, 2);
        rl.on_throttled();
        assert_eq!(rl.state.lock().current, 2);
    }

    #[tokio::test]
    async fn success_does_not_widen_during_cooldown() {
        let rl = RateLimiter::new(4, 2, 16);
        rl.on_success();
        assert_eq!(rl.state.lock().current, 4);
    }
}
