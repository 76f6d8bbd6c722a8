//! Reconnect backoff and connection-stability tracking

use oh_config::BackoffConfig;
use rand::Rng;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Exponential backoff with symmetric jitter
///
/// `next = previous == 0 ? initial : previous * multiplier`, then jitter in
/// `[-jitter, +jitter]` is added and the result clamped to `[min, max]`.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            current: Duration::ZERO,
        }
    }

    /// The delay returned by the last call to [`Backoff::next_delay`]
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Advance to the next delay
    pub fn next_delay(&mut self) -> Duration {
        let spread = self.config.jitter.as_secs_f64();
        let offset = if spread > 0.0 {
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0.0
        };
        self.advance(offset)
    }

    /// Forget the escalation so the next delay is `initial` again
    pub fn reset(&mut self) {
        self.current = Duration::ZERO;
    }

    fn advance(&mut self, jitter_secs: f64) -> Duration {
        let base = if self.current.is_zero() {
            self.config.initial.as_secs_f64()
        } else {
            self.current.as_secs_f64() * self.config.multiplier
        };

        let min = self.config.min.as_secs_f64();
        let max = self.config.max.as_secs_f64();
        let secs = (base + jitter_secs).min(max).max(min);

        self.current = Duration::from_secs_f64(secs);
        self.current
    }
}

/// Backoff shared between the reconnect loop and the stability timer
pub struct ReconnectState {
    backoff: Mutex<Backoff>,
    stable_after: Duration,
    stability_timer: Mutex<Option<CancellationToken>>,
}

impl ReconnectState {
    pub fn new(config: BackoffConfig) -> Arc<Self> {
        Arc::new(Self {
            stable_after: config.stable_after,
            backoff: Mutex::new(Backoff::new(config)),
            stability_timer: Mutex::new(None),
        })
    }

    /// Next reconnect delay
    pub fn next_delay(&self) -> Duration {
        lock(&self.backoff).next_delay()
    }

    /// The delay most recently handed out
    pub fn current_delay(&self) -> Duration {
        lock(&self.backoff).current()
    }

    /// Arm the stability timer for a fresh connection
    ///
    /// If the connection is still up after `stable_after`, backoff resets and
    /// `on_stable` runs. Any previously armed timer is cancelled.
    pub fn arm_stability_timer<F>(self: &Arc<Self>, on_stable: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        if let Some(previous) = lock(&self.stability_timer).replace(token.clone()) {
            previous.cancel();
        }

        let state = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Stability timer cancelled");
                }
                _ = tokio::time::sleep(state.stable_after) => {
                    lock(&state.backoff).reset();
                    info!(stable_after = ?state.stable_after, "Connection stable, backoff reset");
                    on_stable();
                }
            }
        });
    }

    /// Cancel a pending stability timer, leaving backoff unchanged
    pub fn cancel_stability_timer(&self) {
        if let Some(token) = lock(&self.stability_timer).take() {
            token.cancel();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn config() -> BackoffConfig {
        BackoffConfig {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            max: Duration::from_secs(10),
            min: Duration::from_millis(500),
            jitter: Duration::ZERO,
            stable_after: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_escalates_to_max() {
        let mut backoff = Backoff::new(config());
        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn test_non_decreasing_without_jitter() {
        let mut backoff = Backoff::new(BackoffConfig {
            multiplier: 1.5,
            ..config()
        });
        let mut last = Duration::ZERO;
        for _ in 0..20 {
            let next = backoff.next_delay();
            assert!(next >= last);
            last = next;
        }
        assert_eq!(last, Duration::from_secs(10));
    }

    #[test]
    fn test_reset_returns_to_initial() {
        let mut backoff = Backoff::new(config());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_is_clamped() {
        let mut backoff = Backoff::new(config());
        assert_eq!(backoff.advance(-5.0), Duration::from_millis(500));
        assert_eq!(backoff.advance(100.0), Duration::from_secs(10));
        assert_eq!(backoff.advance(0.25), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_within_spread() {
        let mut backoff = Backoff::new(BackoffConfig {
            jitter: Duration::from_millis(200),
            ..config()
        });
        let first = backoff.next_delay();
        assert!(first >= Duration::from_millis(800) && first <= Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_connection_resets_backoff() {
        let state = ReconnectState::new(config());
        state.next_delay();
        state.next_delay();
        assert_eq!(state.current_delay(), Duration::from_secs(2));

        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        state.arm_stability_timer(move || flag.store(true, Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(state.next_delay(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_drop_keeps_escalating() {
        let state = ReconnectState::new(config());
        let fired = Arc::new(AtomicBool::new(false));

        let mut delays = Vec::new();
        for _ in 0..4 {
            let flag = fired.clone();
            state.arm_stability_timer(move || flag.store(true, Ordering::SeqCst));
            tokio::time::sleep(Duration::from_secs(1)).await;
            state.cancel_stability_timer();
            delays.push(state.next_delay().as_secs());
        }

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(delays, vec![1, 2, 4, 8]);
    }
}
