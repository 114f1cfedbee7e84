//! Deferred refresh timer.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Owns at most one pending timer.
///
/// The timer task only sleeps and then invokes the callback. Work started by
/// the callback should be spawned separately, so re-arming from inside that
/// work never aborts it.
#[derive(Debug, Default)]
pub struct RefreshScheduler {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any pending timer with one that calls `on_fire` after `delay`.
    ///
    /// Outside a tokio runtime nothing is scheduled.
    pub fn arm<F>(&self, delay: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime available, refresh timer not armed");
                return;
            }
        };

        debug!(delay_ms = delay.as_millis() as u64, "Arming refresh timer");
        *pending = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire();
        }));
    }

    /// Cancel the pending timer, if any.
    pub fn cancel(&self) {
        if let Some(previous) = self.pending.lock().take() {
            debug!("Cancelling refresh timer");
            previous.abort();
        }
    }

    /// Whether a timer is waiting to fire.
    pub fn is_armed(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.get_mut().take() {
            pending.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let make = {
            let fired = fired.clone();
            move || {
                let fired = fired.clone();
                Box::new(move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                }) as Box<dyn FnOnce() + Send>
            }
        };
        (fired, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let scheduler = RefreshScheduler::new();
        let (fired, make) = counter();

        scheduler.arm(Duration::from_millis(10_000), make());
        assert!(scheduler.is_armed());

        tokio::time::sleep(Duration::from_millis(9_999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_armed());

        tokio::time::sleep(Duration::from_millis(60_000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_pending_timer() {
        let scheduler = RefreshScheduler::new();
        let (fired, make) = counter();

        scheduler.arm(Duration::from_millis(10_000), make());
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        scheduler.arm(Duration::from_millis(10_000), make());

        tokio::time::sleep(Duration::from_millis(6_000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let scheduler = RefreshScheduler::new();
        let (fired, make) = counter();

        scheduler.cancel();
        scheduler.arm(Duration::from_millis(1_000), make());
        scheduler.cancel();
        scheduler.cancel();
        assert!(!scheduler.is_armed());

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_arm_without_runtime_is_noop() {
        let scheduler = RefreshScheduler::new();
        scheduler.arm(Duration::from_millis(10), || {});
        assert!(!scheduler.is_armed());
    }
}
