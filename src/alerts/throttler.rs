use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::debug;

use super::{Alert, AlertQueue};

const DEFAULT_THRESHOLD: Duration = Duration::from_millis(500);

/// Cancellation token for one scheduled alert. `cancel` is idempotent.
#[derive(Clone)]
pub struct ScheduleToken {
    cancelled: Arc<AtomicBool>,
}

impl ScheduleToken {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-key debounce in front of [`AlertQueue`].
///
/// A scheduled alert only reaches the queue if its timer survives the
/// threshold; scheduling again under the same key restarts the clock.
/// Cancelling a key with no pending timer enqueues the fallback instead:
/// the condition was already announced, so its resolution is worth
/// announcing too. Timer firing and cancellation both resolve under the
/// pending-map lock, so cancellation is exact.
pub struct CancelableAlertThrottler {
    threshold: Duration,
    pending: Arc<Mutex<HashMap<String, ScheduleToken>>>,
}

impl Default for CancelableAlertThrottler {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl CancelableAlertThrottler {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn schedule_alert(
        &self,
        key: impl Into<String>,
        queue: &AlertQueue,
        alert: Alert,
    ) -> ScheduleToken {
        let key = key.into();
        let token = ScheduleToken {
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        {
            let mut pending = self.pending.lock().unwrap();
            if let Some(previous) = pending.insert(key.clone(), token.clone()) {
                debug!("Rescheduling pending alert for key '{}'", key);
                previous.cancel();
            }
        }

        let threshold = self.threshold;
        let pending = Arc::clone(&self.pending);
        let queue = queue.clone();
        let timer_token = token.clone();
        thread::spawn(move || {
            thread::sleep(threshold);
            // Resolve under the map lock so a concurrent cancel_alert for
            // this key either beats us entirely or sees no pending entry
            let fire = {
                let mut pending = pending.lock().unwrap();
                let fire = !timer_token.is_cancelled();
                timer_token.cancel();
                if pending
                    .get(&key)
                    .map(|current| Arc::ptr_eq(&current.cancelled, &timer_token.cancelled))
                    .unwrap_or(false)
                {
                    pending.remove(&key);
                }
                fire
            };
            if fire {
                debug!("Throttled alert for key '{}' survived debounce", key);
                queue.enqueue(alert);
            }
        });
        token
    }

    /// Cancel the pending alert for `key` if one is still waiting out its
    /// threshold; otherwise enqueue `fallback`.
    pub fn cancel_alert(&self, key: &str, queue: &AlertQueue, fallback: Alert) {
        let cancelled_pending = {
            let mut pending = self.pending.lock().unwrap();
            match pending.remove(key) {
                Some(token) if !token.is_cancelled() => {
                    token.cancel();
                    true
                }
                _ => false,
            }
        };
        if cancelled_pending {
            debug!("Cancelled pending alert for key '{}'", key);
        } else {
            queue.enqueue(fallback);
        }
    }

    pub fn has_pending(&self, key: &str) -> bool {
        self.pending
            .lock()
            .unwrap()
            .get(key)
            .map(|token| !token.is_cancelled())
            .unwrap_or(false)
    }
}
