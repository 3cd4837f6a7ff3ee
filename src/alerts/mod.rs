pub(crate) mod queue;
pub(crate) mod throttler;

use log::info;

pub use queue::AlertQueue;
pub use throttler::CancelableAlertThrottler;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    /// Play after other high alerts, before all low alerts
    High,
    /// Play after other high and low alerts
    Low,
}

/// One spoken/visual alert. `key` links alerts about the same underlying
/// condition: the queue keeps at most one queued alert per key, and a keyed
/// alert played right after another with the same key uses `short_message`.
#[derive(Clone, Debug, PartialEq)]
pub struct Alert {
    pub priority: Priority,
    pub message: String,
    pub short_message: Option<String>,
    pub key: Option<String>,
}

impl Alert {
    pub fn high(message: impl Into<String>) -> Self {
        Self {
            priority: Priority::High,
            message: message.into(),
            short_message: None,
            key: None,
        }
    }

    pub fn low(message: impl Into<String>) -> Self {
        Self {
            priority: Priority::Low,
            message: message.into(),
            short_message: None,
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_short_message(mut self, short: impl Into<String>) -> Self {
        self.short_message = Some(short.into());
        self
    }

    pub fn spoken_message(&self, use_short_message: bool) -> &str {
        if use_short_message {
            self.short_message.as_deref().unwrap_or(&self.message)
        } else {
            &self.message
        }
    }

    /// Structural identity used to squelch verbatim repeats.
    pub(crate) fn fingerprint(&self) -> (Priority, Option<&str>, &str) {
        (self.priority, self.key.as_deref(), &self.message)
    }
}

/// Called when playback of the handed alert finishes; playback may complete
/// asynchronously (e.g. speech synthesis).
pub type Completion = Box<dyn FnOnce() + Send>;

/// External presentation layer for alerts. Implementations must stop any
/// prior playback before starting a new one; the queue never hands over a
/// second alert until `completion` runs.
pub trait AlertSink: Send + Sync {
    fn trigger(&self, alert: &Alert, use_short_message: bool, completion: Completion);
}

/// Sink for headless runs: logs the alert text and completes immediately.
pub struct ConsoleAlertSink;

impl AlertSink for ConsoleAlertSink {
    fn trigger(&self, alert: &Alert, use_short_message: bool, completion: Completion) {
        info!(
            "[{}] {}",
            match alert.priority {
                Priority::High => "ALERT",
                Priority::Low => "info",
            },
            alert.spoken_message(use_short_message)
        );
        completion();
    }
}
