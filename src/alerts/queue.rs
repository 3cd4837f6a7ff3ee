use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::debug;

use super::{Alert, AlertSink, Priority};

struct QueueState {
    alerts: VecDeque<Alert>,
    is_playing: bool,
    last_played: Option<Alert>,
}

/// Priority delivery queue with strictly one in-flight alert.
///
/// All high alerts precede all low alerts; within a priority class order is
/// FIFO. Enqueuing a keyed alert replaces any queued alert with the same
/// key. Entries structurally identical to the alert just played are skipped
/// so the sink never repeats itself verbatim.
///
/// Queue state is confined to one mutex; the sink is always invoked outside
/// the lock, and its completion callback re-enters [`AlertQueue::play_next`]
/// to drive the {Idle, Playing} state machine.
#[derive(Clone)]
pub struct AlertQueue {
    state: Arc<Mutex<QueueState>>,
    sink: Arc<dyn AlertSink>,
}

impl AlertQueue {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                alerts: VecDeque::new(),
                is_playing: false,
                last_played: None,
            })),
            sink,
        }
    }

    pub fn enqueue(&self, alert: Alert) {
        let start_playback = {
            let mut state = self.state.lock().unwrap();
            if let Some(key) = alert.key.as_deref() {
                state.alerts.retain(|queued| queued.key.as_deref() != Some(key));
            }
            match alert.priority {
                Priority::High => {
                    let first_non_high = state
                        .alerts
                        .iter()
                        .position(|queued| queued.priority != Priority::High)
                        .unwrap_or(state.alerts.len());
                    debug!("Inserting high alert at idx {}", first_non_high);
                    state.alerts.insert(first_non_high, alert);
                }
                Priority::Low => {
                    debug!("Inserting low alert at idx {}", state.alerts.len());
                    state.alerts.push_back(alert);
                }
            }
            if state.is_playing {
                false
            } else {
                state.is_playing = true;
                true
            }
        };
        if start_playback {
            self.play_next();
        }
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().alerts.len()
    }

    fn play_next(&self) {
        let next = {
            let mut state = self.state.lock().unwrap();
            // Skip entries identical to what just played
            while let (Some(front), Some(last)) = (state.alerts.front(), &state.last_played) {
                if front.fingerprint() != last.fingerprint() {
                    break;
                }
                debug!("Skipping verbatim repeat of '{}'", front.message);
                state.alerts.pop_front();
            }
            match state.alerts.pop_front() {
                None => {
                    debug!("Alert queue empty");
                    state.is_playing = false;
                    None
                }
                Some(alert) => {
                    let use_short_message = alert.key.is_some()
                        && state
                            .last_played
                            .as_ref()
                            .map(|last| last.key == alert.key)
                            .unwrap_or(false);
                    state.last_played = Some(alert.clone());
                    Some((alert, use_short_message))
                }
            }
        };
        if let Some((alert, use_short_message)) = next {
            let queue = self.clone();
            self.sink
                .trigger(&alert, use_short_message, Box::new(move || queue.play_next()));
        }
    }
}
