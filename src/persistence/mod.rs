pub(crate) mod local_data;
pub(crate) mod storage;

use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::errors::FloatlinkError;
use crate::telemetry::VehicleState;

pub use local_data::{LocalData, LocalDataStore, RideStats};
pub use storage::JsonlStateStore;

/// Consumed storage interface. `insert_states` must persist the whole batch
/// as a single transaction.
pub trait StateStore: Send {
    fn insert_state(&mut self, state: &VehicleState) -> Result<(), FloatlinkError>;
    fn insert_states(&mut self, states: &[VehicleState]) -> Result<(), FloatlinkError>;
    fn clear(&mut self) -> Result<(), FloatlinkError>;
}

const BACKGROUND_BATCH_SIZE: usize = 20;

enum Command {
    Write(Box<VehicleState>),
    Flush,
    SetBackground(bool),
    Shutdown,
}

/// Buffers state snapshots and writes them on a dedicated worker thread.
///
/// Foreground: any backlog is flushed first, then the snapshot is written
/// singly. Background: snapshots accumulate in memory and flush as one
/// batched transaction every [`BACKGROUND_BATCH_SIZE`] writes, conserving
/// I/O while the app is not visible. Backlog and store live on the worker,
/// so write ordering is deterministic.
pub struct PersistenceBatcher {
    commands: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl PersistenceBatcher {
    pub fn new(store: Box<dyn StateStore>) -> Self {
        let (commands, receiver) = mpsc::channel::<Command>();
        let worker = thread::spawn(move || {
            let mut store = store;
            let mut backlog: Vec<VehicleState> = Vec::new();
            let mut backgrounded = false;
            for command in receiver {
                match command {
                    Command::Write(state) => {
                        if backgrounded {
                            backlog.push(*state);
                            if backlog.len() >= BACKGROUND_BATCH_SIZE {
                                flush_backlog(store.as_mut(), &mut backlog);
                            }
                        } else {
                            flush_backlog(store.as_mut(), &mut backlog);
                            if let Err(e) = store.insert_state(&state) {
                                warn!("Dropped state write: {}", e);
                            }
                        }
                    }
                    Command::Flush => flush_backlog(store.as_mut(), &mut backlog),
                    Command::SetBackground(background) => {
                        debug!("Persistence mode: backgrounded={}", background);
                        backgrounded = background;
                        if !backgrounded {
                            flush_backlog(store.as_mut(), &mut backlog);
                        }
                    }
                    Command::Shutdown => {
                        flush_backlog(store.as_mut(), &mut backlog);
                        break;
                    }
                }
            }
        });
        Self {
            commands,
            worker: Some(worker),
        }
    }

    pub fn write(&self, state: VehicleState) -> Result<(), FloatlinkError> {
        self.commands
            .send(Command::Write(Box::new(state)))
            .map_err(|_| FloatlinkError::PersistenceWorkerGone)
    }

    /// Flush any backlog now, e.g. before suspension. Idempotent when the
    /// backlog is empty.
    pub fn flush(&self) -> Result<(), FloatlinkError> {
        self.commands
            .send(Command::Flush)
            .map_err(|_| FloatlinkError::PersistenceWorkerGone)
    }

    pub fn set_background(&self, backgrounded: bool) -> Result<(), FloatlinkError> {
        self.commands
            .send(Command::SetBackground(backgrounded))
            .map_err(|_| FloatlinkError::PersistenceWorkerGone)
    }
}

impl Drop for PersistenceBatcher {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn flush_backlog(store: &mut dyn StateStore, backlog: &mut Vec<VehicleState>) {
    if backlog.is_empty() {
        return;
    }
    debug!("Flushing {} backlogged states", backlog.len());
    if let Err(e) = store.insert_states(backlog) {
        warn!("Dropped batch of {} state writes: {}", backlog.len(), e);
    }
    backlog.clear();
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, SystemTime};

    use super::*;

    /// Every insert is recorded as one transaction (a Vec of states).
    #[derive(Clone, Default)]
    struct MemoryStore {
        transactions: Arc<Mutex<Vec<Vec<VehicleState>>>>,
    }

    impl MemoryStore {
        fn transaction_sizes(&self) -> Vec<usize> {
            self.transactions
                .lock()
                .unwrap()
                .iter()
                .map(|t| t.len())
                .collect()
        }
    }

    impl StateStore for MemoryStore {
        fn insert_state(&mut self, state: &VehicleState) -> Result<(), FloatlinkError> {
            self.transactions.lock().unwrap().push(vec![state.clone()]);
            Ok(())
        }

        fn insert_states(&mut self, states: &[VehicleState]) -> Result<(), FloatlinkError> {
            self.transactions.lock().unwrap().push(states.to_vec());
            Ok(())
        }

        fn clear(&mut self) -> Result<(), FloatlinkError> {
            self.transactions.lock().unwrap().clear();
            Ok(())
        }
    }

    fn state_at(rpm: i16) -> VehicleState {
        VehicleState {
            time: SystemTime::now(),
            rpm,
            ..Default::default()
        }
    }

    fn settle() {
        thread::sleep(Duration::from_millis(100));
    }

    #[test]
    fn test_foreground_writes_singly() {
        let store = MemoryStore::default();
        let batcher = PersistenceBatcher::new(Box::new(store.clone()));
        batcher.write(state_at(1)).unwrap();
        batcher.write(state_at(2)).unwrap();
        settle();
        assert_eq!(store.transaction_sizes(), vec![1, 1]);
    }

    #[test]
    fn test_background_batches_at_size() {
        let store = MemoryStore::default();
        let batcher = PersistenceBatcher::new(Box::new(store.clone()));
        batcher.set_background(true).unwrap();
        for rpm in 0..BACKGROUND_BATCH_SIZE as i16 {
            batcher.write(state_at(rpm)).unwrap();
        }
        settle();
        assert_eq!(store.transaction_sizes(), vec![BACKGROUND_BATCH_SIZE]);
    }

    #[test]
    fn test_explicit_flush_and_idempotence() {
        let store = MemoryStore::default();
        let batcher = PersistenceBatcher::new(Box::new(store.clone()));
        batcher.set_background(true).unwrap();
        batcher.write(state_at(1)).unwrap();
        batcher.write(state_at(2)).unwrap();
        batcher.flush().unwrap();
        batcher.flush().unwrap();
        settle();
        assert_eq!(store.transaction_sizes(), vec![2]);
    }

    #[test]
    fn test_foregrounding_flushes_backlog_before_single_write() {
        let store = MemoryStore::default();
        let batcher = PersistenceBatcher::new(Box::new(store.clone()));
        batcher.set_background(true).unwrap();
        batcher.write(state_at(1)).unwrap();
        batcher.write(state_at(2)).unwrap();
        batcher.write(state_at(3)).unwrap();
        batcher.set_background(false).unwrap();
        batcher.write(state_at(4)).unwrap();
        settle();
        assert_eq!(store.transaction_sizes(), vec![3, 1]);
    }

    #[test]
    fn test_shutdown_flushes_backlog() {
        let store = MemoryStore::default();
        {
            let batcher = PersistenceBatcher::new(Box::new(store.clone()));
            batcher.set_background(true).unwrap();
            batcher.write(state_at(1)).unwrap();
        }
        assert_eq!(store.transaction_sizes(), vec![1]);
    }
}
