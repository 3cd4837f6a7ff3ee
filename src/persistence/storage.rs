use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::errors::FloatlinkError;
use crate::telemetry::VehicleState;

use super::StateStore;

/// Append-only JSON-lines ride log, one state snapshot per line.
///
/// A batch insert buffers all lines and flushes once, so a crash mid-batch
/// loses the whole batch rather than writing a torn record.
pub struct JsonlStateStore {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlStateStore {
    pub fn create(path: PathBuf) -> Result<Self, FloatlinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| FloatlinkError::StorageError { source: e })?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    fn write_line(&mut self, state: &VehicleState) -> Result<(), FloatlinkError> {
        let line = serde_json::to_string(state)
            .map_err(|e| FloatlinkError::StorageSerializeError { source: e })?;
        writeln!(self.writer, "{}", line).map_err(|e| FloatlinkError::StorageError { source: e })
    }

    fn flush(&mut self) -> Result<(), FloatlinkError> {
        self.writer
            .flush()
            .map_err(|e| FloatlinkError::StorageError { source: e })
    }
}

impl StateStore for JsonlStateStore {
    fn insert_state(&mut self, state: &VehicleState) -> Result<(), FloatlinkError> {
        self.write_line(state)?;
        self.flush()
    }

    fn insert_states(&mut self, states: &[VehicleState]) -> Result<(), FloatlinkError> {
        for state in states {
            self.write_line(state)?;
        }
        self.flush()
    }

    fn clear(&mut self) -> Result<(), FloatlinkError> {
        let file = File::create(&self.path).map_err(|e| FloatlinkError::StorageError { source: e })?;
        self.writer = BufWriter::new(file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufRead;
    use std::time::SystemTime;

    use super::*;

    fn read_lines(path: &PathBuf) -> Vec<VehicleState> {
        let file = File::open(path).unwrap();
        std::io::BufReader::new(file)
            .lines()
            .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
            .collect()
    }

    fn state_with_battery(battery_level: u8) -> VehicleState {
        VehicleState {
            time: SystemTime::now(),
            battery_level,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_and_batch_inserts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ride.jsonl");
        let mut store = JsonlStateStore::create(path.clone()).unwrap();

        store.insert_state(&state_with_battery(90)).unwrap();
        store
            .insert_states(&[state_with_battery(80), state_with_battery(70)])
            .unwrap();

        let states = read_lines(&path);
        assert_eq!(states.len(), 3);
        assert_eq!(states[0].battery_level, 90);
        assert_eq!(states[2].battery_level, 70);
    }

    #[test]
    fn test_clear_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ride.jsonl");
        let mut store = JsonlStateStore::create(path.clone()).unwrap();
        store.insert_state(&state_with_battery(50)).unwrap();
        store.clear().unwrap();
        store.insert_state(&state_with_battery(42)).unwrap();
        let states = read_lines(&path);
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].battery_level, 42);
    }
}
