use std::path::PathBuf;
use std::time::SystemTime;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::FloatlinkError;

const LOCAL_DATA_FILE_NAME: &str = "local_data.json";

/// Ride aggregates that outlive individual sessions.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RideStats {
    pub max_rpm: i16,
    pub max_rpm_time: Option<SystemTime>,
    /// Lifetime revolutions, accumulated across device-side trip resets
    pub odometer_revolutions: u64,
    /// Last whole mile announced through the mileage alert
    pub last_announced_mile: u64,
    /// Device-side trip counter at the last reading; survives restarts so
    /// a reconnect does not re-count the whole trip
    pub trip_offset: u16,
    pub last_battery_level: u8,
}

/// Everything we persist about the user's board outside the ride log:
/// identity for fast reconnection plus the running [`RideStats`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LocalData {
    /// Identifier of the paired board; cleared on unpair
    pub primary_device_id: Option<String>,
    pub stats: RideStats,
}

/// JSON file store for [`LocalData`] under the platform data directory.
pub struct LocalDataStore {
    path: PathBuf,
}

impl LocalDataStore {
    pub fn in_data_dir() -> Result<Self, FloatlinkError> {
        let dir = dirs::data_dir()
            .ok_or(FloatlinkError::NoConfigDir)?
            .join("floatlink");
        Ok(Self {
            path: dir.join(LOCAL_DATA_FILE_NAME),
        })
    }

    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load persisted data, falling back to defaults on a missing or
    /// unreadable file.
    pub fn load(&self) -> LocalData {
        if !self.path.exists() {
            return LocalData::default();
        }
        match std::fs::File::open(&self.path) {
            Ok(file) => serde_json::from_reader(file).unwrap_or_else(|e| {
                warn!("Discarding unreadable local data file: {}", e);
                LocalData::default()
            }),
            Err(e) => {
                warn!("Could not open local data file: {}", e);
                LocalData::default()
            }
        }
    }

    pub fn save(&self, data: &LocalData) -> Result<(), FloatlinkError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| FloatlinkError::ConfigIOError { source: e })?;
            }
        }
        let file = std::fs::File::create(&self.path)
            .map_err(|e| FloatlinkError::ConfigIOError { source: e })?;
        serde_json::to_writer(file, data)
            .map_err(|e| FloatlinkError::ConfigSerializeError { source: e })
    }
}
