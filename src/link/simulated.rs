// In-process device link replaying a scripted ride. Backs the `demo` and
// `replay` commands and the integration tests; the real BLE transport is an
// external collaborator behind the same trait.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_jsonlines::json_lines;

use crate::errors::FloatlinkError;
use crate::telemetry::decoder::Characteristic;

use super::{DeviceLink, LinkEvent};

pub const SIMULATED_DEVICE_ID: &str = "SIM-0001";

/// One raw notification in a recorded ride log (JSON lines).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RideLogRecord {
    /// Milliseconds from the start of the recording
    pub offset_ms: u64,
    pub uuid: String,
    pub value: Vec<u8>,
}

impl RideLogRecord {
    pub fn new(offset_ms: u64, characteristic: Characteristic, value: Vec<u8>) -> Self {
        Self {
            offset_ms,
            uuid: characteristic.uuid().to_string(),
            value,
        }
    }
}

pub fn load_ride_log(path: &Path) -> Result<Vec<RideLogRecord>, FloatlinkError> {
    let records = json_lines(path)
        .map_err(|e| FloatlinkError::RideLogLoaderError { source: e })?
        .collect::<Result<Vec<RideLogRecord>, _>>()
        .map_err(|e| FloatlinkError::RideLogLoaderError { source: e })?;
    Ok(records)
}

/// Scripted [`DeviceLink`]: subscribed characteristics stream on schedule,
/// polled ones only answer explicit reads with their latest scripted value.
#[derive(Clone)]
pub struct SimulatedLink {
    events: Sender<LinkEvent>,
    script: Arc<Vec<RideLogRecord>>,
    /// Latest scripted value per uuid, for read requests
    latest: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    writes: Arc<Mutex<Vec<(Characteristic, Vec<u8>)>>>,
    /// Bumped on subscribe/disconnect so stale playback threads wind down
    generation: Arc<AtomicU64>,
    /// Emit a Disconnected event when the script runs out
    disconnect_at_end: bool,
}

impl SimulatedLink {
    pub fn new(events: Sender<LinkEvent>, script: Vec<RideLogRecord>) -> Self {
        Self {
            events,
            script: Arc::new(script),
            latest: Arc::new(Mutex::new(HashMap::new())),
            writes: Arc::new(Mutex::new(Vec::new())),
            generation: Arc::new(AtomicU64::new(0)),
            disconnect_at_end: false,
        }
    }

    pub fn disconnecting_at_end(mut self) -> Self {
        self.disconnect_at_end = true;
        self
    }

    /// Characteristic writes received so far (e.g. lights commands).
    pub fn writes(&self) -> Vec<(Characteristic, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }

    /// A short synthetic ride: mount, accelerate through a couple of speed
    /// benchmarks, battery sag, trip counter ticking, dismount.
    pub fn synthetic_ride() -> Vec<RideLogRecord> {
        let mut script = Vec::new();
        let mut at = 0u64;
        let mut push = |at: u64, characteristic: Characteristic, value: Vec<u8>| {
            script.push(RideLogRecord::new(at, characteristic, value));
        };

        push(at, Characteristic::BatteryLevel, vec![0x00, 95]);
        push(at, Characteristic::Temperature, vec![28, 31]);
        push(at, Characteristic::BatteryVoltage, 380u16.to_be_bytes().to_vec());
        push(at, Characteristic::TripOdometer, vec![0x00, 0x00]);
        at += 200;
        // rider steps on
        push(at, Characteristic::Status, vec![0b0000_0111]);
        // ramp up to ~16 mph, ~1 mph per 300 ms
        for step in 1..=16i16 {
            at += 300;
            let rpm = (step as f64 * 63360.0 / (60.0 * 35.0)) as i16;
            push(at, Characteristic::Rpm, rpm.to_be_bytes().to_vec());
        }
        at += 500;
        push(at, Characteristic::BatteryLevel, vec![0x00, 89]);
        at += 500;
        push(at, Characteristic::TripOdometer, vec![0x01, 0x2C]);
        // cruise back down
        for step in (0..=12i16).rev().step_by(3) {
            at += 400;
            let rpm = (step as f64 * 63360.0 / (60.0 * 35.0)) as i16;
            push(at, Characteristic::Rpm, rpm.to_be_bytes().to_vec());
        }
        at += 300;
        // rider steps off
        push(at, Characteristic::Status, vec![0b0000_0000]);
        script
    }
}

impl DeviceLink for SimulatedLink {
    fn start_scan(&mut self) -> Result<(), FloatlinkError> {
        debug!("Simulated scan started");
        self.events
            .send(LinkEvent::Discovered {
                device_id: SIMULATED_DEVICE_ID.to_string(),
                name: Some("Simulated Board".to_string()),
            })
            .map_err(|_| FloatlinkError::LinkChannelClosed)
    }

    fn stop_scan(&mut self) -> Result<(), FloatlinkError> {
        Ok(())
    }

    fn connect(&mut self, device_id: &str) -> Result<(), FloatlinkError> {
        if device_id != SIMULATED_DEVICE_ID {
            return Err(FloatlinkError::DeviceLinkError {
                description: format!("unknown device {device_id}"),
            });
        }
        self.events
            .send(LinkEvent::Connected {
                device_id: device_id.to_string(),
            })
            .map_err(|_| FloatlinkError::LinkChannelClosed)
    }

    fn disconnect(&mut self) -> Result<(), FloatlinkError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.events
            .send(LinkEvent::Disconnected {
                device_id: SIMULATED_DEVICE_ID.to_string(),
            })
            .map_err(|_| FloatlinkError::LinkChannelClosed)
    }

    fn subscribe(&mut self, characteristics: &[Characteristic]) -> Result<(), FloatlinkError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let subscribed: Vec<String> = characteristics
            .iter()
            .map(|c| c.uuid().to_string())
            .collect();
        info!("Simulated subscription to {} characteristics", subscribed.len());

        let script = Arc::clone(&self.script);
        let latest = Arc::clone(&self.latest);
        let events = self.events.clone();
        let current_generation = Arc::clone(&self.generation);
        let disconnect_at_end = self.disconnect_at_end;
        thread::spawn(move || {
            let mut elapsed = 0u64;
            for record in script.iter() {
                if record.offset_ms > elapsed {
                    thread::sleep(Duration::from_millis(record.offset_ms - elapsed));
                    elapsed = record.offset_ms;
                }
                if current_generation.load(Ordering::SeqCst) != generation {
                    debug!("Simulated playback superseded");
                    return;
                }
                latest
                    .lock()
                    .unwrap()
                    .insert(record.uuid.clone(), record.value.clone());
                if subscribed.iter().any(|uuid| *uuid == record.uuid) {
                    let sent = events.send(LinkEvent::CharacteristicUpdated {
                        uuid: record.uuid.clone(),
                        value: record.value.clone(),
                    });
                    if sent.is_err() {
                        return;
                    }
                }
            }
            if disconnect_at_end && current_generation.load(Ordering::SeqCst) == generation {
                info!("Simulated ride script finished; dropping link");
                let _ = events.send(LinkEvent::Disconnected {
                    device_id: SIMULATED_DEVICE_ID.to_string(),
                });
            }
        });
        Ok(())
    }

    fn read_characteristic(&mut self, characteristic: Characteristic) -> Result<(), FloatlinkError> {
        let value = self
            .latest
            .lock()
            .unwrap()
            .get(characteristic.uuid())
            .cloned();
        if let Some(value) = value {
            self.events
                .send(LinkEvent::CharacteristicUpdated {
                    uuid: characteristic.uuid().to_string(),
                    value,
                })
                .map_err(|_| FloatlinkError::LinkChannelClosed)?;
        }
        Ok(())
    }

    fn write_characteristic(
        &mut self,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<(), FloatlinkError> {
        debug!("Simulated write to {}: {:?}", characteristic, value);
        self.writes.lock().unwrap().push((characteristic, value.to_vec()));
        Ok(())
    }
}
