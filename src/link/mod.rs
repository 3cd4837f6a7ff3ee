pub(crate) mod simulated;

use crate::errors::FloatlinkError;
use crate::telemetry::decoder::Characteristic;

pub use simulated::{load_ride_log, RideLogRecord, SimulatedLink, SIMULATED_DEVICE_ID};

/// Everything the transport reports back, as a closed set of message
/// variants consumed over a channel. The raw GATT plumbing lives behind
/// [`DeviceLink`]; this crate only sees these events.
#[derive(Clone, Debug)]
pub enum LinkEvent {
    Discovered {
        device_id: String,
        name: Option<String>,
    },
    Connected {
        device_id: String,
    },
    Disconnected {
        device_id: String,
    },
    CharacteristicUpdated {
        uuid: String,
        value: Vec<u8>,
    },
}

/// BLE transport contract. Calls are non-blocking requests; outcomes arrive
/// as [`LinkEvent`]s on the channel the link was constructed with. Read
/// results come back as `CharacteristicUpdated`, same as notifications.
pub trait DeviceLink: Send {
    fn start_scan(&mut self) -> Result<(), FloatlinkError>;
    fn stop_scan(&mut self) -> Result<(), FloatlinkError>;
    fn connect(&mut self, device_id: &str) -> Result<(), FloatlinkError>;
    fn disconnect(&mut self) -> Result<(), FloatlinkError>;
    /// Enable notifications for rapidly-changing characteristics.
    fn subscribe(&mut self, characteristics: &[Characteristic]) -> Result<(), FloatlinkError>;
    /// Request a one-shot read of a slow characteristic.
    fn read_characteristic(&mut self, characteristic: Characteristic) -> Result<(), FloatlinkError>;
    fn write_characteristic(
        &mut self,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<(), FloatlinkError>;
}
