// Library interface for floatlink
// This allows integration tests to access internal modules

pub mod alerts;
pub mod config;
pub mod connection;
pub mod errors;
pub mod link;
pub mod persistence;
pub mod telemetry;

// Re-export commonly used types
pub use alerts::{Alert, AlertQueue, AlertSink, CancelableAlertThrottler, Priority};
pub use config::AlertConfig;
pub use connection::{ConnectionController, ConnectionListener, ConnectionState};
pub use errors::FloatlinkError;
pub use link::{DeviceLink, LinkEvent, SimulatedLink};
pub use persistence::{JsonlStateStore, PersistenceBatcher, RideStats, StateStore};
pub use telemetry::{BenchmarkMonitor, SpeedMonitor, StateChange, StateUpdate, VehicleState};
