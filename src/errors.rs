// Error types for floatlink

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum FloatlinkError {
    // Errors while decoding characteristic notifications
    #[snafu(display("Characteristic {characteristic} payload too short: {len} bytes"))]
    ShortPayload { characteristic: String, len: usize },
    #[snafu(display("Characteristic {characteristic} value {value} out of range"))]
    ValueOutOfRange { characteristic: String, value: i32 },
    #[snafu(display("Notification for unknown characteristic {uuid}"))]
    UnknownCharacteristic { uuid: String },

    // Errors for the device link
    #[snafu(display("Device link error: {description}"))]
    DeviceLinkError { description: String },
    #[snafu(display("Link event channel closed"))]
    LinkChannelClosed,

    // Errors for the state store
    #[snafu(display("Error writing ride state"))]
    StorageError { source: io::Error },
    #[snafu(display("Error serializing ride state"))]
    StorageSerializeError { source: serde_json::Error },
    #[snafu(display("Persistence worker is no longer running"))]
    PersistenceWorkerGone,

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // Replay errors
    #[snafu(display("Invalid ride log file: {path}"))]
    InvalidRideLog { path: String },
    #[snafu(display("Error loading ride log file"))]
    RideLogLoaderError { source: io::Error },
}
