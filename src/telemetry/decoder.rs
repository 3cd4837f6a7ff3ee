// Pure decoders for the board's GATT characteristic payloads.

use crate::errors::FloatlinkError;

use super::{StateUpdate, StatusFlags};

/// Characteristics we subscribe to or poll, with their wire payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Characteristic {
    /// 1 byte, 8 bit flags
    Status,
    /// i16 BE
    Rpm,
    /// u16 BE, fits a byte
    SafetyHeadroom,
    /// u16 BE, fits a byte
    BatteryLevel,
    /// byte 0 controller C, byte 1 motor C
    Temperature,
    /// byte 0 code, byte 1 code-specific value
    LastError,
    /// u16 BE device-side trip counter, revolutions
    TripOdometer,
    /// u16 BE deci-volts
    BatteryVoltage,
    /// u16 BE 0/1, write-only
    Lights,
}

pub const SERVICE_UUID: &str = "e659f300-ea98-11e3-ac10-0800200c9a66";

impl Characteristic {
    pub fn uuid(&self) -> &'static str {
        match self {
            Characteristic::Status => "e659f30f-ea98-11e3-ac10-0800200c9a66",
            Characteristic::Rpm => "e659f30b-ea98-11e3-ac10-0800200c9a66",
            Characteristic::SafetyHeadroom => "e659f317-ea98-11e3-ac10-0800200c9a66",
            Characteristic::BatteryLevel => "e659f303-ea98-11e3-ac10-0800200c9a66",
            Characteristic::Temperature => "e659f310-ea98-11e3-ac10-0800200c9a66",
            Characteristic::LastError => "e659f31c-ea98-11e3-ac10-0800200c9a66",
            Characteristic::TripOdometer => "e659f30a-ea98-11e3-ac10-0800200c9a66",
            Characteristic::BatteryVoltage => "e659f316-ea98-11e3-ac10-0800200c9a66",
            Characteristic::Lights => "e659f30c-ea98-11e3-ac10-0800200c9a66",
        }
    }

    pub fn from_uuid(uuid: &str) -> Option<Characteristic> {
        [
            Characteristic::Status,
            Characteristic::Rpm,
            Characteristic::SafetyHeadroom,
            Characteristic::BatteryLevel,
            Characteristic::Temperature,
            Characteristic::LastError,
            Characteristic::TripOdometer,
            Characteristic::BatteryVoltage,
            Characteristic::Lights,
        ]
        .into_iter()
        .find(|c| c.uuid().eq_ignore_ascii_case(uuid))
    }

    /// Characteristics that change rapidly and are worth a notification
    /// subscription. The rest are polled on an interval.
    pub fn subscribed() -> &'static [Characteristic] {
        &[
            Characteristic::Status,
            Characteristic::Rpm,
            Characteristic::SafetyHeadroom,
            Characteristic::BatteryLevel,
            Characteristic::LastError,
        ]
    }

    pub fn polled() -> &'static [Characteristic] {
        &[
            Characteristic::Temperature,
            Characteristic::TripOdometer,
            Characteristic::BatteryVoltage,
        ]
    }
}

impl std::fmt::Display for Characteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

fn require_len(
    characteristic: Characteristic,
    bytes: &[u8],
    len: usize,
) -> Result<(), FloatlinkError> {
    if bytes.len() < len {
        return Err(FloatlinkError::ShortPayload {
            characteristic: characteristic.to_string(),
            len: bytes.len(),
        });
    }
    Ok(())
}

fn decode_u16_be(characteristic: Characteristic, bytes: &[u8]) -> Result<u16, FloatlinkError> {
    require_len(characteristic, bytes, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// u16 on the wire but semantically a percentage; anything that does not fit
/// a byte is a protocol misread and gets rejected.
fn decode_byte_sized(characteristic: Characteristic, bytes: &[u8]) -> Result<u8, FloatlinkError> {
    let raw = decode_u16_be(characteristic, bytes)?;
    u8::try_from(raw).map_err(|_| FloatlinkError::ValueOutOfRange {
        characteristic: characteristic.to_string(),
        value: raw as i32,
    })
}

fn decode_status(byte: u8) -> StatusFlags {
    let bit = |n: u8| byte & (0x01 << n) != 0;
    StatusFlags {
        rider_present: bit(0),
        foot_pad1: bit(1),
        foot_pad2: bit(2),
        icsu_fault: bit(3),
        icsv_fault: bit(4),
        charging: bit(5),
        bms_ctrl_comms: bit(6),
        broken_capacitor: bit(7),
    }
}

/// Decode one characteristic notification into a typed partial update.
/// Stateless; a failed decode drops the notification and the next one
/// supersedes it.
pub fn decode_notification(
    characteristic: Characteristic,
    bytes: &[u8],
) -> Result<StateUpdate, FloatlinkError> {
    match characteristic {
        Characteristic::Status => {
            require_len(characteristic, bytes, 1)?;
            Ok(StateUpdate::Status(decode_status(bytes[0])))
        }
        Characteristic::Rpm => {
            require_len(characteristic, bytes, 2)?;
            Ok(StateUpdate::Rpm(i16::from_be_bytes([bytes[0], bytes[1]])))
        }
        Characteristic::SafetyHeadroom => Ok(StateUpdate::SafetyHeadroom(decode_byte_sized(
            characteristic,
            bytes,
        )?)),
        Characteristic::BatteryLevel => Ok(StateUpdate::BatteryLevel(decode_byte_sized(
            characteristic,
            bytes,
        )?)),
        Characteristic::Temperature => {
            require_len(characteristic, bytes, 2)?;
            Ok(StateUpdate::Temperature {
                controller_c: bytes[0],
                motor_c: bytes[1],
            })
        }
        Characteristic::LastError => {
            require_len(characteristic, bytes, 2)?;
            Ok(StateUpdate::LastError {
                code: bytes[0],
                value: bytes[1],
            })
        }
        Characteristic::TripOdometer => Ok(StateUpdate::TripOdometer(decode_u16_be(
            characteristic,
            bytes,
        )?)),
        Characteristic::BatteryVoltage => Ok(StateUpdate::BatteryVoltage(decode_u16_be(
            characteristic,
            bytes,
        )?)),
        Characteristic::Lights => Err(FloatlinkError::UnknownCharacteristic {
            uuid: characteristic.uuid().to_string(),
        }),
    }
}

/// Payload for the lights characteristic write.
pub fn encode_lights(on: bool) -> [u8; 2] {
    (on as u16).to_be_bytes()
}

/// Turns the device-side trip counter into cumulative revolutions.
///
/// The counter resets to near zero when the board power-cycles. A reading
/// below the stored offset is treated as a reset and the raw reading counts
/// as new distance. A reset that lands exactly on the previous reading is
/// indistinguishable from no movement; we accept that.
#[derive(Clone, Copy, Debug, Default)]
pub struct OdometerTracker {
    offset: u16,
}

impl OdometerTracker {
    pub fn with_offset(offset: u16) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> u16 {
        self.offset
    }

    /// Feed a trip reading; returns the revolutions to add to the
    /// cumulative ride counter.
    pub fn advance(&mut self, trip: u16) -> u32 {
        let added = if trip < self.offset {
            trip as u32
        } else {
            (trip - self.offset) as u32
        };
        self.offset = trip;
        added
    }
}
