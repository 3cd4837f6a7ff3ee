pub(crate) mod benchmark_monitor;
pub(crate) mod decoder;
pub(crate) mod speed_monitor;

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

pub use benchmark_monitor::BenchmarkMonitor;
pub use decoder::{decode_notification, encode_lights, Characteristic, OdometerTracker, SERVICE_UUID};
pub use speed_monitor::SpeedMonitor;

/// Eight independent flags packed into the status characteristic byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlags {
    pub rider_present: bool,
    pub foot_pad1: bool,
    pub foot_pad2: bool,
    pub icsu_fault: bool,
    pub icsv_fault: bool,
    pub charging: bool,
    pub bms_ctrl_comms: bool,
    pub broken_capacitor: bool,
}

/// One decoded characteristic notification. Carries only the fields the
/// notifying characteristic actually reported.
#[derive(Clone, Debug, PartialEq)]
pub enum StateUpdate {
    Status(StatusFlags),
    Rpm(i16),
    SafetyHeadroom(u8),
    BatteryLevel(u8),
    Temperature { controller_c: u8, motor_c: u8 },
    LastError { code: u8, value: u8 },
    TripOdometer(u16),
    BatteryVoltage(u16),
}

/// Immutable snapshot of everything we know about the board. A new snapshot
/// is produced on every decoded update; fields the update does not carry are
/// copied forward from the previous snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VehicleState {
    pub time: SystemTime,
    pub rider_present: bool,
    pub foot_pad1: bool,
    pub foot_pad2: bool,
    pub icsu_fault: bool,
    pub icsv_fault: bool,
    pub charging: bool,
    pub bms_ctrl_comms: bool,
    pub broken_capacitor: bool,
    pub rpm: i16,
    pub safety_headroom: u8,
    pub battery_level: u8,
    pub motor_temp: u8,
    pub controller_temp: u8,
    pub last_error_code: u8,
    pub last_error_value: u8,
    /// Deci-volts as reported on the wire; see [`VehicleState::voltage`].
    pub battery_voltage: u16,
    /// Raw device-side trip counter (revolutions); cumulative distance lives
    /// in [`crate::persistence::RideStats`].
    pub trip_odometer: u16,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            time: SystemTime::UNIX_EPOCH,
            rider_present: false,
            foot_pad1: false,
            foot_pad2: false,
            icsu_fault: false,
            icsv_fault: false,
            charging: false,
            bms_ctrl_comms: false,
            broken_capacitor: false,
            rpm: 0,
            safety_headroom: 100,
            battery_level: 0,
            motor_temp: 0,
            controller_temp: 0,
            last_error_code: 0,
            last_error_value: 0,
            battery_voltage: 0,
            trip_odometer: 0,
        }
    }
}

impl VehicleState {
    /// Partial-update merge: every field not carried by `update` keeps its
    /// previous value. The snapshot timestamp is always refreshed.
    pub fn merged(&self, update: &StateUpdate, time: SystemTime) -> VehicleState {
        let mut next = self.clone();
        next.time = time;
        match *update {
            StateUpdate::Status(flags) => {
                next.rider_present = flags.rider_present;
                next.foot_pad1 = flags.foot_pad1;
                next.foot_pad2 = flags.foot_pad2;
                next.icsu_fault = flags.icsu_fault;
                next.icsv_fault = flags.icsv_fault;
                next.charging = flags.charging;
                next.bms_ctrl_comms = flags.bms_ctrl_comms;
                next.broken_capacitor = flags.broken_capacitor;
            }
            StateUpdate::Rpm(rpm) => next.rpm = rpm,
            StateUpdate::SafetyHeadroom(sh) => next.safety_headroom = sh,
            StateUpdate::BatteryLevel(level) => next.battery_level = level,
            StateUpdate::Temperature {
                controller_c,
                motor_c,
            } => {
                next.controller_temp = controller_c;
                next.motor_temp = motor_c;
            }
            StateUpdate::LastError { code, value } => {
                next.last_error_code = code;
                next.last_error_value = value;
            }
            StateUpdate::TripOdometer(trip) => next.trip_odometer = trip,
            StateUpdate::BatteryVoltage(dv) => next.battery_voltage = dv,
        }
        next
    }

    pub fn mph(&self) -> f64 {
        rpm_to_mph(self.rpm as f64)
    }

    pub fn kph(&self) -> f64 {
        rpm_to_kmph(self.rpm as f64)
    }

    pub fn voltage(&self) -> f64 {
        self.battery_voltage as f64 / 10.0
    }

    pub fn last_error_description(&self) -> String {
        format!(
            "{} {}",
            error_code_description(self.last_error_code),
            self.last_error_value
        )
    }

    /// Moving with a rider detected but neither foot pad triggered. The
    /// board cuts motor power roughly 500 ms after this becomes true, so it
    /// is the earliest signal we get for a dismount in motion.
    pub fn feet_off_during_motion(&self) -> bool {
        self.rpm > 0 && !self.foot_pad1 && !self.foot_pad2 && self.rider_present
    }

    /// Typed change events for every field that differs from `prev`.
    /// Alert dispatch keys off these rather than the rendered text.
    pub fn diff(&self, prev: &VehicleState) -> Vec<StateChange> {
        let mut changes = Vec::new();
        if prev.rider_present != self.rider_present {
            changes.push(StateChange::RiderPresent(self.rider_present));
        }
        if prev.foot_pad1 != self.foot_pad1 {
            changes.push(StateChange::FootPad1(self.foot_pad1));
        }
        if prev.foot_pad2 != self.foot_pad2 {
            changes.push(StateChange::FootPad2(self.foot_pad2));
        }
        if prev.icsu_fault != self.icsu_fault {
            changes.push(StateChange::FaultU(self.icsu_fault));
        }
        if prev.icsv_fault != self.icsv_fault {
            changes.push(StateChange::FaultV(self.icsv_fault));
        }
        if prev.charging != self.charging {
            changes.push(StateChange::Charging(self.charging));
        }
        if prev.bms_ctrl_comms != self.bms_ctrl_comms {
            changes.push(StateChange::CtrlComms(self.bms_ctrl_comms));
        }
        if prev.broken_capacitor != self.broken_capacitor {
            changes.push(StateChange::BrokenCapacitor(self.broken_capacitor));
        }
        if prev.rpm != self.rpm {
            changes.push(StateChange::Speed { mph: self.mph() });
        }
        if prev.safety_headroom != self.safety_headroom {
            changes.push(StateChange::SafetyHeadroom(self.safety_headroom));
        }
        if prev.battery_level != self.battery_level {
            changes.push(StateChange::BatteryLevel(self.battery_level));
        }
        if prev.motor_temp != self.motor_temp {
            changes.push(StateChange::MotorTemp(self.motor_temp));
        }
        if prev.controller_temp != self.controller_temp {
            changes.push(StateChange::ControllerTemp(self.controller_temp));
        }
        if prev.last_error_code != self.last_error_code {
            changes.push(StateChange::LastError {
                code: self.last_error_code,
                value: self.last_error_value,
            });
        }
        if prev.battery_voltage != self.battery_voltage {
            changes.push(StateChange::BatteryVoltage {
                volts: self.voltage(),
            });
        }
        changes
    }

    /// Human-readable delta, one short clause per changed field. This is the
    /// spoken message body; control flow never parses it back.
    pub fn describe_delta(&self, prev: &VehicleState, is_goofy: bool, is_metric: bool) -> String {
        let mut description = String::new();
        for change in self.diff(prev) {
            description.push_str(&change.describe(self, is_goofy, is_metric));
        }
        description
    }
}

/// A single field transition between two consecutive snapshots.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    RiderPresent(bool),
    FootPad1(bool),
    FootPad2(bool),
    FaultU(bool),
    FaultV(bool),
    Charging(bool),
    CtrlComms(bool),
    BrokenCapacitor(bool),
    Speed { mph: f64 },
    SafetyHeadroom(u8),
    BatteryLevel(u8),
    MotorTemp(u8),
    ControllerTemp(u8),
    LastError { code: u8, value: u8 },
    BatteryVoltage { volts: f64 },
}

fn on_off(on: bool) -> &'static str {
    if on {
        "On"
    } else {
        "Off"
    }
}

impl StateChange {
    /// Short spoken clause for this change, trailing space included so
    /// clauses concatenate into a sentence list.
    pub fn describe(&self, state: &VehicleState, is_goofy: bool, is_metric: bool) -> String {
        match *self {
            StateChange::RiderPresent(on) => format!("Rider {}. ", on_off(on)),
            // Pad 1 is under the toes for a regular stance, under the heel
            // when riding goofy
            StateChange::FootPad1(on) => {
                format!("{} {}. ", if is_goofy { "Heel" } else { "Toe" }, on_off(on))
            }
            StateChange::FootPad2(on) => {
                format!("{} {}. ", if is_goofy { "Toe" } else { "Heel" }, on_off(on))
            }
            StateChange::FaultU(on) => format!("U Fault {}. ", on_off(on)),
            StateChange::FaultV(on) => format!("V Fault {}. ", on_off(on)),
            StateChange::Charging(on) => format!("Charging {}. ", on_off(on)),
            StateChange::CtrlComms(on) => format!("Ctl Comms {}. ", on_off(on)),
            StateChange::BrokenCapacitor(on) => format!("Broken Capacitor {}. ", on_off(on)),
            StateChange::Speed { .. } => {
                let speed = if is_metric { state.kph() } else { state.mph() };
                format!("Speed {:.1}. ", speed)
            }
            StateChange::SafetyHeadroom(sh) => format!("Headroom {}. ", sh),
            StateChange::BatteryLevel(level) => format!("Battery {}. ", level),
            StateChange::MotorTemp(t) => format!("Motor Temp {}. ", t),
            StateChange::ControllerTemp(t) => format!("Controller Temp {}. ", t),
            StateChange::LastError { .. } => {
                format!("Last Error {}. ", state.last_error_description())
            }
            StateChange::BatteryVoltage { volts } => format!("Voltage {}. ", volts),
        }
    }
}

// 35" wheel circumference; 63360 inches per mile, 39370.1 inches per km
pub fn rpm_to_mph(rpm: f64) -> f64 {
    60.0 * (35.0 * rpm) / 63360.0
}

pub fn rpm_to_kmph(rpm: f64) -> f64 {
    60.0 * (35.0 * rpm) / 39370.1
}

pub fn revolutions_to_miles(revolutions: f64) -> f64 {
    (revolutions * 35.0) / 63360.0
}

pub fn revolutions_to_kilometers(revolutions: f64) -> f64 {
    (revolutions * 35.0) / 39370.1
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    (9.0 / 5.0) * celsius + 32.0
}

pub fn error_code_description(code: u8) -> &'static str {
    match code {
        0 => "None",
        1 => "BmsLowBattery",
        2 => "VoltageLow",
        3 => "VoltageHigh",
        4 => "FallDetected",
        5 => "PickupDetected",
        6 => "OverCurrentDetected",
        7 => "OverTemperature",
        8 => "BadGyro",
        9 => "BadAccelerometer",
        10 => "BadCurrentSensor",
        11 => "BadHallSensors",
        12 => "BadMotor",
        13 => "Overcurrent13",
        14 => "Overcurrent14",
        15 => "BadRiderDetectZone",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_rpm(rpm: i16) -> VehicleState {
        VehicleState {
            rpm,
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_copies_unmentioned_fields() {
        let prev = VehicleState {
            rider_present: true,
            battery_level: 72,
            safety_headroom: 80,
            rpm: 500,
            ..Default::default()
        };
        let now = SystemTime::now();
        let next = prev.merged(&StateUpdate::Rpm(600), now);
        assert_eq!(next.rpm, 600);
        assert_eq!(next.time, now);
        assert!(next.rider_present);
        assert_eq!(next.battery_level, 72);
        assert_eq!(next.safety_headroom, 80);
    }

    #[test]
    fn test_merge_status_replaces_all_flags() {
        let prev = VehicleState {
            rider_present: true,
            foot_pad1: true,
            foot_pad2: true,
            rpm: 300,
            ..Default::default()
        };
        let flags = StatusFlags {
            rider_present: true,
            foot_pad1: false,
            foot_pad2: true,
            ..Default::default()
        };
        let next = prev.merged(&StateUpdate::Status(flags), SystemTime::now());
        assert!(!next.foot_pad1);
        assert!(next.foot_pad2);
        // rpm not carried by the status characteristic
        assert_eq!(next.rpm, 300);
    }

    #[test]
    fn test_describe_delta_concatenates_changed_clauses() {
        let prev = VehicleState::default();
        let mut next = prev.clone();
        next.rider_present = true;
        next.battery_level = 90;
        let description = next.describe_delta(&prev, false, false);
        assert_eq!(description, "Rider On. Battery 90. ");
    }

    #[test]
    fn test_describe_delta_goofy_swaps_pads() {
        let prev = VehicleState::default();
        let mut next = prev.clone();
        next.foot_pad1 = true;
        assert_eq!(next.describe_delta(&prev, false, false), "Toe On. ");
        assert_eq!(next.describe_delta(&prev, true, false), "Heel On. ");
    }

    #[test]
    fn test_speed_clause_formatting() {
        let prev = VehicleState::default();
        // 60 * 35 * 422 / 63360 = 13.99...
        let next = prev.merged(&StateUpdate::Rpm(423), SystemTime::now());
        let description = next.describe_delta(&prev, false, false);
        assert_eq!(description, "Speed 14.0. ");
    }

    #[test]
    fn test_feet_off_during_motion() {
        let mut state = state_with_rpm(100);
        state.rider_present = true;
        assert!(state.feet_off_during_motion());
        state.foot_pad1 = true;
        assert!(!state.feet_off_during_motion());
        state.foot_pad1 = false;
        state.rpm = 0;
        assert!(!state.feet_off_during_motion());
    }

    #[test]
    fn test_error_description() {
        let mut state = VehicleState::default();
        state.last_error_code = 4;
        state.last_error_value = 2;
        assert_eq!(state.last_error_description(), "FallDetected 2");
        state.last_error_code = 200;
        assert_eq!(state.last_error_description(), "Unknown 2");
    }

    #[test]
    fn test_unit_conversions() {
        assert!((rpm_to_mph(423.0) - 14.0).abs() < 0.05);
        assert!((rpm_to_kmph(423.0) - 22.6).abs() < 0.05);
        assert!((revolutions_to_miles(63360.0 / 35.0) - 1.0).abs() < 1e-9);
        assert!((celsius_to_fahrenheit(100.0) - 212.0).abs() < 1e-9);
    }

    #[test]
    fn test_diff_reports_typed_changes() {
        let prev = VehicleState::default();
        let mut next = prev.clone();
        next.foot_pad2 = true;
        next.safety_headroom = 90;
        let changes = next.diff(&prev);
        assert_eq!(
            changes,
            vec![
                StateChange::FootPad2(true),
                StateChange::SafetyHeadroom(90)
            ]
        );
    }
}
