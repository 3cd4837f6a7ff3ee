use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use log::{debug, info, warn};

use crate::alerts::{Alert, AlertQueue, AlertSink, CancelableAlertThrottler, Priority};
use crate::config::AlertConfig;
use crate::errors::FloatlinkError;
use crate::link::{DeviceLink, LinkEvent};
use crate::persistence::{LocalData, LocalDataStore, PersistenceBatcher, StateStore};
use crate::telemetry::decoder::{decode_notification, encode_lights, Characteristic};
use crate::telemetry::{
    revolutions_to_kilometers, revolutions_to_miles, BenchmarkMonitor, OdometerTracker,
    SpeedMonitor, StateChange, StateUpdate, VehicleState,
};

/// How often the slow characteristics (temperature, odometer, voltage) get
/// polled, piggybacked on RPM notifications.
const SLOW_POLL_INTERVAL: Duration = Duration::from_secs(10);
const EVENT_POLL: Duration = Duration::from_millis(250);

const BATTERY_BENCHMARKS_PCT: [f64; 9] = [90.0, 80.0, 70.0, 60.0, 50.0, 40.0, 30.0, 20.0, 10.0];
const BATTERY_HYSTERESIS_PCT: f64 = 1.0;
const LOW_BATTERY_PCT: u8 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Connecting,
    Connected,
    Disconnected,
}

/// Session lifecycle events, consumed by the UI layer.
pub trait ConnectionListener: Send {
    fn on_connected(&self, device_id: &str);
    fn on_disconnected(&self, device_id: &str);
}

/// Cloneable handle to request a running controller to stop.
#[derive(Clone)]
pub struct ControllerHandle {
    desired: Arc<AtomicBool>,
}

impl ControllerHandle {
    pub fn stop(&self) {
        self.desired.store(false, Ordering::SeqCst);
    }
}

/// Owns the device session end to end: drives the link state machine,
/// decodes notifications into state snapshots, and fans the resulting
/// changes out to alerts and persistence.
///
/// Runs single-threaded over the link event channel; decode and merge are
/// cheap enough to do inline, while alert playback and storage writes
/// happen on their own contexts and never block this loop.
pub struct ConnectionController {
    link: Box<dyn DeviceLink>,
    events: Receiver<LinkEvent>,
    config: AlertConfig,
    queue: AlertQueue,
    throttler: CancelableAlertThrottler,
    batcher: PersistenceBatcher,
    local_store: LocalDataStore,
    local: LocalData,
    listener: Option<Box<dyn ConnectionListener>>,
    state: ConnectionState,
    last_state: VehicleState,
    speed_monitor: SpeedMonitor,
    battery_monitor: BenchmarkMonitor,
    odometer: OdometerTracker,
    last_slow_poll: Option<Instant>,
    desired: Arc<AtomicBool>,
}

impl ConnectionController {
    pub fn new(
        link: Box<dyn DeviceLink>,
        events: Receiver<LinkEvent>,
        config: AlertConfig,
        sink: Arc<dyn AlertSink>,
        store: Box<dyn StateStore>,
        local_store: LocalDataStore,
    ) -> Self {
        let local = local_store.load();
        let odometer = OdometerTracker::with_offset(local.stats.trip_offset);
        Self {
            link,
            events,
            config,
            queue: AlertQueue::new(sink),
            throttler: CancelableAlertThrottler::default(),
            batcher: PersistenceBatcher::new(store),
            local_store,
            local,
            listener: None,
            state: ConnectionState::Idle,
            last_state: VehicleState::default(),
            speed_monitor: SpeedMonitor::default(),
            battery_monitor: BenchmarkMonitor::new(
                BATTERY_BENCHMARKS_PCT.to_vec(),
                BATTERY_HYSTERESIS_PCT,
            ),
            odometer,
            last_slow_poll: None,
            desired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_listener(mut self, listener: Box<dyn ConnectionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            desired: Arc::clone(&self.desired),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn last_state(&self) -> &VehicleState {
        &self.last_state
    }

    /// Forget the paired board so the next session scans fresh.
    pub fn unpair(&mut self) {
        self.local.primary_device_id = None;
        self.save_local();
    }

    /// The app moving out of or into the foreground only affects how
    /// persistence batches its writes.
    pub fn set_background(&self, backgrounded: bool) {
        if let Err(e) = self.batcher.set_background(backgrounded) {
            warn!("Could not switch persistence mode: {}", e);
        }
    }

    /// Drive the session until [`ControllerHandle::stop`] is called or the
    /// link event channel closes.
    pub fn run(&mut self) -> Result<(), FloatlinkError> {
        self.desired.store(true, Ordering::SeqCst);
        self.start_session()?;
        loop {
            if !self.desired.load(Ordering::SeqCst) {
                self.shutdown();
                return Ok(());
            }
            match self.events.recv_timeout(EVENT_POLL) {
                Ok(event) => self.handle_event(event)?,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    self.shutdown();
                    return Err(FloatlinkError::LinkChannelClosed);
                }
            }
        }
    }

    fn start_session(&mut self) -> Result<(), FloatlinkError> {
        if let Some(device_id) = self.local.primary_device_id.clone() {
            info!("Connecting to known device {}", device_id);
            self.state = ConnectionState::Connecting;
            self.link.connect(&device_id)
        } else {
            info!("Scanning for devices");
            self.state = ConnectionState::Scanning;
            self.link.start_scan()
        }
    }

    fn shutdown(&mut self) {
        info!("Stopping session");
        if matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Connecting | ConnectionState::Scanning
        ) {
            let _ = self.link.stop_scan();
            let _ = self.link.disconnect();
        }
        if let Err(e) = self.batcher.flush() {
            warn!("Could not flush persistence backlog: {}", e);
        }
        self.save_local();
        self.state = ConnectionState::Idle;
    }

    fn handle_event(&mut self, event: LinkEvent) -> Result<(), FloatlinkError> {
        match event {
            LinkEvent::Discovered { device_id, name } => {
                if self.state != ConnectionState::Scanning {
                    debug!("Ignoring discovery of {} while not scanning", device_id);
                    return Ok(());
                }
                info!(
                    "Discovered {} ({})",
                    device_id,
                    name.as_deref().unwrap_or("no name")
                );
                self.link.stop_scan()?;
                self.local.primary_device_id = Some(device_id.clone());
                self.save_local();
                self.state = ConnectionState::Connecting;
                self.link.connect(&device_id)
            }
            LinkEvent::Connected { device_id } => self.handle_connected(&device_id),
            LinkEvent::Disconnected { device_id } => self.handle_disconnected(&device_id),
            LinkEvent::CharacteristicUpdated { uuid, value } => {
                self.handle_notification(&uuid, &value);
                Ok(())
            }
        }
    }

    fn handle_connected(&mut self, device_id: &str) -> Result<(), FloatlinkError> {
        info!("Connected to {}", device_id);
        self.state = ConnectionState::Connected;
        self.link.subscribe(Characteristic::subscribed())?;
        for characteristic in Characteristic::polled() {
            self.link.read_characteristic(*characteristic)?;
        }
        self.last_slow_poll = Some(Instant::now());
        if self.config.auto_lights {
            self.link
                .write_characteristic(Characteristic::Lights, &encode_lights(true))?;
        }
        if self.alerts_enabled(self.config.connection_alerts) {
            self.queue
                .enqueue(Alert::low("Connected. ").with_key("conn"));
        }
        if let Some(listener) = &self.listener {
            listener.on_connected(device_id);
        }
        Ok(())
    }

    fn handle_disconnected(&mut self, device_id: &str) -> Result<(), FloatlinkError> {
        info!("Disconnected from {}", device_id);
        self.state = ConnectionState::Disconnected;
        if let Err(e) = self.batcher.flush() {
            warn!("Could not flush persistence backlog: {}", e);
        }
        self.save_local();
        if self.alerts_enabled(self.config.connection_alerts) {
            self.queue
                .enqueue(Alert::low("Disconnected. ").with_key("conn"));
        }
        if let Some(listener) = &self.listener {
            listener.on_disconnected(device_id);
        }
        // Session still desired: get back on the board
        if self.desired.load(Ordering::SeqCst) {
            self.start_session()?;
        }
        Ok(())
    }

    fn handle_notification(&mut self, uuid: &str, value: &[u8]) {
        let Some(characteristic) = Characteristic::from_uuid(uuid) else {
            warn!("Notification for unknown characteristic {}", uuid);
            return;
        };
        let update = match decode_notification(characteristic, value) {
            Ok(update) => update,
            // Recoverable: the next notification supersedes this one
            Err(e) => {
                warn!("Dropped {} update: {}", characteristic, e);
                return;
            }
        };
        let new_state = self.last_state.merged(&update, SystemTime::now());
        let changes = new_state.diff(&self.last_state);
        let was_feet_off = self.last_state.feet_off_during_motion();

        self.track_ride_stats(&update, &new_state);
        self.dispatch_alerts(&changes, &new_state, was_feet_off);

        if let Err(e) = self.batcher.write(new_state.clone()) {
            warn!("Dropped state write: {}", e);
        }
        self.last_state = new_state;

        if matches!(update, StateUpdate::Rpm(_)) {
            self.maybe_poll_slow();
        }
    }

    fn track_ride_stats(&mut self, update: &StateUpdate, new_state: &VehicleState) {
        if new_state.rpm > self.local.stats.max_rpm {
            self.local.stats.max_rpm = new_state.rpm;
            self.local.stats.max_rpm_time = Some(new_state.time);
        }
        match *update {
            StateUpdate::BatteryLevel(level) => self.local.stats.last_battery_level = level,
            StateUpdate::TripOdometer(trip) => {
                let added = self.odometer.advance(trip);
                if added > 0 {
                    self.local.stats.odometer_revolutions += added as u64;
                }
                self.local.stats.trip_offset = self.odometer.offset();
                self.announce_mileage();
                self.save_local();
            }
            _ => {}
        }
    }

    fn announce_mileage(&mut self) {
        let revolutions = self.local.stats.odometer_revolutions as f64;
        let distance = if self.config.is_metric {
            revolutions_to_kilometers(revolutions)
        } else {
            revolutions_to_miles(revolutions)
        };
        let whole = distance.floor() as u64;
        if whole > self.local.stats.last_announced_mile {
            self.local.stats.last_announced_mile = whole;
            if self.alerts_enabled(self.config.mileage_alerts) {
                let unit = if self.config.is_metric {
                    "Kilometer"
                } else {
                    "Mile"
                };
                self.queue.enqueue(
                    Alert::low(format!("{} {}. ", unit, whole))
                        .with_key("mile")
                        .with_short_message(format!("{}", whole)),
                );
            }
        }
    }

    fn dispatch_alerts(&mut self, changes: &[StateChange], new_state: &VehicleState, was_feet_off: bool) {
        if !self.config.audio_alerts {
            return;
        }
        for change in changes {
            match *change {
                StateChange::RiderPresent(_) if self.config.foot_alerts => {
                    self.queue.enqueue(
                        Alert::high(change.describe(new_state, self.config.is_goofy, self.config.is_metric))
                            .with_key("rider"),
                    );
                }
                StateChange::FootPad1(on) if self.config.foot_alerts => {
                    self.pad_alert("pad1", on, change, new_state);
                }
                StateChange::FootPad2(on) if self.config.foot_alerts => {
                    self.pad_alert("pad2", on, change, new_state);
                }
                StateChange::Speed { mph } if self.config.speed_alerts => {
                    if self.speed_monitor.passed_benchmark(mph) {
                        let spoken = format!(
                            "{:.1}",
                            if self.config.is_metric {
                                new_state.kph()
                            } else {
                                new_state.mph()
                            }
                        );
                        self.queue.enqueue(
                            Alert::low(format!("Speed {}. ", spoken))
                                .with_key("speed")
                                .with_short_message(spoken),
                        );
                    }
                }
                StateChange::BatteryLevel(level) if self.config.battery_alerts => {
                    if self.battery_monitor.passed_benchmark(level as f64) {
                        let priority = if level <= LOW_BATTERY_PCT {
                            Priority::High
                        } else {
                            Priority::Low
                        };
                        self.queue.enqueue(Alert {
                            priority,
                            message: format!("Battery {}. ", level),
                            short_message: Some(format!("{}", level)),
                            key: Some("batt".to_string()),
                        });
                    }
                }
                StateChange::SafetyHeadroom(headroom) if headroom < 100 => {
                    self.queue.enqueue(
                        Alert::high(format!("Headroom {}. ", headroom)).with_key("headroom"),
                    );
                }
                StateChange::FaultU(_)
                | StateChange::FaultV(_)
                | StateChange::CtrlComms(_)
                | StateChange::BrokenCapacitor(_)
                | StateChange::Charging(_)
                | StateChange::LastError { .. } => {
                    self.queue.enqueue(Alert::high(change.describe(
                        new_state,
                        self.config.is_goofy,
                        self.config.is_metric,
                    )));
                }
                // temperature and voltage drift is not worth announcing
                _ => {}
            }
        }
        if self.config.foot_alerts && !was_feet_off && new_state.feet_off_during_motion() {
            // ~500 ms of real-world lead time before the board cuts power
            self.queue.enqueue(Alert::high("Feet Off. ").with_key("feet"));
        }
    }

    /// Pad flicker under a second gets debounced away; a pad coming back
    /// while an off-alert is still pending cancels it silently.
    fn pad_alert(&mut self, key: &str, on: bool, change: &StateChange, new_state: &VehicleState) {
        if new_state.rpm <= 0 {
            // mounting and dismounting at standstill is not worth a callout
            return;
        }
        let clause = change.describe(new_state, self.config.is_goofy, self.config.is_metric);
        if on {
            self.throttler
                .cancel_alert(key, &self.queue, Alert::low(clause).with_key(key));
        } else {
            self.throttler
                .schedule_alert(key, &self.queue, Alert::high(clause).with_key(key));
        }
    }

    fn maybe_poll_slow(&mut self) {
        let due = self
            .last_slow_poll
            .map(|at| at.elapsed() >= SLOW_POLL_INTERVAL)
            .unwrap_or(true);
        if !due || self.state != ConnectionState::Connected {
            return;
        }
        debug!("Polling slow characteristics");
        self.last_slow_poll = Some(Instant::now());
        for characteristic in Characteristic::polled() {
            if let Err(e) = self.link.read_characteristic(*characteristic) {
                warn!("Poll of {} failed: {}", characteristic, e);
            }
        }
    }

    fn alerts_enabled(&self, category: bool) -> bool {
        self.config.audio_alerts && category
    }

    fn save_local(&self) {
        if let Err(e) = self.local_store.save(&self.local) {
            warn!("Could not persist local data: {}", e);
        }
    }
}
