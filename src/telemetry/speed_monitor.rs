use std::time::Instant;

use log::debug;

use super::benchmark_monitor::BenchmarkMonitor;

// Trigger when passing through any of these benchmark speeds (mph)
pub(crate) const SPEED_BENCHMARKS_MPH: [f64; 17] = [
    10.0, 12.0, 14.0, 15.0, 16.0, 17.0, 18.0, 19.0, 20.0, 21.0, 22.0, 23.0, 24.0, 25.0, 26.0,
    27.0, 28.0,
];
pub(crate) const SPEED_HYSTERESIS_MPH: f64 = 1.0;

/// A wheel losing traction spins up far faster than the board can really
/// accelerate; ~31 mph/s is comfortably beyond rider-achievable.
const WHEEL_SLIP_ACCEL_MPH_PER_S: f64 = 31.3;

/// Speed benchmark monitor with wheel-slip suppression in front of the
/// generic crossing check. While a slip is suspected every check reports
/// false, so a spinning wheel cannot announce a fake top speed.
pub struct SpeedMonitor {
    monitor: BenchmarkMonitor,
    last_speed_mph: f64,
    last_update: Option<Instant>,
    slip_detected: bool,
}

impl Default for SpeedMonitor {
    fn default() -> Self {
        Self::new(SPEED_BENCHMARKS_MPH.to_vec(), SPEED_HYSTERESIS_MPH)
    }
}

impl SpeedMonitor {
    pub fn new(benchmarks_mph: Vec<f64>, hysteresis_mph: f64) -> Self {
        Self {
            monitor: BenchmarkMonitor::new(benchmarks_mph, hysteresis_mph),
            last_speed_mph: 0.0,
            last_update: None,
            slip_detected: false,
        }
    }

    pub fn slip_detected(&self) -> bool {
        self.slip_detected
    }

    pub fn passed_benchmark(&mut self, speed_mph: f64) -> bool {
        self.passed_benchmark_at(speed_mph, Instant::now())
    }

    /// Timestamped variant; `at` must not go backwards between calls.
    pub fn passed_benchmark_at(&mut self, speed_mph: f64, at: Instant) -> bool {
        if let Some(last_update) = self.last_update {
            let dt_s = at.duration_since(last_update).as_secs_f64();
            if dt_s > 0.0 {
                let accel = (speed_mph - self.last_speed_mph) / dt_s;
                if accel >= WHEEL_SLIP_ACCEL_MPH_PER_S && !self.slip_detected {
                    debug!("Wheel slip suspected: {:.1} mph/s", accel);
                    self.slip_detected = true;
                } else if self.slip_detected && accel <= -WHEEL_SLIP_ACCEL_MPH_PER_S {
                    debug!("Wheel slip cleared: {:.1} mph/s", accel);
                    self.slip_detected = false;
                }
            }
        }
        if speed_mph == 0.0 {
            self.slip_detected = false;
        }
        self.last_speed_mph = speed_mph;
        self.last_update = Some(at);

        if self.slip_detected {
            return false;
        }
        self.monitor.passed_benchmark(speed_mph)
    }
}
