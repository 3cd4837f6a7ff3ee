use itertools::Itertools;
use log::debug;

/// Discretizes a continuous value against a descending threshold list and
/// reports crossings, with hysteresis against flapping at a boundary.
///
/// `last_index == benchmarks.len()` means the value is below every
/// threshold. The hysteresis is asymmetric: it only suppresses reverting to
/// the benchmark we just left, so a fresh crossing is always reported but a
/// bounce across one boundary is not reported twice.
pub struct BenchmarkMonitor {
    benchmarks: Vec<f64>,
    hysteresis: f64,
    last_idx: usize,
    last_last_idx: usize,
}

impl BenchmarkMonitor {
    pub fn new(benchmarks: Vec<f64>, hysteresis: f64) -> Self {
        let benchmarks: Vec<f64> = benchmarks
            .into_iter()
            .sorted_by(|a, b| b.partial_cmp(a).unwrap())
            .collect();
        let below_all = benchmarks.len();
        Self {
            benchmarks,
            hysteresis,
            last_idx: below_all,
            last_last_idx: below_all,
        }
    }

    pub fn last_index(&self) -> usize {
        self.last_idx
    }

    pub fn last_last_index(&self) -> usize {
        self.last_last_idx
    }

    pub fn benchmark_count(&self) -> usize {
        self.benchmarks.len()
    }

    /// Returns true when `value` lands in a different benchmark band than
    /// the previous call. Indices only move through here.
    pub fn passed_benchmark(&mut self, value: f64) -> bool {
        let new_idx = self
            .benchmarks
            .iter()
            .position(|benchmark| value >= *benchmark)
            .unwrap_or(self.benchmarks.len());

        // Suppress a revert to the benchmark we just left while the value
        // still hugs the boundary. State is left untouched so a genuine
        // move past the margin reports normally.
        if new_idx == self.last_last_idx && !self.benchmarks.is_empty() {
            let boundary = self.benchmarks[self.last_idx.min(self.benchmarks.len() - 1)];
            if (boundary - value).abs() < self.hysteresis {
                debug!(
                    "Suppressed benchmark revert to idx {} at value {}",
                    new_idx, value
                );
                return false;
            }
        }

        let is_new = new_idx != self.last_idx;
        self.last_last_idx = self.last_idx;
        self.last_idx = new_idx;
        is_new
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hysteresis_sequence() {
        let mut monitor = BenchmarkMonitor::new(vec![3.0, 2.0, 1.0], 0.5);
        let below_all = monitor.benchmark_count();

        assert!(!monitor.passed_benchmark(0.0));
        assert_eq!(monitor.last_index(), below_all);
        assert_eq!(monitor.last_last_index(), below_all);

        assert!(!monitor.passed_benchmark(0.9));
        assert_eq!(monitor.last_index(), below_all);
        assert_eq!(monitor.last_last_index(), below_all);

        assert!(monitor.passed_benchmark(1.0));
        assert_eq!(monitor.last_index(), 2);
        assert_eq!(monitor.last_last_index(), below_all);

        // 0.1 below the 1.0 benchmark, inside hysteresis
        assert!(!monitor.passed_benchmark(0.9));
        assert_eq!(monitor.last_index(), 2);
        assert_eq!(monitor.last_last_index(), below_all);

        // 0.6 below the 1.0 benchmark, outside hysteresis
        assert!(monitor.passed_benchmark(0.4));
        assert_eq!(monitor.last_index(), below_all);
        assert_eq!(monitor.last_last_index(), 2);

        // 0.1 above the 1.0 benchmark, inside hysteresis
        assert!(!monitor.passed_benchmark(1.1));
        assert_eq!(monitor.last_index(), below_all);
        assert_eq!(monitor.last_last_index(), 2);

        // 0.5 above the 1.0 benchmark, outside hysteresis
        assert!(monitor.passed_benchmark(1.5));
        assert_eq!(monitor.last_index(), 2);
        assert_eq!(monitor.last_last_index(), below_all);
    }

    #[test]
    fn test_benchmarks_sorted_descending_internally() {
        let mut monitor = BenchmarkMonitor::new(vec![1.0, 3.0, 2.0], 0.0);
        assert!(monitor.passed_benchmark(2.5));
        // 2.5 passes the 2.0 benchmark at index 1 of [3, 2, 1]
        assert_eq!(monitor.last_index(), 1);
    }

    #[test]
    fn test_crossing_multiple_benchmarks_reports_once() {
        let mut monitor = BenchmarkMonitor::new(vec![3.0, 2.0, 1.0], 0.5);
        assert!(monitor.passed_benchmark(3.5));
        assert_eq!(monitor.last_index(), 0);
        assert!(!monitor.passed_benchmark(3.6));
    }

    #[test]
    fn test_empty_benchmark_list_never_reports() {
        let mut monitor = BenchmarkMonitor::new(vec![], 0.5);
        assert!(!monitor.passed_benchmark(10.0));
        assert!(!monitor.passed_benchmark(0.0));
    }
}
