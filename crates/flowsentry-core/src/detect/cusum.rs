//! One-sided cumulative-sum change detector.
//!
//! Tracks a slowly adapting EWMA mean over four aggregate features and
//! accumulates standardised deviations into positive and negative sums. The
//! drift constant makes the sums insensitive to small biases; an alarm
//! resets both sums so consecutive windows re-accumulate evidence.

use std::collections::HashSet;

use super::strict_majority;
use crate::{FlowWindow, WindowResult};

const N_FEATURES: usize = 4;
const DEFAULT_THRESHOLD: f64 = 5.0;
const DEFAULT_DRIFT: f64 = 0.5;

/// EWMA smoothing for the baseline mean; std is fixed at initialisation.
const ALPHA: f64 = 0.1;
const STD_FRACTION: f64 = 0.1;
const STD_FLOOR: f64 = 1.0;
const DEVIATION_CLAMP: f64 = 50.0;

/// CUSUM detector state for one worker.
#[derive(Debug, Clone)]
pub struct CusumDetector {
    threshold: f64,
    drift: f64,
    mean: [f64; N_FEATURES],
    std: [f64; N_FEATURES],
    sum_positive: f64,
    sum_negative: f64,
    initialized: bool,
}

impl CusumDetector {
    pub fn new(threshold: f64, drift: f64) -> Self {
        CusumDetector {
            threshold: if threshold > 0.0 {
                threshold
            } else {
                DEFAULT_THRESHOLD
            },
            drift: if drift > 0.0 { drift } else { DEFAULT_DRIFT },
            mean: [0.0; N_FEATURES],
            std: [STD_FLOOR; N_FEATURES],
            sum_positive: 0.0,
            sum_negative: 0.0,
            initialized: false,
        }
    }

    /// Aggregate features: mean packets/s, mean bytes/s, distinct source
    /// addresses and SYN flags per flow. Divisors use `flow_count + 1` so an
    /// empty window cannot divide by zero.
    fn extract_features(window: &FlowWindow) -> [f64; N_FEATURES] {
        let mut packet_rate = 0.0;
        let mut byte_rate = 0.0;
        let mut syn_flags = 0u64;
        let mut sources: HashSet<&str> = HashSet::new();
        for flow in &window.flows {
            packet_rate += flow.packets_per_sec;
            byte_rate += flow.bytes_per_sec;
            syn_flags += u64::from(flow.syn_count);
            if !flow.src_addr.is_empty() {
                sources.insert(&flow.src_addr);
            }
        }
        let divisor = window.flow_count() as f64 + 1.0;
        [
            packet_rate / divisor,
            byte_rate / divisor,
            sources.len() as f64,
            syn_flags as f64 / divisor,
        ]
    }

    /// Analyses one window. The first window only seeds the baseline and
    /// never alarms; afterwards both sums stay non-negative and reset to
    /// zero whenever the alarm fires.
    pub fn detect_window(&mut self, window: &FlowWindow) -> WindowResult {
        let mut result = WindowResult::for_window(window);
        if window.flows.is_empty() {
            return result;
        }

        let attacks = window.flows.iter().filter(|f| f.is_attack).count();
        result.ground_truth = strict_majority(attacks, window.flow_count());

        let features = Self::extract_features(window);
        if !self.initialized {
            for i in 0..N_FEATURES {
                self.mean[i] = features[i];
                self.std[i] = (features[i].abs() * STD_FRACTION).max(STD_FLOOR);
            }
            self.initialized = true;
            return result;
        }

        let mut deviation_sum = 0.0;
        for i in 0..N_FEATURES {
            self.mean[i] = ALPHA * features[i] + (1.0 - ALPHA) * self.mean[i];
            let std = self.std[i].max(1e-6);
            let deviation = (features[i] - self.mean[i]) / std;
            deviation_sum += deviation.clamp(-DEVIATION_CLAMP, DEVIATION_CLAMP);
        }
        let mean_deviation = deviation_sum / N_FEATURES as f64;

        self.sum_positive = (self.sum_positive + mean_deviation - self.drift).max(0.0);
        self.sum_negative = (self.sum_negative - mean_deviation - self.drift).max(0.0);

        result.cusum_positive = self.sum_positive;
        result.cusum_negative = self.sum_negative;
        result.cusum_score = self.sum_positive.max(self.sum_negative);
        result.cusum_pred = result.cusum_score > self.threshold;

        if result.cusum_pred {
            self.sum_positive = 0.0;
            self.sum_negative = 0.0;
            for flow in &window.flows {
                result.suspects.add(&flow.src_addr);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::CusumDetector;
    use crate::{FlowRecord, FlowWindow};

    fn rate_window(id: i64, packets_per_sec: f64, bytes_per_sec: f64, syn: u32) -> FlowWindow {
        let flows = (0..4)
            .map(|i| FlowRecord {
                src_addr: format!("172.16.0.{i}"),
                dst_addr: "8.8.8.8".to_string(),
                packets_per_sec,
                bytes_per_sec,
                syn_count: syn,
                ..FlowRecord::default()
            })
            .collect();
        FlowWindow {
            window_id: id,
            start_row: id * 4,
            end_row: id * 4 + 3,
            flows,
        }
    }

    #[test]
    fn first_window_initialises_without_alarming() {
        let mut cusum = CusumDetector::new(3.0, 0.5);
        let result = cusum.detect_window(&rate_window(0, 100.0, 1000.0, 1));
        assert!(!result.cusum_pred);
        assert_eq!(result.cusum_score, 0.0);
        assert!(cusum.initialized);
        assert!(cusum.std.iter().all(|&s| s >= 1.0));
    }

    #[test]
    fn sums_stay_non_negative() {
        let mut cusum = CusumDetector::new(3.0, 0.5);
        cusum.detect_window(&rate_window(0, 100.0, 1000.0, 1));
        for id in 1..20 {
            let result = cusum.detect_window(&rate_window(id, 100.0, 1000.0, 1));
            assert!(result.cusum_positive >= 0.0);
            assert!(result.cusum_negative >= 0.0);
        }
    }

    #[test]
    fn sustained_rate_shift_alarms_and_resets() {
        let mut cusum = CusumDetector::new(3.0, 0.5);
        cusum.detect_window(&rate_window(0, 100.0, 1000.0, 1));

        let mut alarm_window = None;
        for id in 1..=10 {
            let result = cusum.detect_window(&rate_window(id, 200.0, 2000.0, 2));
            if result.cusum_pred {
                alarm_window = Some((id, result));
                break;
            }
        }
        let (id, result) = alarm_window.expect("sustained shift should alarm");
        assert!(id <= 3, "alarm should fire within three windows, got {id}");
        assert!(result.cusum_score > 3.0);
        // Alarm resets the accumulated sums.
        assert_eq!(cusum.sum_positive, 0.0);
        assert_eq!(cusum.sum_negative, 0.0);
        // Every source of the alarming window is suspect.
        let addrs: Vec<&str> = result.suspects.entries().iter().map(|e| e.addr.as_str()).collect();
        assert_eq!(addrs, ["172.16.0.0", "172.16.0.1", "172.16.0.2", "172.16.0.3"]);
    }

    #[test]
    fn empty_window_is_inert() {
        let mut cusum = CusumDetector::new(3.0, 0.5);
        let window = FlowWindow::default();
        let result = cusum.detect_window(&window);
        assert!(!result.cusum_pred);
        assert!(!cusum.initialized);
    }

    #[test]
    fn nonpositive_tuning_falls_back_to_defaults() {
        let cusum = CusumDetector::new(0.0, -1.0);
        assert_eq!(cusum.threshold, 5.0);
        assert_eq!(cusum.drift, 0.5);
    }
}
