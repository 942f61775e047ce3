//! Frozen-baseline standardised-deviation detector.
//!
//! During warm-up the detector accumulates per-window feature means; once
//! trained, windows are scored by mean absolute standardised deviation from
//! that baseline. The baseline is never updated after training, so a
//! sustained attack cannot absorb itself into the reference statistics.

use super::strict_majority;
use crate::{FlowWindow, WindowResult};

const N_FEATURES: usize = 6;
const DEFAULT_WARMUP: u32 = 10;

/// Std floor and width factor; traffic statistics have high natural
/// variance, so the baseline band is deliberately wide.
const STD_FRACTION: f64 = 0.5;
const STD_FLOOR: f64 = 10.0;
const Z_CLAMP: f64 = 100.0;

/// Mean-deviation detector with a warm-up baseline.
#[derive(Debug, Clone)]
pub struct PcaDetector {
    mean: [f64; N_FEATURES],
    std: [f64; N_FEATURES],
    warmup_count: u32,
    warmup_target: u32,
    trained: bool,
}

impl PcaDetector {
    pub fn new(warmup_windows: u32) -> Self {
        PcaDetector {
            mean: [0.0; N_FEATURES],
            // Strictly positive from the start; replaced when trained.
            std: [1.0; N_FEATURES],
            warmup_count: 0,
            warmup_target: if warmup_windows > 0 {
                warmup_windows
            } else {
                DEFAULT_WARMUP
            },
            trained: false,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Per-window feature vector: means of duration, bytes/s, packets/s,
    /// forward packets, backward packets and packet length over flows with
    /// non-negative duration. `None` when no flow qualifies.
    fn extract_features(window: &FlowWindow) -> Option<[f64; N_FEATURES]> {
        let mut sums = [0.0; N_FEATURES];
        let mut count = 0usize;
        for flow in &window.flows {
            if flow.duration < 0.0 {
                continue;
            }
            sums[0] += flow.duration;
            sums[1] += flow.bytes_per_sec;
            sums[2] += flow.packets_per_sec;
            sums[3] += f64::from(flow.fwd_packets);
            sums[4] += f64::from(flow.bwd_packets);
            sums[5] += flow.packet_len_mean;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        for sum in &mut sums {
            *sum /= count as f64;
        }
        Some(sums)
    }

    /// Analyses one window, mutating the warm-up state until trained.
    ///
    /// Warm-up windows never alarm. A window with no usable flows is benign
    /// and leaves the state untouched.
    pub fn detect_window(&mut self, window: &FlowWindow, threshold: f64) -> WindowResult {
        let mut result = WindowResult::for_window(window);
        if window.flows.is_empty() {
            return result;
        }

        let attacks = window.flows.iter().filter(|f| f.is_attack).count();
        result.ground_truth = strict_majority(attacks, window.flow_count());

        let Some(features) = Self::extract_features(window) else {
            return result;
        };

        if !self.trained {
            for (mean, feature) in self.mean.iter_mut().zip(features) {
                *mean += feature;
            }
            self.warmup_count += 1;
            if self.warmup_count >= self.warmup_target {
                for i in 0..N_FEATURES {
                    self.mean[i] /= f64::from(self.warmup_target);
                    self.std[i] = (self.mean[i].abs() * STD_FRACTION).max(STD_FLOOR);
                }
                self.trained = true;
            }
            return result;
        }

        let deviation: f64 = (0..N_FEATURES)
            .map(|i| {
                let std = self.std[i].max(1e-6);
                let z = (features[i] - self.mean[i]) / std;
                z.clamp(-Z_CLAMP, Z_CLAMP).abs()
            })
            .sum::<f64>()
            / N_FEATURES as f64;

        result.pca_spe = deviation;
        result.pca_score = deviation;
        result.pca_pred = deviation > threshold;
        if result.pca_pred {
            for flow in &window.flows {
                result.suspects.add(&flow.src_addr);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::PcaDetector;
    use crate::{FlowRecord, FlowWindow};

    fn uniform_window(id: i64, bytes_per_sec: f64) -> FlowWindow {
        let flows = (0..4)
            .map(|i| FlowRecord {
                src_addr: format!("10.0.0.{i}"),
                dst_addr: "8.8.8.8".to_string(),
                duration: 1.0,
                bytes_per_sec,
                packets_per_sec: 10.0,
                fwd_packets: 5,
                bwd_packets: 5,
                packet_len_mean: 100.0,
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
    fn warmup_never_alarms_and_trains_on_the_final_window() {
        let mut pca = PcaDetector::new(10);
        for id in 0..10 {
            let result = pca.detect_window(&uniform_window(id, 1000.0), 2.5);
            assert!(!result.pca_pred);
            assert_eq!(result.pca_score, 0.0);
        }
        assert!(pca.is_trained());
    }

    #[test]
    fn trained_baseline_has_positive_stds() {
        let mut pca = PcaDetector::new(3);
        for id in 0..3 {
            pca.detect_window(&uniform_window(id, 1000.0), 2.5);
        }
        assert!(pca.std.iter().all(|&s| s > 0.0));
        // bytes/s mean 1000 -> std = max(500, 10) = 500
        assert_eq!(pca.std[1], 500.0);
        // duration mean 1 -> floor kicks in
        assert_eq!(pca.std[0], 10.0);
    }

    #[test]
    fn identical_steady_state_window_stays_benign() {
        let mut pca = PcaDetector::new(10);
        for id in 0..10 {
            pca.detect_window(&uniform_window(id, 1000.0), 2.5);
        }
        let result = pca.detect_window(&uniform_window(10, 1000.0), 2.5);
        assert!(result.pca_score < 2.5);
        assert!(!result.pca_pred);
    }

    #[test]
    fn byte_rate_spike_alarms_after_warmup() {
        let mut pca = PcaDetector::new(10);
        for id in 0..10 {
            pca.detect_window(&uniform_window(id, 1000.0), 2.5);
        }
        // z_bps = (10000 - 1000) / 500 = 18; mean |z| = 3 over six features.
        let result = pca.detect_window(&uniform_window(10, 10_000.0), 2.5);
        assert!((result.pca_score - 3.0).abs() < 1e-9);
        assert!(result.pca_pred);
        assert_eq!(result.suspects.len(), 4);
    }

    #[test]
    fn negative_duration_flows_are_excluded() {
        let mut window = uniform_window(0, 1000.0);
        for flow in &mut window.flows {
            flow.duration = -1.0;
        }
        let mut pca = PcaDetector::new(2);
        let result = pca.detect_window(&window, 2.5);
        assert!(!result.pca_pred);
        assert_eq!(result.pca_score, 0.0);
        // State untouched: the window did not count towards warm-up.
        assert_eq!(pca.warmup_count, 0);
    }

    #[test]
    fn baseline_is_frozen_after_training() {
        let mut pca = PcaDetector::new(2);
        for id in 0..2 {
            pca.detect_window(&uniform_window(id, 1000.0), 2.5);
        }
        let mean_before = pca.mean;
        for id in 2..6 {
            pca.detect_window(&uniform_window(id, 50_000.0), 2.5);
        }
        assert_eq!(pca.mean, mean_before);
    }
}
