//! Reduction of per-window results into detection-quality metrics.
//!
//! The reducer is a pure function of the result vector and the elapsed wall
//! time, so running it twice over the same input yields identical output.
//! Packet and bandwidth figures are estimates built from documented
//! constants, not measurements.

use std::time::Duration;

use crate::WindowResult;

/// Assumed packets per flow for throughput estimation.
pub const PACKETS_PER_FLOW: u64 = 20;
/// Assumed bytes per packet for bandwidth estimation.
pub const BYTES_PER_PACKET: f64 = 1500.0;
/// Assumed capture interval per window for detection lead time (ms).
const WINDOW_INTERVAL_MS: f64 = 10_000.0;

/// Per-flow, per-window and per-result byte costs for the memory estimate.
const FLOW_BYTES: u64 = 400;
const WINDOW_BYTES: u64 = 100;
const RESULT_BYTES: u64 = 300;

/// Binary confusion counts against ground truth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_positives: u64,
    pub true_negatives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
}

impl ConfusionMatrix {
    fn observe(&mut self, prediction: bool, truth: bool) {
        match (prediction, truth) {
            (true, true) => self.true_positives += 1,
            (false, false) => self.true_negatives += 1,
            (true, false) => self.false_positives += 1,
            (false, true) => self.false_negatives += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    pub fn detection_rate(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn false_alarm_rate(&self) -> f64 {
        ratio(self.false_positives, self.false_positives + self.true_negatives)
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    pub fn specificity(&self) -> f64 {
        ratio(self.true_negatives, self.false_positives + self.true_negatives)
    }

    pub fn balanced_accuracy(&self) -> f64 {
        (self.detection_rate() + self.specificity()) / 2.0
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        self.detection_rate()
    }

    pub fn f1_score(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        if precision + recall == 0.0 {
            return 0.0;
        }
        2.0 * precision * recall / (precision + recall)
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64
}

/// Aggregate metrics for one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunMetrics {
    pub total_windows: u64,
    /// Windows the ensemble flagged as attack.
    pub attack_windows: u64,
    pub benign_windows: u64,
    /// Windows whose ground truth is attack.
    pub truth_windows: u64,

    pub combined: ConfusionMatrix,
    pub entropy: ConfusionMatrix,
    pub pca: ConfusionMatrix,
    pub cusum: ConfusionMatrix,

    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    /// Window delay times the capture interval plus processing time of the
    /// first detected attack window; 0 when nothing was detected.
    pub detection_lead_time_ms: f64,

    pub total_flows: u64,
    pub estimated_packets: u64,
    pub elapsed_secs: f64,
    pub flows_per_sec: f64,
    pub packets_per_sec: f64,
    pub bandwidth_mbps: f64,
    pub bandwidth_gbps: f64,
    pub estimated_memory_bytes: u64,
}

/// Reduces a result vector (in window-id order) and the elapsed wall time.
pub fn reduce(results: &[WindowResult], elapsed: Duration) -> RunMetrics {
    let mut metrics = RunMetrics {
        total_windows: results.len() as u64,
        elapsed_secs: elapsed.as_secs_f64(),
        ..RunMetrics::default()
    };
    if results.is_empty() {
        return metrics;
    }

    let mut latencies: Vec<f64> = Vec::with_capacity(results.len());
    let mut first_truth_attack: Option<usize> = None;
    let mut first_detected_attack: Option<usize> = None;

    for (index, result) in results.iter().enumerate() {
        metrics.total_flows += u64::from(result.flow_count);
        latencies.push(result.processing_time_ms);

        if result.ground_truth {
            metrics.truth_windows += 1;
            if first_truth_attack.is_none() {
                first_truth_attack = Some(index);
            }
        }
        if result.combined_pred {
            metrics.attack_windows += 1;
            if first_detected_attack.is_none() {
                first_detected_attack = Some(index);
            }
        } else {
            metrics.benign_windows += 1;
        }

        metrics.combined.observe(result.combined_pred, result.ground_truth);
        metrics.entropy.observe(result.entropy_pred, result.ground_truth);
        metrics.pca.observe(result.pca_pred, result.ground_truth);
        metrics.cusum.observe(result.cusum_pred, result.ground_truth);
    }

    metrics.min_latency_ms = latencies.iter().copied().fold(f64::INFINITY, f64::min);
    metrics.max_latency_ms = latencies.iter().copied().fold(0.0, f64::max);
    metrics.avg_latency_ms = latencies.iter().sum::<f64>() / latencies.len() as f64;
    latencies.sort_by(|a, b| a.total_cmp(b));
    let p95_index = ((latencies.len() as f64 * 0.95) as usize).min(latencies.len() - 1);
    metrics.p95_latency_ms = latencies[p95_index];

    if let (Some(truth), Some(detected)) = (first_truth_attack, first_detected_attack) {
        if detected >= truth {
            metrics.detection_lead_time_ms = (detected - truth) as f64 * WINDOW_INTERVAL_MS
                + results[detected].processing_time_ms;
        }
    }

    metrics.estimated_packets = metrics.total_flows * PACKETS_PER_FLOW;
    if metrics.elapsed_secs > 0.0 {
        metrics.flows_per_sec = metrics.total_flows as f64 / metrics.elapsed_secs;
        metrics.packets_per_sec = metrics.estimated_packets as f64 / metrics.elapsed_secs;
        metrics.bandwidth_mbps = metrics.packets_per_sec * BYTES_PER_PACKET * 8.0 / 1e6;
        metrics.bandwidth_gbps = metrics.bandwidth_mbps / 1000.0;
    }
    metrics.estimated_memory_bytes = metrics.total_flows * FLOW_BYTES
        + metrics.total_windows * (WINDOW_BYTES + RESULT_BYTES);

    metrics
}

impl RunMetrics {
    /// `key,value` pairs for the report summary block, covering the whole
    /// metric family in a stable order.
    pub fn summary_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = [
            ("total_windows", self.total_windows.to_string()),
            ("attack_windows_detected", self.attack_windows.to_string()),
            ("benign_windows_detected", self.benign_windows.to_string()),
            ("actual_attack_windows", self.truth_windows.to_string()),
            ("true_positives", self.combined.true_positives.to_string()),
            ("true_negatives", self.combined.true_negatives.to_string()),
            ("false_positives", self.combined.false_positives.to_string()),
            ("false_negatives", self.combined.false_negatives.to_string()),
            ("detection_rate", format!("{:.6}", self.combined.detection_rate())),
            ("false_alarm_rate", format!("{:.6}", self.combined.false_alarm_rate())),
            ("accuracy", format!("{:.6}", self.combined.accuracy())),
            ("specificity", format!("{:.6}", self.combined.specificity())),
            ("balanced_accuracy", format!("{:.6}", self.combined.balanced_accuracy())),
            ("precision", format!("{:.6}", self.combined.precision())),
            ("recall", format!("{:.6}", self.combined.recall())),
            ("f1_score", format!("{:.6}", self.combined.f1_score())),
            ("min_window_processing_ms", format!("{:.3}", self.min_latency_ms)),
            ("max_window_processing_ms", format!("{:.3}", self.max_latency_ms)),
            ("avg_window_processing_ms", format!("{:.3}", self.avg_latency_ms)),
            ("percentile_95_latency_ms", format!("{:.3}", self.p95_latency_ms)),
            ("detection_lead_time_ms", format!("{:.2}", self.detection_lead_time_ms)),
            ("total_flows_analyzed", self.total_flows.to_string()),
            ("estimated_packets_processed", self.estimated_packets.to_string()),
            ("elapsed_seconds", format!("{:.3}", self.elapsed_secs)),
            ("throughput_flows_per_sec", format!("{:.2}", self.flows_per_sec)),
            ("throughput_packets_per_sec", format!("{:.2}", self.packets_per_sec)),
            ("throughput_mbps", format!("{:.2}", self.bandwidth_mbps)),
            ("throughput_gbps", format!("{:.4}", self.bandwidth_gbps)),
            ("estimated_memory_bytes", self.estimated_memory_bytes.to_string()),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();

        for (name, matrix) in [
            ("entropy", &self.entropy),
            ("pca", &self.pca),
            ("cusum", &self.cusum),
        ] {
            pairs.push((format!("{name}_true_positives"), matrix.true_positives.to_string()));
            pairs.push((format!("{name}_true_negatives"), matrix.true_negatives.to_string()));
            pairs.push((format!("{name}_false_positives"), matrix.false_positives.to_string()));
            pairs.push((format!("{name}_false_negatives"), matrix.false_negatives.to_string()));
            pairs.push((
                format!("{name}_detection_rate"),
                format!("{:.6}", matrix.detection_rate()),
            ));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfusionMatrix, reduce};
    use crate::WindowResult;
    use std::time::Duration;

    fn result(id: i64, pred: bool, truth: bool, time_ms: f64) -> WindowResult {
        WindowResult {
            window_id: id,
            flow_count: 10,
            combined_pred: pred,
            entropy_pred: pred,
            ground_truth: truth,
            processing_time_ms: time_ms,
            ..WindowResult::default()
        }
    }

    #[test]
    fn confusion_counts_sum_to_total() {
        let results: Vec<WindowResult> = [
            (true, true),
            (false, false),
            (true, false),
            (false, true),
            (false, false),
        ]
        .iter()
        .enumerate()
        .map(|(i, &(pred, truth))| result(i as i64, pred, truth, 1.0))
        .collect();

        let metrics = reduce(&results, Duration::from_secs(1));
        assert_eq!(metrics.combined.total(), 5);
        assert_eq!(metrics.combined.true_positives, 1);
        assert_eq!(metrics.combined.false_positives, 1);
        assert_eq!(metrics.combined.false_negatives, 1);
        assert_eq!(metrics.combined.true_negatives, 2);
    }

    #[test]
    fn ratios_are_zero_on_empty_denominators() {
        let matrix = ConfusionMatrix::default();
        assert_eq!(matrix.detection_rate(), 0.0);
        assert_eq!(matrix.false_alarm_rate(), 0.0);
        assert_eq!(matrix.precision(), 0.0);
        assert_eq!(matrix.f1_score(), 0.0);
    }

    #[test]
    fn latency_percentile_uses_floor_index() {
        let results: Vec<WindowResult> = (0..10)
            .map(|i| result(i, false, false, (i + 1) as f64))
            .collect();
        let metrics = reduce(&results, Duration::from_secs(1));
        assert_eq!(metrics.min_latency_ms, 1.0);
        assert_eq!(metrics.max_latency_ms, 10.0);
        // floor(10 * 0.95) = 9 -> last element.
        assert_eq!(metrics.p95_latency_ms, 10.0);
        assert_eq!(metrics.avg_latency_ms, 5.5);
    }

    #[test]
    fn lead_time_combines_window_delay_and_processing() {
        let results = vec![
            result(0, false, false, 1.0),
            result(1, false, true, 1.0),
            result(2, true, true, 7.5),
        ];
        let metrics = reduce(&results, Duration::from_secs(1));
        assert_eq!(metrics.detection_lead_time_ms, 10_000.0 + 7.5);
    }

    #[test]
    fn lead_time_is_zero_when_detection_precedes_truth() {
        let results = vec![
            result(0, true, false, 1.0),
            result(1, false, true, 1.0),
        ];
        let metrics = reduce(&results, Duration::from_secs(1));
        assert_eq!(metrics.detection_lead_time_ms, 0.0);
    }

    #[test]
    fn throughput_and_memory_estimates() {
        let results: Vec<WindowResult> = (0..2).map(|i| result(i, false, false, 1.0)).collect();
        let metrics = reduce(&results, Duration::from_secs(2));
        assert_eq!(metrics.total_flows, 20);
        assert_eq!(metrics.estimated_packets, 400);
        assert_eq!(metrics.flows_per_sec, 10.0);
        assert_eq!(metrics.packets_per_sec, 200.0);
        assert_eq!(metrics.estimated_memory_bytes, 20 * 400 + 2 * 100 + 2 * 300);
    }

    #[test]
    fn reducing_twice_is_idempotent() {
        let results: Vec<WindowResult> = (0..4)
            .map(|i| result(i, i % 2 == 0, i % 3 == 0, i as f64))
            .collect();
        let elapsed = Duration::from_millis(1234);
        assert_eq!(reduce(&results, elapsed), reduce(&results, elapsed));
    }
}
