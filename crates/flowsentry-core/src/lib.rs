//! FlowSentry core library for windowed network-flow anomaly detection.
//!
//! This crate exposes the analysis pipeline used by the CLI and tests: the
//! CSV input adapter slices flow records into fixed-size windows, a master
//! coordinator hands windows to a pool of worker threads over a framed
//! binary transport, each worker runs an ensemble of statistical detectors
//! (entropy deficit, frozen-baseline deviation, one-sided CUSUM), and the
//! master reduces the collected results into detection-quality metrics, a
//! tabular report and a deduplicated suspect-address blocklist.
//!
//! Key guarantees:
//! - Result placement is keyed by `window_id`, so the final result vector is
//!   deterministic regardless of worker completion order.
//! - Detector state is private to each worker; there is no cross-worker
//!   synchronisation.
//! - The wire format is an explicit fixed-width little-endian layout,
//!   independent of the in-memory representation.
//!
//! # Examples
//! ```no_run
//! use flowsentry_core::{RunConfig, coordinator};
//!
//! let config = RunConfig::default().with_input("flows.csv");
//! let pool = coordinator::WorkerPool::spawn(&config, 2);
//! let outcome = coordinator::run_batch(&config, &pool, "flows.csv".as_ref())?;
//! println!("windows analysed: {}", outcome.results.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod coordinator;
pub mod detect;
pub mod metrics;
pub mod mitigation;
pub mod report;
pub mod source;
pub mod suspects;
pub mod transport;
pub mod watch;
pub mod wire;

pub use config::{ConfigError, DetectorSet, Mode, RunConfig};
pub use metrics::RunMetrics;
pub use suspects::SuspectList;

/// Default number of flows per analysis window.
pub const DEFAULT_WINDOW_SIZE: usize = 500;
/// Default entropy-deficit alarm threshold (tuned for reflection attacks).
pub const DEFAULT_ENTROPY_THRESHOLD: f64 = 0.20;
/// Default standardised-deviation alarm threshold.
pub const DEFAULT_PCA_THRESHOLD: f64 = 2.5;
/// Default CUSUM alarm threshold.
pub const DEFAULT_CUSUM_THRESHOLD: f64 = 3.0;
/// Default minimum per-address detection count for the blocklist.
pub const DEFAULT_MIN_ADDR_COUNT: u32 = 5;
/// Default number of warm-up windows for the deviation detector baseline.
pub const DEFAULT_PCA_WARMUP_WINDOWS: u32 = 10;
/// Default CUSUM drift constant.
pub const DEFAULT_CUSUM_DRIFT: f64 = 0.5;

/// A single parsed network-flow summary.
///
/// Addresses are printable strings of at most 63 bytes; optional numeric
/// columns missing from the input default to zero. `is_attack` is derived
/// from the label at parse time, see [`label_is_attack`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowRecord {
    pub src_addr: String,
    pub dst_addr: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    /// Flow duration in seconds; negative values mark unusable rows.
    pub duration: f64,
    pub fwd_packets: u32,
    pub bwd_packets: u32,
    pub bytes_per_sec: f64,
    pub packets_per_sec: f64,
    pub packet_len_mean: f64,
    pub syn_count: u32,
    pub label: String,
    pub is_attack: bool,
}

/// Returns whether a flow label denotes attack traffic.
///
/// # Examples
/// ```
/// use flowsentry_core::label_is_attack;
///
/// assert!(label_is_attack("DrDoS_DNS"));
/// assert!(!label_is_attack("BENIGN"));
/// assert!(!label_is_attack(""));
/// ```
pub fn label_is_attack(label: &str) -> bool {
    !label.is_empty() && !label.to_ascii_lowercase().contains("benign")
}

/// A contiguous batch of flows analysed as one unit.
///
/// Window ids start at 0 and increase monotonically within a stream. A
/// window holds between 1 and `window_size` flows; only the final window of
/// a stream may be shorter. `window_id == -1` encodes an in-band terminate
/// on the wire and never reaches a detector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowWindow {
    pub window_id: i64,
    /// Inclusive first data row of this window in the source stream.
    pub start_row: i64,
    /// Inclusive last data row of this window in the source stream.
    pub end_row: i64,
    pub flows: Vec<FlowRecord>,
}

impl FlowWindow {
    /// Builds the in-band terminate marker sent to drain a worker.
    pub fn terminate() -> Self {
        FlowWindow {
            window_id: -1,
            ..FlowWindow::default()
        }
    }

    /// Whether this window encodes the in-band terminate marker.
    pub fn is_terminate(&self) -> bool {
        self.window_id < 0
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }
}

/// Per-window analysis outcome produced by a worker.
///
/// Detectors each fill their own score/prediction slots; the ensemble merge
/// combines them and the master stores the merged result at index
/// `window_id`. Field-for-field this mirrors the result wire messages, so a
/// transported result reconstructs exactly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowResult {
    pub window_id: i64,
    pub start_row: i64,
    pub end_row: i64,
    pub flow_count: u32,

    pub entropy_score: f64,
    pub pca_score: f64,
    pub cusum_score: f64,

    pub entropy_pred: bool,
    pub pca_pred: bool,
    pub cusum_pred: bool,
    pub combined_pred: bool,
    pub ground_truth: bool,

    /// Normalised source-address entropy of the window.
    pub norm_entropy_src: f64,
    /// Normalised destination-address entropy of the window.
    pub norm_entropy_dst: f64,
    /// Mean absolute standardised deviation of the deviation detector.
    pub pca_spe: f64,
    /// Reserved; transported but never computed (always 0.0).
    pub pca_t2: f64,
    pub cusum_positive: f64,
    pub cusum_negative: f64,

    pub processing_time_ms: f64,
    pub suspects: suspects::SuspectList,
}

impl WindowResult {
    /// Seeds a result with the identity fields of `window`.
    pub fn for_window(window: &FlowWindow) -> Self {
        WindowResult {
            window_id: window.window_id,
            start_row: window.start_row,
            end_row: window.end_row,
            flow_count: window.flow_count() as u32,
            ..WindowResult::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FlowWindow, label_is_attack};

    #[test]
    fn attack_labels() {
        assert!(label_is_attack("DDoS_SYN"));
        assert!(label_is_attack("UDP-lag"));
        assert!(!label_is_attack("Benign"));
        // Contains "benign" as a substring: still benign.
        assert!(!label_is_attack("benign-scan"));
    }

    #[test]
    fn terminate_marker() {
        let term = FlowWindow::terminate();
        assert!(term.is_terminate());
        assert_eq!(term.flow_count(), 0);
    }
}
