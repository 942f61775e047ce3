//! Worker loop: owns detector state, pulls windows, pushes results.

use std::time::Instant;

use crate::config::RunConfig;
use crate::detect::{CusumDetector, PcaDetector, entropy_detect_window, merge_results};
use crate::transport::WorkerLink;

/// Runs one worker until termination.
///
/// Detectors execute in the fixed order entropy, deviation, CUSUM; the
/// stateful detectors evolve over whichever windows this worker happens to
/// pull, which is accepted behaviour of the scheduler. A transport failure
/// is fatal to the worker only.
pub(crate) fn run(index: usize, config: RunConfig, link: WorkerLink) {
    let mut pca = config
        .detectors
        .pca
        .then(|| PcaDetector::new(config.pca_warmup_windows));
    let mut cusum = config
        .detectors
        .cusum
        .then(|| CusumDetector::new(config.cusum_threshold, config.cusum_drift));

    loop {
        let window = match link.recv_window() {
            Ok(Some(window)) => window,
            Ok(None) => break,
            Err(err) => {
                log::error!("worker {index}: receive failed: {err}");
                break;
            }
        };
        if window.is_terminate() {
            break;
        }

        let started = Instant::now();
        let entropy_result = config
            .detectors
            .entropy
            .then(|| entropy_detect_window(&window, config.entropy_threshold));
        let pca_result = pca
            .as_mut()
            .map(|detector| detector.detect_window(&window, config.pca_threshold));
        let cusum_result = cusum.as_mut().map(|detector| detector.detect_window(&window));

        let mut merged = merge_results(
            entropy_result.as_ref(),
            pca_result.as_ref(),
            cusum_result.as_ref(),
            config.detectors,
        );
        merged.processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        if let Err(err) = link.send_result(&merged) {
            log::error!("worker {index}: send failed: {err}");
            break;
        }
        // Window buffer and per-detector suspect lists drop here.
    }
    log::debug!("worker {index}: terminated");
}
