//! Master coordinator: loads windows, schedules work, collects results.

use std::path::Path;
use std::time::{Duration, Instant};

use crossbeam_channel::Select;
use thiserror::Error;

use super::WorkerPool;
use crate::metrics::{self, RunMetrics};
use crate::source::{self, SourceError};
use crate::suspects::SuspectList;
use crate::transport::TransportError;
use crate::{FlowWindow, WindowResult};
use crate::config::RunConfig;

/// Errors that abort a batch on the master side.
#[derive(Debug, Error)]
pub enum MasterError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("unexpected result for window id {0}")]
    BadWindowId(i64),
}

/// Everything a finished batch produces.
pub struct BatchOutcome {
    /// Per-window results, indexed by window id.
    pub results: Vec<WindowResult>,
    pub metrics: RunMetrics,
    /// Cross-window suspect aggregation; counts are windows-of-detection.
    pub suspects: SuspectList,
    pub elapsed: Duration,
}

/// Runs one batch over `input` and drains every worker with an in-band
/// terminator afterwards (dataset/custom mode).
pub fn run_batch(
    config: &RunConfig,
    pool: &WorkerPool,
    input: &Path,
) -> Result<BatchOutcome, MasterError> {
    let windows = source::load_windows(input, config.window_size)?;
    run_windows(pool, windows, false)
}

/// Runs one batch over `input` but leaves the workers resident for the next
/// capture (live mode). Detector state carries over between batches.
pub fn run_batch_resident(
    config: &RunConfig,
    pool: &WorkerPool,
    input: &Path,
) -> Result<BatchOutcome, MasterError> {
    let windows = source::load_windows(input, config.window_size)?;
    run_windows(pool, windows, true)
}

/// Work-pull scheduler.
///
/// Seeds one window per worker, then repeats: wait for any result, store it
/// at `results[window_id]`, and hand the reporting worker the next window —
/// or, in batch mode, the id −1 terminator once the queue is empty. Workers
/// that were never seeded are drained at the end. Skew between workers is
/// bounded by the longest single-window service time because each worker
/// holds at most one outstanding window.
fn run_windows(
    pool: &WorkerPool,
    windows: Vec<FlowWindow>,
    live: bool,
) -> Result<BatchOutcome, MasterError> {
    let num_windows = windows.len();
    let links = pool.links();
    let started = Instant::now();
    log::info!(
        "dispatching {num_windows} windows across {} workers",
        links.len()
    );

    let mut used = vec![false; links.len()];
    // Workers drained with a terminator stop producing; exclude them from
    // the readiness select or their dead channels would spin it.
    let mut active = vec![true; links.len()];
    let mut next = 0usize;

    for worker in 0..links.len().min(num_windows) {
        links[worker].send_window(&windows[next])?;
        used[worker] = true;
        next += 1;
    }

    let mut results: Vec<WindowResult> = vec![WindowResult::default(); num_windows];
    let mut filled = vec![false; num_windows];
    let mut received = 0usize;

    while received < num_windows {
        // Any-source wait: select across the active result channels, pull
        // the meta frame from whichever fired, then drain the rest of that
        // worker's result in order.
        let (worker, meta) = {
            let mut select = Select::new();
            let mut indices = Vec::with_capacity(links.len());
            for (index, link) in links.iter().enumerate() {
                if active[index] {
                    select.recv(link.result_receiver());
                    indices.push(index);
                }
            }
            let operation = select.select();
            let worker = indices[operation.index()];
            let meta = operation
                .recv(links[worker].result_receiver())
                .map_err(|_| TransportError::Disconnected)?;
            (worker, meta)
        };

        let result = links[worker].finish_recv_result(meta)?;
        let id = result.window_id;
        let slot = usize::try_from(id).ok().filter(|&i| i < num_windows);
        let Some(slot) = slot.filter(|&i| !filled[i]) else {
            return Err(MasterError::BadWindowId(id));
        };
        results[slot] = result;
        filled[slot] = true;
        received += 1;
        log::debug!("window {id} done on worker {worker} ({received}/{num_windows})");

        if next < num_windows {
            links[worker].send_window(&windows[next])?;
            next += 1;
        } else if !live {
            links[worker].send_window(&FlowWindow::terminate())?;
            active[worker] = false;
        }
    }

    if !live {
        for (worker, link) in links.iter().enumerate() {
            if !used[worker] {
                link.send_window(&FlowWindow::terminate())?;
            }
        }
    }

    let elapsed = started.elapsed();
    let metrics = metrics::reduce(&results, elapsed);
    let mut suspects = SuspectList::new();
    for result in &results {
        suspects.merge_distinct(&result.suspects);
    }

    Ok(BatchOutcome {
        results,
        metrics,
        suspects,
        elapsed,
    })
}
