//! Master/worker coordination.
//!
//! One master thread distributes windows to a pool of worker threads with a
//! work-pull scheduler and collects results keyed by window id. Worker
//! detector state is private per thread; the only shared resource is the
//! channel transport. Cancellation is a one-producer one-consumer atomic
//! token: the signal handler sets it, the live-mode poll loop consumes it.

mod master;
mod worker;

pub use master::{BatchOutcome, MasterError, run_batch, run_batch_resident};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crate::config::RunConfig;
use crate::transport::{MasterLink, link};

/// Cooperative stop flag shared between a signal handler and the master.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A spawned set of resident worker threads and their master-side links.
pub struct WorkerPool {
    links: Vec<MasterLink>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` threads (at least one), each owning fresh detector
    /// state for the run configuration.
    pub fn spawn(config: &RunConfig, workers: usize) -> WorkerPool {
        let workers = workers.max(1);
        let mut links = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let (master_link, worker_link) = link();
            let worker_config = config.clone();
            links.push(master_link);
            handles.push(std::thread::spawn(move || {
                worker::run(index, worker_config, worker_link);
            }));
        }
        WorkerPool { links, handles }
    }

    pub fn worker_count(&self) -> usize {
        self.links.len()
    }

    pub(crate) fn links(&self) -> &[MasterLink] {
        &self.links
    }

    /// Sends the out-of-band terminate packet to every worker.
    pub fn broadcast_terminate(&self) {
        for link in &self.links {
            link.send_terminate();
        }
    }

    /// Terminates all workers and waits for them to exit.
    pub fn shutdown(self) {
        self.broadcast_terminate();
        // Dropping the links disconnects the window channels, which a
        // blocked worker also reads as termination.
        drop(self.links);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}
