//! The order-accrual pipeline.
//!
//! Extractor -> bounded queue -> worker pool -> bounded queue -> updater.
//! The extractor re-polls pending orders on a fixed interval, the workers
//! query the accrual service under one shared backoff deadline, and a
//! single updater settles status changes and balance credits into the
//! ledger. One cancellation token stops every stage.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::ports::{LedgerRef, OracleRef};

mod backoff;
mod extractor;
mod updater;
mod workers;

pub use backoff::SharedBackoff;

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Interval between pending-order polls.
    pub poll_interval: Duration,
    /// Number of concurrent accrual workers.
    pub workers: usize,
    /// Capacity of both internal queues.
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            workers: 5,
            queue_capacity: 1024,
        }
    }
}

/// Handle to a running pipeline.
pub struct Pipeline {
    handles: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Spawns the extractor, the worker pool and the updater. Cancelling
    /// `cancel` stops every stage; await [`Pipeline::shutdown`] afterwards
    /// to join them.
    pub fn spawn(
        ledger: LedgerRef,
        oracle: OracleRef,
        config: PipelineConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel(config.queue_capacity);
        let (results_tx, results_rx) = mpsc::channel(config.queue_capacity);

        let mut handles = Vec::with_capacity(config.workers + 2);

        handles.push(tokio::spawn(extractor::run_extractor(
            ledger.clone(),
            jobs_tx,
            config.poll_interval,
            cancel.clone(),
        )));

        let jobs_rx = Arc::new(Mutex::new(jobs_rx));
        let backoff = Arc::new(SharedBackoff::new());
        for worker in 0..config.workers {
            handles.push(tokio::spawn(workers::run_worker(
                worker,
                oracle.clone(),
                jobs_rx.clone(),
                results_tx.clone(),
                backoff.clone(),
                cancel.clone(),
            )));
        }
        drop(results_tx);

        handles.push(tokio::spawn(updater::run_updater(
            ledger,
            results_rx,
            cancel,
        )));

        Self { handles }
    }

    /// Waits for all stages to finish. Call after cancelling the token.
    pub async fn shutdown(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
