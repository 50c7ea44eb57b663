//! Bounded resample worker pool.
//!
//! Resampling is CPU-bound, so it runs on a dedicated [rayon] pool instead of
//! the request threads. Each job is bounded twice:
//!
//! - **Admission**: at most `max_pending` jobs are queued or running. Past
//!   that, [`ResampleWorker::run`] fails fast with [`BackendError::Busy`].
//!   A job that waits longer than `queue_timeout_ms` for a worker is dropped
//!   before it starts.
//! - **Runtime**: once a worker picks the job up, it gets a timeout that
//!   grows with the source's pixel count. Time spent queued doesn't count.
//!
//! ```text
//! timeout = timeout_base + timeout_per_megapixel * megapixels
//! ```
//!
//! A running job cannot be cancelled. After a timeout it keeps its worker
//! and its admission slot until the backend returns; the result is discarded.
//! Repeated renders of a pathological image therefore hit `Busy` instead of
//! stacking up more work.

use super::backend::{BackendError, ImageBackend};
use super::params::{Encoded, ResampleParams};
use crate::config::{ProcessingConfig, effective_threads};
use crate::types::Dimensions;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use tracing::warn;

pub struct ResampleWorker {
    backend: Arc<dyn ImageBackend>,
    pool: rayon::ThreadPool,
    processing: ProcessingConfig,
    pending: Arc<AtomicUsize>,
}

/// One admitted job. Dropping it frees the slot.
struct Slot(Arc<AtomicUsize>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ResampleWorker {
    /// Build a worker with one pool thread per effective process slot.
    pub fn new(
        backend: Arc<dyn ImageBackend>,
        processing: &ProcessingConfig,
    ) -> Result<Self, BackendError> {
        let threads = effective_threads(processing);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("resample-{i}"))
            .build()
            .map_err(|e| BackendError::ProcessingFailed(format!("worker pool: {e}")))?;
        Ok(Self {
            backend,
            pool,
            processing: processing.clone(),
            pending: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn timeout_for(&self, source: Dimensions) -> Duration {
        self.processing.timeout_for(source.pixels())
    }

    /// Jobs currently queued or running, including timed-out ones that
    /// haven't returned yet.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn admit(&self) -> Result<Slot, BackendError> {
        let limit = self.processing.max_pending;
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
            .map(|_| Slot(Arc::clone(&self.pending)))
            .map_err(|n| BackendError::Busy(format!("{n} resample jobs pending")))
    }

    /// Run one resample job and wait for it: first for a free worker, then at
    /// most [`timeout_for`](Self::timeout_for) the source's size.
    pub fn run(&self, params: ResampleParams, source: Dimensions) -> Result<Encoded, BackendError> {
        let slot = self.admit()?;
        let timeout = self.timeout_for(source);
        let queue_timeout = Duration::from_millis(self.processing.queue_timeout_ms);
        let (started_tx, started_rx) = mpsc::sync_channel(1);
        let (done_tx, done_rx) = mpsc::sync_channel(1);
        let abandoned = Arc::new(AtomicBool::new(false));

        let backend = Arc::clone(&self.backend);
        let job_abandoned = Arc::clone(&abandoned);
        self.pool.spawn(move || {
            let _slot = slot;
            if job_abandoned.load(Ordering::SeqCst) {
                return;
            }
            // Either receiver is gone if the caller already gave up.
            let _ = started_tx.send(());
            let _ = done_tx.send(backend.resample(&params));
        });

        match started_rx.recv_timeout(queue_timeout) {
            Ok(()) => {}
            Err(RecvTimeoutError::Timeout) => {
                abandoned.store(true, Ordering::SeqCst);
                warn!(%source, ?queue_timeout, "no free resample worker");
                return Err(BackendError::Busy(format!(
                    "no free worker within {queue_timeout:?}"
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(BackendError::ProcessingFailed(
                    "resample job dropped before it started".into(),
                ));
            }
        }

        match done_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(%source, ?timeout, "resample timed out");
                Err(BackendError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(BackendError::ProcessingFailed(
                "resample job ended without a result".into(),
            )),
        }
    }
}
