//! Background recording of published messages.
//!
//! Persistence is decoupled from delivery: [`Recorder::submit`] never waits for
//! storage. Accepted values go onto a bounded queue drained by a fixed pool of
//! worker tasks, which store them on the blocking thread pool. When the queue
//! is full new values are dropped.
//!
//! Publishers never see storage failures. They are logged and counted in
//! [`RecorderStats`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thingstore_history::History;
use thingstore_types::ThingValue;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::RecorderConfig;
use crate::filter::FiltersConfig;
use crate::message::ThingMessage;

/// What happened to a submitted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Queued for storage.
    Queued,
    /// Not selected by the filter for its kind.
    Filtered,
    /// Could not be mapped to a value.
    Rejected,
    /// The queue was full or closed.
    Dropped,
}

/// Counters shared by the recorder and its workers.
#[derive(Debug, Default)]
pub struct RecorderStats {
    accepted: AtomicU64,
    filtered: AtomicU64,
    dropped: AtomicU64,
    stored: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`RecorderStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderSnapshot {
    /// Values queued for storage.
    pub accepted: u64,
    /// Messages skipped by the filters.
    pub filtered: u64,
    /// Values lost to a full queue.
    pub dropped: u64,
    /// Values written to the store.
    pub stored: u64,
    /// Messages that could not be mapped or stored.
    pub failed: u64,
}

impl RecorderStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of the current counters.
    pub fn snapshot(&self) -> RecorderSnapshot {
        RecorderSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Filters published messages and stores the selected ones in the background.
pub struct Recorder {
    tx: mpsc::Sender<ThingValue>,
    filters: FiltersConfig,
    stats: Arc<RecorderStats>,
    workers: Vec<JoinHandle<()>>,
}

impl Recorder {
    /// Start the worker pool.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(history: Arc<History>, filters: FiltersConfig, config: &RecorderConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let worker_count = config.workers.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let rx = Arc::new(Mutex::new(rx));
        let stats = Arc::new(RecorderStats::new());

        let workers = (0..worker_count)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&history),
                    Arc::clone(&rx),
                    Arc::clone(&stats),
                ))
            })
            .collect();

        info!(
            "Recorder started with {} worker(s), queue capacity {}",
            worker_count, capacity
        );

        Self {
            tx,
            filters,
            stats,
            workers,
        }
    }

    /// Offer a message for recording without waiting.
    pub fn submit(&self, message: &ThingMessage) -> SubmitOutcome {
        if !self.filters.matches(message) {
            RecorderStats::bump(&self.stats.filtered);
            debug!(
                "Not recording {} of {}: filtered",
                message.name, message.thing_id
            );
            return SubmitOutcome::Filtered;
        }

        let value = match message.to_value() {
            Ok(value) => value,
            Err(e) => {
                RecorderStats::bump(&self.stats.failed);
                warn!(
                    "Not recording {} of {}: {}",
                    message.name, message.thing_id, e
                );
                return SubmitOutcome::Rejected;
            }
        };

        match self.tx.try_send(value) {
            Ok(()) => {
                RecorderStats::bump(&self.stats.accepted);
                SubmitOutcome::Queued
            }
            Err(mpsc::error::TrySendError::Full(value)) => {
                RecorderStats::bump(&self.stats.dropped);
                warn!(
                    "Recorder queue full, dropping {} of {}",
                    value.name, value.thing_id
                );
                SubmitOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(value)) => {
                RecorderStats::bump(&self.stats.dropped);
                warn!(
                    "Recorder stopped, dropping {} of {}",
                    value.name, value.thing_id
                );
                SubmitOutcome::Dropped
            }
        }
    }

    /// Current counters.
    pub fn stats(&self) -> RecorderSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting values, wait for the queue to drain and return the final counters.
    pub async fn shutdown(self) -> RecorderSnapshot {
        let Self {
            tx, workers, stats, ..
        } = self;
        drop(tx);

        for worker in workers {
            if let Err(e) = worker.await {
                error!("Recorder worker failed: {}", e);
            }
        }

        let snapshot = stats.snapshot();
        info!(
            "Recorder stopped: {} stored, {} failed, {} dropped",
            snapshot.stored, snapshot.failed, snapshot.dropped
        );
        snapshot
    }
}

async fn run_worker(
    id: usize,
    history: Arc<History>,
    rx: Arc<Mutex<mpsc::Receiver<ThingValue>>>,
    stats: Arc<RecorderStats>,
) {
    debug!("Recorder worker {} started", id);

    loop {
        let next = rx.lock().await.recv().await;
        let Some(value) = next else {
            break;
        };

        let name = value.name.clone();
        let thing_id = value.thing_id.clone();
        let history = Arc::clone(&history);

        match tokio::task::spawn_blocking(move || history.add_value(value)).await {
            Ok(Ok(())) => RecorderStats::bump(&stats.stored),
            Ok(Err(e)) => {
                RecorderStats::bump(&stats.failed);
                warn!("Failed to record {} of {}: {}", name, thing_id, e);
            }
            Err(e) => {
                RecorderStats::bump(&stats.failed);
                error!("Recording {} of {} panicked: {}", name, thing_id, e);
            }
        }
    }

    debug!("Recorder worker {} stopped", id);
}
