//! Decision recorder.
//!
//! `DecisionRecorder` is a cloneable handle over a bounded queue. A single
//! worker task drains it and appends each decision to the `DecisionLog` with
//! bounded retry. Enqueueing never waits: when the queue is full the decision
//! is dropped and counted, since losing an audit record is tolerable and
//! blocking a page render is not.

use crate::retry::{retry_transient, Backoff};
use placement_core::{AllocationDecision, DecisionLog, RecorderConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Upper bound on the delay between write attempts.
const MAX_BACKOFF_MS: u64 = 1_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("decision queue is full")]
    QueueFull,

    #[error("decision recorder has shut down")]
    Closed,
}

enum RecorderCommand {
    Record(Box<AllocationDecision>),
    Flush(oneshot::Sender<()>),
}

/// Running totals for the recorder.
#[derive(Debug, Default)]
pub struct RecorderStats {
    recorded: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl RecorderStats {
    #[must_use]
    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    /// Decisions rejected because the queue was full or closed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Decisions whose writes failed after every retry.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct DecisionRecorder {
    tx: mpsc::Sender<RecorderCommand>,
    stats: Arc<RecorderStats>,
}

impl DecisionRecorder {
    /// Starts the writer task and returns the handle to it.
    ///
    /// The task exits once every handle is dropped and the queue is drained.
    #[must_use]
    pub fn spawn(log: Arc<dyn DecisionLog>, config: RecorderConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let stats = Arc::new(RecorderStats::default());
        let backoff = Backoff::new(config.max_attempts, config.base_backoff_ms, MAX_BACKOFF_MS);
        let worker = RecorderWorker {
            rx,
            log,
            backoff,
            stats: Arc::clone(&stats),
        };
        let handle = tokio::spawn(worker.run());
        (Self { tx, stats }, handle)
    }

    /// Queues a decision for writing. Never waits.
    ///
    /// # Errors
    /// Returns `RecordError::QueueFull` or `RecordError::Closed`; the decision
    /// is dropped in both cases.
    pub fn record(&self, decision: AllocationDecision) -> Result<(), RecordError> {
        let decision_id = decision.decision_id;
        match self.tx.try_send(RecorderCommand::Record(Box::new(decision))) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                let err = match e {
                    mpsc::error::TrySendError::Full(_) => RecordError::QueueFull,
                    mpsc::error::TrySendError::Closed(_) => RecordError::Closed,
                };
                error!(decision_id = %decision_id, error = %err, "decision dropped");
                Err(err)
            }
        }
    }

    /// Waits until every decision queued before this call has been handled.
    ///
    /// # Errors
    /// Returns `RecordError::Closed` if the worker has stopped.
    pub async fn flush(&self) -> Result<(), RecordError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(RecorderCommand::Flush(tx))
            .await
            .map_err(|_| RecordError::Closed)?;
        rx.await.map_err(|_| RecordError::Closed)
    }

    #[must_use]
    pub fn stats(&self) -> &RecorderStats {
        &self.stats
    }
}

struct RecorderWorker {
    rx: mpsc::Receiver<RecorderCommand>,
    log: Arc<dyn DecisionLog>,
    backoff: Backoff,
    stats: Arc<RecorderStats>,
}

impl RecorderWorker {
    async fn run(mut self) {
        info!("decision recorder started");

        while let Some(command) = self.rx.recv().await {
            match command {
                RecorderCommand::Record(decision) => self.write(&decision).await,
                RecorderCommand::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }

        info!(
            recorded = self.stats.recorded(),
            dropped = self.stats.dropped(),
            failed = self.stats.failed(),
            "decision recorder stopped"
        );
    }

    async fn write(&self, decision: &AllocationDecision) {
        let log = &self.log;
        match retry_transient(self.backoff, "decision write", || log.append(decision)).await {
            Ok(()) => {
                self.stats.recorded.fetch_add(1, Ordering::Relaxed);
                debug!(decision_id = %decision.decision_id, "decision recorded");
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    decision_id = %decision.decision_id,
                    placement = %decision.placement_slug,
                    error = %e,
                    "decision lost"
                );
            }
        }
    }
}
