//! Single-concurrency FIFO job queue.
//!
//! Exactly one job executes against the engine at any time; the engine is
//! not reentrant, so this mutual exclusion is a hard invariant. Additional
//! submissions are queued in arrival order and drained one at a time by a
//! dedicated worker task as each job settles. `reset` tears the worker down,
//! abandoning queued and in-flight work, and spawns a fresh worker with a
//! fresh engine lifecycle.

use crate::engine::{EngineError, EngineProvider, TransformRequest, TransformResponse};
use crate::lifecycle::EngineLifecycle;
use crate::quality::QualityLevel;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Error type for job outcomes
#[derive(Debug, Error)]
pub enum JobError {
    /// Engine or transport failure while executing the job
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The queue was reset while the job was queued or in flight
    #[error("Job abandoned by queue reset")]
    Abandoned,
}

/// Snapshot of queue counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub abandoned: u64,
    pub queued: usize,
    pub in_flight: bool,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
}

/// Gauges scoped to one worker incarnation.
///
/// A replaced worker keeps decrementing its own gauges, never the fresh
/// worker's, so a reset cannot be raced into negative counts.
#[derive(Default)]
struct Gauges {
    queued: AtomicUsize,
    in_flight: AtomicBool,
}

/// Handle to a submitted job, resolving to its outcome.
pub struct JobTicket {
    correlation_id: Uuid,
    rx: oneshot::Receiver<Result<TransformResponse, JobError>>,
}

impl JobTicket {
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Wait for the job to settle.
    ///
    /// Resolves to [`JobError::Abandoned`] if the queue was reset before the
    /// job settled; callers must not assume every submission yields an
    /// engine outcome.
    pub async fn outcome(self) -> Result<TransformResponse, JobError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(JobError::Abandoned),
        }
    }
}

struct QueuedJob {
    request: TransformRequest,
    reply: oneshot::Sender<Result<TransformResponse, JobError>>,
}

struct WorkerLink {
    tx: mpsc::UnboundedSender<QueuedJob>,
    worker: JoinHandle<()>,
    gauges: Arc<Gauges>,
}

/// FIFO queue bound to exactly one concurrent engine execution.
pub struct JobQueue {
    link: Mutex<WorkerLink>,
    provider: Arc<dyn EngineProvider>,
    invoke_timeout: Option<Duration>,
    counters: Arc<Counters>,
}

impl JobQueue {
    /// Create the queue and spawn its worker task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(provider: Arc<dyn EngineProvider>, invoke_timeout: Option<Duration>) -> Self {
        let counters = Arc::new(Counters::default());
        let link = Self::spawn_worker(&provider, invoke_timeout, &counters);
        Self {
            link: Mutex::new(link),
            provider,
            invoke_timeout,
            counters,
        }
    }

    fn spawn_worker(
        provider: &Arc<dyn EngineProvider>,
        invoke_timeout: Option<Duration>,
        counters: &Arc<Counters>,
    ) -> WorkerLink {
        let (tx, rx) = mpsc::unbounded_channel();
        let gauges = Arc::new(Gauges::default());
        let lifecycle = EngineLifecycle::new(Arc::clone(provider), invoke_timeout);
        let worker = tokio::spawn(worker_loop(
            rx,
            lifecycle,
            Arc::clone(counters),
            Arc::clone(&gauges),
        ));
        WorkerLink { tx, worker, gauges }
    }

    /// Submit a job for `quality` over `input`.
    ///
    /// If nothing is in flight the job starts immediately; otherwise it is
    /// appended behind every job already waiting, never reordered.
    pub fn submit(
        &self,
        input: Arc<Vec<u8>>,
        quality: QualityLevel,
        image_dpi_override: Option<u32>,
    ) -> JobTicket {
        let request = TransformRequest::new(input, quality, image_dpi_override);
        let correlation_id = request.correlation_id;
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = QueuedJob {
            request,
            reply: reply_tx,
        };

        let link = self.link.lock().unwrap();
        self.counters.submitted.fetch_add(1, Ordering::SeqCst);
        if link.tx.send(job).is_ok() {
            link.gauges.queued.fetch_add(1, Ordering::SeqCst);
            debug!(%correlation_id, %quality, "job submitted");
        } else {
            // Worker gone; the dropped job resolves the ticket as abandoned.
            self.counters.abandoned.fetch_add(1, Ordering::SeqCst);
            warn!(%correlation_id, "job submitted to a dead worker");
        }

        JobTicket {
            correlation_id,
            rx: reply_rx,
        }
    }

    /// Discard the engine, abandon all queued and in-flight jobs, and return
    /// to an empty, not-in-flight state.
    ///
    /// Abandoned tickets resolve to [`JobError::Abandoned`]; no job outcome
    /// is ever delivered for them. Engine-owned staging resources are
    /// released with the discarded engine instance.
    pub fn reset(&self) {
        let mut link = self.link.lock().unwrap();
        link.worker.abort();

        let queued = link.gauges.queued.load(Ordering::SeqCst) as u64;
        let in_flight = link.gauges.in_flight.load(Ordering::SeqCst) as u64;
        self.counters
            .abandoned
            .fetch_add(queued + in_flight, Ordering::SeqCst);

        *link = Self::spawn_worker(&self.provider, self.invoke_timeout, &self.counters);
        info!(abandoned = queued + in_flight, "job queue reset");
    }

    /// Number of jobs waiting or about to run.
    pub fn queued(&self) -> usize {
        self.link.lock().unwrap().gauges.queued.load(Ordering::SeqCst)
    }

    /// Whether a job is currently executing against the engine.
    pub fn in_flight(&self) -> bool {
        self.link.lock().unwrap().gauges.in_flight.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.counters.submitted.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            abandoned: self.counters.abandoned.load(Ordering::SeqCst),
            queued: self.queued(),
            in_flight: self.in_flight(),
        }
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        if let Ok(link) = self.link.lock() {
            link.worker.abort();
        }
    }
}

/// Worker task: drains the channel one job at a time.
///
/// The sequential loop is what guarantees both FIFO order and mutual
/// exclusion; a queue-level failure settles its job and the loop proceeds
/// with the next one regardless.
async fn worker_loop(
    mut rx: mpsc::UnboundedReceiver<QueuedJob>,
    mut lifecycle: EngineLifecycle,
    counters: Arc<Counters>,
    gauges: Arc<Gauges>,
) {
    while let Some(job) = rx.recv().await {
        gauges.queued.fetch_sub(1, Ordering::SeqCst);
        gauges.in_flight.store(true, Ordering::SeqCst);

        let correlation_id = job.request.correlation_id;
        let quality = job.request.quality;
        let outcome = lifecycle.invoke(job.request).await;

        gauges.in_flight.store(false, Ordering::SeqCst);
        match &outcome {
            Ok(response) => {
                counters.completed.fetch_add(1, Ordering::SeqCst);
                debug!(
                    %correlation_id,
                    %quality,
                    output_bytes = response.output_bytes,
                    "job complete"
                );
            }
            Err(err) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                warn!(%correlation_id, %quality, error = %err, "job failed");
            }
        }

        // The submitter may have stopped listening; that is not an error.
        let _ = job.reply.send(outcome.map_err(JobError::Engine));
    }
}
