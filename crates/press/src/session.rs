//! Controller-facing session.
//!
//! Wires user intent to the scheduling core: generation stamping for
//! user-driven requests, the pending set that deduplicates user and preload
//! submissions, the result cache, and the preload pass. All shared state is
//! mutated inside short critical sections on one mutex, never across a
//! suspension point; pending-set insertion precedes job submission and the
//! cache write precedes pending-set removal, so no duplicate submission can
//! race in between.

use crate::cache::{PreviewHandle, ResultCache};
use crate::engine::EngineProvider;
use crate::generation::{Generation, GenerationCounter};
use crate::notify::PreviewSink;
use crate::preload::{PreloadControl, PreloadPhase, PreloadPlan};
use crate::quality::{QualityLevel, ALL_LEVELS};
use crate::queue::{JobError, JobQueue, JobTicket, QueueStats};
use crate::size_guard::{self, SizeVerdict};
use pdf_press_config::Config;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Error type for session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// No document has been loaded yet
    #[error("No document loaded")]
    NoDocument,

    /// The underlying job failed or was abandoned
    #[error(transparent)]
    Job(#[from] JobError),

    /// A joined request settled without a cached result
    #[error("Quality level {level} failed: {reason}")]
    LevelFailed {
        level: QualityLevel,
        reason: String,
    },

    /// Materializing the preview resource failed
    #[error("Preview resource error: {0}")]
    Preview(#[source] std::io::Error),
}

/// Status of one quality level in a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelStatus {
    /// Computed and held in the cache.
    Cached,
    /// Submitted but not yet settled.
    Pending,
    /// Previously failed; retried on the next user request.
    Failed,
    /// Not yet computed; available on demand.
    OnDemand,
}

/// Per-level status row for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelSummary {
    pub level: QualityLevel,
    pub status: LevelStatus,
    pub bytes: Option<u64>,
}

/// A level submitted but not yet settled.
struct PendingEntry {
    /// Latest user-driven presentation intent for this level, if any.
    present: Option<Generation>,
    /// Signals joined callers when the level settles.
    settled: watch::Sender<bool>,
}

struct DocumentState {
    /// Bumped on every document load; continuations settling under an older
    /// epoch discard their result entirely.
    epoch: u64,
    input: Option<Arc<Vec<u8>>>,
    cache: ResultCache,
    pending: HashMap<QualityLevel, PendingEntry>,
    failed: HashMap<QualityLevel, String>,
}

/// Scheduling session for one active document at a time.
///
/// Must be created within a Tokio runtime; the queue worker and preload
/// pass run as background tasks.
pub struct Session {
    queue: JobQueue,
    generations: GenerationCounter,
    sink: Arc<dyn PreviewSink>,
    preview_dir: PathBuf,
    plan: PreloadPlan,
    control: PreloadControl,
    image_dpi_override: Option<u32>,
    state: Mutex<DocumentState>,
}

impl Session {
    pub fn new(
        config: &Config,
        provider: Arc<dyn EngineProvider>,
        sink: Arc<dyn PreviewSink>,
    ) -> Self {
        let invoke_timeout = match config.engine.invoke_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Self {
            queue: JobQueue::new(provider, invoke_timeout),
            generations: GenerationCounter::new(),
            sink,
            preview_dir: config.engine.staging_dir.join("previews"),
            plan: PreloadPlan::from_config(&config.preload),
            control: PreloadControl::new(),
            image_dpi_override: None,
            state: Mutex::new(DocumentState {
                epoch: 0,
                input: None,
                cache: ResultCache::new(),
                pending: HashMap::new(),
                failed: HashMap::new(),
            }),
        }
    }

    /// Set a session-wide image resolution override passed to the engine.
    pub fn with_image_dpi(mut self, dpi: Option<u32>) -> Self {
        self.image_dpi_override = dpi;
        self
    }

    /// Load a new document, discarding everything belonging to the previous
    /// one: queued and in-flight jobs, cached results, failure records.
    ///
    /// The unmodified document is presented immediately.
    pub fn load_document(&self, bytes: Vec<u8>) {
        let input = Arc::new(bytes);
        let input_bytes = input.len() as u64;
        {
            let mut state = self.state.lock().unwrap();
            state.epoch += 1;
            self.generations.bump();
            state.pending.clear();
            state.failed.clear();
            state.cache.clear();
            state.input = Some(Arc::clone(&input));
        }
        self.queue.reset();
        info!(bytes = input_bytes, "document loaded");

        self.sink
            .on_level_unlocked(QualityLevel::Original, Some(input_bytes));
        self.sink
            .on_preview_ready(QualityLevel::Original, &input, input_bytes);
    }

    /// Discard every transient result for the current document.
    pub fn reset(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.epoch += 1;
            self.generations.bump();
            state.pending.clear();
            state.failed.clear();
            state.cache.clear();
        }
        self.queue.reset();
        info!("session reset");
    }

    /// Suppress presentation of anything currently in flight.
    ///
    /// In-flight work is not interrupted; its result is still cached for
    /// later reuse, it just never reaches the sink.
    pub fn cancel(&self) {
        self.generations.bump();
        debug!("pending presentations cancelled");
    }

    /// User-driven quality switch.
    ///
    /// Serves from the cache, joins an already-pending request for the same
    /// level, or submits a new job. Failures surface to the caller; a
    /// previously failed level is retried.
    pub async fn set_quality(&self, level: QualityLevel) -> Result<Arc<Vec<u8>>, SessionError> {
        let generation = self.generations.bump();
        self.obtain(level, Some(generation)).await
    }

    async fn obtain(
        &self,
        level: QualityLevel,
        present: Option<Generation>,
    ) -> Result<Arc<Vec<u8>>, SessionError> {
        enum Step {
            Serve(Arc<Vec<u8>>),
            Wait { rx: watch::Receiver<bool>, epoch: u64 },
            Execute { ticket: JobTicket, input: Arc<Vec<u8>>, epoch: u64 },
        }

        let step = {
            let mut state = self.state.lock().unwrap();
            let input = state.input.clone().ok_or(SessionError::NoDocument)?;

            if level.bypasses_engine() {
                Step::Serve(input)
            } else if let Some(entry) = state.cache.get(level) {
                Step::Serve(entry.payload())
            } else if let Some(entry) = state.pending.get_mut(&level) {
                // Another call path owns this level already; join its settle
                // and re-stamp the presentation intent.
                if present.is_some() {
                    entry.present = present;
                }
                Step::Wait {
                    rx: entry.settled.subscribe(),
                    epoch: state.epoch,
                }
            } else {
                state.failed.remove(&level);
                let (settled, _) = watch::channel(false);
                state.pending.insert(level, PendingEntry { present, settled });
                // Submission happens after the pending insertion, inside the
                // same critical section, so a racing caller can only ever
                // observe this level as pending.
                let ticket = self
                    .queue
                    .submit(Arc::clone(&input), level, self.image_dpi_override);
                Step::Execute {
                    ticket,
                    input,
                    epoch: state.epoch,
                }
            }
        };

        match step {
            Step::Serve(payload) => {
                let bytes = payload.len() as u64;
                if let Some(generation) = present {
                    if self.generations.is_current(generation) {
                        self.sink.on_preview_ready(level, &payload, bytes);
                    }
                }
                Ok(payload)
            }
            Step::Wait { mut rx, epoch } => {
                let _ = rx.changed().await;
                self.after_settle(level, epoch)
            }
            Step::Execute {
                ticket,
                input,
                epoch,
            } => self.execute(level, ticket, input, epoch).await,
        }
    }

    /// Resolve a joined request after the owning submission settled.
    fn after_settle(&self, level: QualityLevel, epoch: u64) -> Result<Arc<Vec<u8>>, SessionError> {
        let state = self.state.lock().unwrap();
        if state.epoch != epoch {
            return Err(JobError::Abandoned.into());
        }
        if let Some(entry) = state.cache.get(level) {
            return Ok(entry.payload());
        }
        match state.failed.get(&level) {
            Some(reason) => Err(SessionError::LevelFailed {
                level,
                reason: reason.clone(),
            }),
            None => Err(JobError::Abandoned.into()),
        }
    }

    /// Drive one owned submission to its settle.
    async fn execute(
        &self,
        level: QualityLevel,
        ticket: JobTicket,
        input: Arc<Vec<u8>>,
        epoch: u64,
    ) -> Result<Arc<Vec<u8>>, SessionError> {
        match ticket.outcome().await {
            Ok(response) => {
                let (payload, verdict) = size_guard::apply(&input, response.output);
                if let SizeVerdict::KeptOriginal { output_bytes, .. } = verdict {
                    debug!(
                        %level,
                        output_bytes,
                        "engine output not smaller than input; keeping original"
                    );
                }

                // Materialized outside the state lock; the handle removes its
                // file on drop if the document changed meanwhile.
                let handle = match PreviewHandle::materialize(&self.preview_dir, level, &payload) {
                    Ok(handle) => handle,
                    Err(err) => {
                        return self.settle_failure(level, epoch, SessionError::Preview(err))
                    }
                };

                let bytes = payload.len() as u64;
                let present = {
                    let mut state = self.state.lock().unwrap();
                    if state.epoch != epoch {
                        return Err(JobError::Abandoned.into());
                    }
                    // Cache write precedes pending removal; a racing caller
                    // sees the level as cached or pending, never neither.
                    state.cache.insert(level, Arc::clone(&payload), handle);
                    let entry = state.pending.remove(&level);
                    entry.and_then(|entry| {
                        let _ = entry.settled.send(true);
                        entry.present
                    })
                };

                self.sink.on_level_unlocked(level, Some(bytes));
                match present {
                    Some(generation) if self.generations.is_current(generation) => {
                        self.sink.on_preview_ready(level, &payload, bytes);
                    }
                    Some(_) => {
                        debug!(%level, "stale result cached without presentation");
                    }
                    None => {}
                }

                Ok(payload)
            }
            Err(err) => self.settle_failure(level, epoch, SessionError::Job(err)),
        }
    }

    /// Record a failed settle and notify, unless the document changed.
    fn settle_failure(
        &self,
        level: QualityLevel,
        epoch: u64,
        error: SessionError,
    ) -> Result<Arc<Vec<u8>>, SessionError> {
        let present = {
            let mut state = self.state.lock().unwrap();
            if state.epoch != epoch {
                return Err(JobError::Abandoned.into());
            }
            let entry = state.pending.remove(&level);
            state.failed.insert(level, error.to_string());
            entry.and_then(|entry| {
                let _ = entry.settled.send(true);
                entry.present
            })
        };

        self.sink.on_level_unlocked(level, None);
        if let Some(generation) = present {
            if self.generations.is_current(generation) {
                self.sink.on_preview_failed(level, &error);
            }
        }
        Err(error)
    }

    /// Start a preload pass over every engine-backed level.
    ///
    /// No-op while a pass is already running. Levels already cached,
    /// pending, or previously failed are skipped; a paused pass resumed
    /// later therefore continues from the first unsatisfied level.
    pub fn start_preload(self: Arc<Self>) {
        if !self.control.begin() {
            debug!("preload pass already running");
            return;
        }
        tokio::spawn(async move { self.preload_pass().await });
    }

    /// Ask a running pass to stop at its next check point.
    pub fn pause_preload(&self) {
        self.control.request_pause();
    }

    /// Resume a paused pass from the first unsatisfied level.
    pub fn resume_preload(self: Arc<Self>) {
        self.start_preload();
    }

    pub fn preload_phase(&self) -> PreloadPhase {
        self.control.phase()
    }

    async fn preload_pass(&self) {
        let epoch = match self.pass_epoch() {
            Some(epoch) => epoch,
            None => {
                self.control.settle(PreloadPhase::Idle);
                return;
            }
        };
        info!("preload pass started");

        for &level in &self.plan.levels {
            if let Some(next) = self.stop_phase(epoch) {
                self.control.settle(next);
                info!(phase = ?next, "preload pass stopped");
                return;
            }
            if !self.wants(level) {
                continue;
            }

            match self.obtain(level, None).await {
                Ok(payload) => {
                    debug!(%level, bytes = payload.len(), "preload level complete");
                }
                Err(err) => {
                    // Recorded as available on demand; the pass moves on.
                    warn!(%level, error = %err, "preload level failed");
                    tokio::time::sleep(self.plan.failure_backoff).await;
                }
            }

            if let Some(next) = self.stop_phase(epoch) {
                self.control.settle(next);
                info!(phase = ?next, "preload pass stopped");
                return;
            }
            tokio::time::sleep(self.plan.throttle).await;
        }

        self.control.settle(PreloadPhase::Idle);
        info!("preload pass complete");
    }

    fn pass_epoch(&self) -> Option<u64> {
        let state = self.state.lock().unwrap();
        state.input.as_ref().map(|_| state.epoch)
    }

    /// Phase to stop in, if the pass must stop now.
    fn stop_phase(&self, epoch: u64) -> Option<PreloadPhase> {
        if self.control.pause_requested() {
            return Some(PreloadPhase::Paused);
        }
        if self.state.lock().unwrap().epoch != epoch {
            // Document changed; resuming would serve the wrong document.
            return Some(PreloadPhase::Idle);
        }
        None
    }

    fn wants(&self, level: QualityLevel) -> bool {
        let state = self.state.lock().unwrap();
        !state.cache.has(level)
            && !state.pending.contains_key(&level)
            && !state.failed.contains_key(&level)
    }

    pub fn document_loaded(&self) -> bool {
        self.state.lock().unwrap().input.is_some()
    }

    pub fn is_cached(&self, level: QualityLevel) -> bool {
        let state = self.state.lock().unwrap();
        if level.bypasses_engine() {
            return state.input.is_some();
        }
        state.cache.has(level)
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Per-level status rows, sentinel included.
    pub fn summary(&self) -> Vec<LevelSummary> {
        let state = self.state.lock().unwrap();
        ALL_LEVELS
            .iter()
            .map(|&level| {
                if level.bypasses_engine() {
                    let bytes = state.input.as_ref().map(|input| input.len() as u64);
                    LevelSummary {
                        level,
                        status: if bytes.is_some() {
                            LevelStatus::Cached
                        } else {
                            LevelStatus::OnDemand
                        },
                        bytes,
                    }
                } else if let Some(bytes) = state.cache.size_of(level) {
                    LevelSummary {
                        level,
                        status: LevelStatus::Cached,
                        bytes: Some(bytes),
                    }
                } else if state.pending.contains_key(&level) {
                    LevelSummary {
                        level,
                        status: LevelStatus::Pending,
                        bytes: None,
                    }
                } else if state.failed.contains_key(&level) {
                    LevelSummary {
                        level,
                        status: LevelStatus::Failed,
                        bytes: None,
                    }
                } else {
                    LevelSummary {
                        level,
                        status: LevelStatus::OnDemand,
                        bytes: None,
                    }
                }
            })
            .collect()
    }
}
