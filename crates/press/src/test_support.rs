//! Shared test doubles standing in for the Ghostscript engine.

use crate::engine::{Engine, EngineError, EngineProvider, TransformRequest, TransformResponse};
use crate::notify::PreviewSink;
use crate::quality::QualityLevel;
use crate::session::SessionError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Per-level scripted outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LevelBehavior {
    /// Return the first half of the input.
    Shrink,
    /// Return 120% of the input size.
    Grow,
    /// Fail with a non-zero exit code.
    Fail,
}

/// Script controlling every engine instance a provider creates.
#[derive(Debug, Default)]
pub(crate) struct EngineScript {
    /// Blocking delay per invocation.
    pub delay: Option<Duration>,
    /// Behavior per level; `Shrink` when absent.
    pub behaviors: HashMap<QualityLevel, LevelBehavior>,
    /// Respond with a fresh correlation id instead of echoing the request's.
    pub misroute_responses: bool,
}

impl EngineScript {
    pub fn with_delay(ms: u64) -> Self {
        Self {
            delay: Some(Duration::from_millis(ms)),
            ..Self::default()
        }
    }

    pub fn behavior(mut self, level: QualityLevel, behavior: LevelBehavior) -> Self {
        self.behaviors.insert(level, behavior);
        self
    }
}

/// Provider handing out scripted engines; shared counters survive reinits.
pub(crate) struct ScriptedProvider {
    script: Arc<EngineScript>,
    pub provisions: Arc<AtomicU32>,
    pub invoked: Arc<Mutex<Vec<QualityLevel>>>,
    pub active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new(script: EngineScript) -> Self {
        Self {
            script: Arc::new(script),
            provisions: Arc::new(AtomicU32::new(0)),
            invoked: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn provisions(&self) -> u32 {
        self.provisions.load(Ordering::SeqCst)
    }

    pub fn invocation_order(&self) -> Vec<QualityLevel> {
        self.invoked.lock().unwrap().clone()
    }

    pub fn invocations(&self) -> usize {
        self.invoked.lock().unwrap().len()
    }

    pub fn invocations_for(&self, level: QualityLevel) -> usize {
        self.invoked.lock().unwrap().iter().filter(|&&l| l == level).count()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl EngineProvider for ScriptedProvider {
    fn provision(&self) -> Result<Box<dyn Engine>, EngineError> {
        self.provisions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedEngine {
            script: Arc::clone(&self.script),
            invoked: Arc::clone(&self.invoked),
            active: Arc::clone(&self.active),
            max_active: Arc::clone(&self.max_active),
        }))
    }
}

struct ScriptedEngine {
    script: Arc<EngineScript>,
    invoked: Arc<Mutex<Vec<QualityLevel>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl Engine for ScriptedEngine {
    fn transform(&mut self, request: &TransformRequest) -> Result<TransformResponse, EngineError> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.invoked.lock().unwrap().push(request.quality);

        if let Some(delay) = self.script.delay {
            std::thread::sleep(delay);
        }

        let behavior = self
            .script
            .behaviors
            .get(&request.quality)
            .copied()
            .unwrap_or(LevelBehavior::Shrink);

        let input = request.input.as_ref();
        let result = match behavior {
            LevelBehavior::Shrink => Ok(input[..input.len() / 2].to_vec()),
            LevelBehavior::Grow => {
                let mut output = input.clone();
                if input.is_empty() {
                    output.push(0);
                } else {
                    let extra = (input.len() / 5).max(1);
                    output.extend_from_slice(&input[..extra]);
                }
                Ok(output)
            }
            LevelBehavior::Fail => Err(EngineError::Failed(1)),
        };

        self.active.fetch_sub(1, Ordering::SeqCst);

        result.map(|output| TransformResponse {
            correlation_id: if self.script.misroute_responses {
                Uuid::new_v4()
            } else {
                request.correlation_id
            },
            input_bytes: input.len() as u64,
            output_bytes: output.len() as u64,
            output,
        })
    }
}

/// Notification recorded by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SinkEvent {
    Ready(QualityLevel, u64),
    Failed(QualityLevel),
    Unlocked(QualityLevel, Option<u64>),
}

/// Sink capturing every notification for later assertions.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn ready_levels(&self) -> Vec<QualityLevel> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Ready(level, _) => Some(level),
                _ => None,
            })
            .collect()
    }

    pub fn unlocked(&self) -> Vec<(QualityLevel, Option<u64>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Unlocked(level, size) => Some((level, size)),
                _ => None,
            })
            .collect()
    }
}

impl PreviewSink for RecordingSink {
    fn on_preview_ready(&self, level: QualityLevel, _payload: &Arc<Vec<u8>>, bytes: u64) {
        self.events.lock().unwrap().push(SinkEvent::Ready(level, bytes));
    }

    fn on_preview_failed(&self, level: QualityLevel, _error: &SessionError) {
        self.events.lock().unwrap().push(SinkEvent::Failed(level));
    }

    fn on_level_unlocked(&self, level: QualityLevel, size_hint: Option<u64>) {
        self.events.lock().unwrap().push(SinkEvent::Unlocked(level, size_hint));
    }
}
