//! Engine abstraction for pdf-press
//!
//! The transformation engine is opaque to the scheduling core: it takes
//! bytes plus parameters and returns bytes or fails. The core assumes
//! nothing beyond "not reentrant, may accumulate state, may fail". Requests
//! and responses carry a correlation id so the caller can verify that a
//! response belongs to the invocation that is waiting for it.

pub mod ghostscript;

use crate::quality::QualityLevel;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Error type for engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine process exited with non-zero status
    #[error("Engine failed with exit code: {0}")]
    Failed(i32),

    /// Engine process was terminated by signal
    #[error("Engine process was terminated by signal")]
    Terminated,

    /// Engine produced an empty output document
    #[error("Engine produced empty output")]
    EmptyOutput,

    /// Response carried a correlation id that no pending request recognizes
    #[error("Response correlation id {got} does not match pending request {expected}")]
    ResponseMismatch { expected: Uuid, got: Uuid },

    /// Invocation exceeded the configured time limit
    #[error("Engine invocation exceeded {0:?}")]
    TimedOut(Duration),

    /// Engine task panicked on the blocking pool
    #[error("Engine task panicked: {0}")]
    Panicked(String),

    /// IO error staging bytes in or out of the engine
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One transformation request: correlation id, payload, and parameters.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    /// Unique correlation id echoed by the response.
    pub correlation_id: Uuid,
    /// Input document bytes.
    pub input: Arc<Vec<u8>>,
    /// Quality preset to apply.
    pub quality: QualityLevel,
    /// Optional image resolution override in dpi.
    pub image_dpi_override: Option<u32>,
}

impl TransformRequest {
    pub fn new(input: Arc<Vec<u8>>, quality: QualityLevel, image_dpi_override: Option<u32>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            input,
            quality,
            image_dpi_override,
        }
    }
}

/// Successful transformation response.
#[derive(Debug)]
pub struct TransformResponse {
    /// Correlation id of the request this response answers.
    pub correlation_id: Uuid,
    /// Transformed document bytes.
    pub output: Vec<u8>,
    /// Size of the input document.
    pub input_bytes: u64,
    /// Size of the output document.
    pub output_bytes: u64,
}

/// An opaque transformation engine instance.
///
/// `transform` is blocking and must run on the blocking pool; instances are
/// not reentrant, so callers must never run two transformations on the same
/// instance concurrently. Dropping an instance releases any engine-owned
/// staging resources.
pub trait Engine: Send {
    fn transform(&mut self, request: &TransformRequest) -> Result<TransformResponse, EngineError>;
}

/// Factory producing fresh engine instances.
///
/// Used for initial provisioning and for every reinitialization.
pub trait EngineProvider: Send + Sync {
    fn provision(&self) -> Result<Box<dyn Engine>, EngineError>;
}
