//! pdf-press
//!
//! Job scheduling, cancellation, and result-caching layer for offloading
//! PDF compression to an isolated Ghostscript process. A single-concurrency
//! FIFO queue serializes engine work, a generation counter lets newer
//! requests supersede stale ones without aborting in-flight jobs, and a
//! pausable preload pass warms the remaining quality levels in the
//! background.

pub mod cache;
pub mod engine;
pub mod generation;
pub mod lifecycle;
pub mod notify;
pub mod preload;
pub mod quality;
pub mod queue;
pub mod session;
pub mod size_guard;
pub mod startup;

#[cfg(test)]
pub(crate) mod test_support;

pub use pdf_press_config as config;
pub use pdf_press_config::Config;

pub use cache::{CacheEntry, PreviewHandle, ResultCache};
pub use engine::ghostscript::{build_gs_command, GhostscriptEngine, GhostscriptProvider};
pub use engine::{Engine, EngineError, EngineProvider, TransformRequest, TransformResponse};
pub use generation::{Generation, GenerationCounter};
pub use lifecycle::{EngineLifecycle, REINIT_THRESHOLD};
pub use notify::{NullSink, PreviewSink};
pub use preload::{PreloadControl, PreloadPhase, PreloadPlan};
pub use quality::{ParseQualityError, QualityLevel, ALL_LEVELS, PRELOAD_ORDER};
pub use queue::{JobError, JobQueue, JobTicket, QueueStats};
pub use session::{LevelStatus, LevelSummary, Session, SessionError};
pub use size_guard::SizeVerdict;
pub use startup::{
    check_ghostscript_available, check_ghostscript_version, parse_gs_version,
    run_startup_checks, StartupError,
};
