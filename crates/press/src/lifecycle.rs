//! Engine lifecycle management.
//!
//! Wraps an opaque engine instance and bounds the blast radius of internal
//! state it may accumulate: after a fixed number of invocations the engine
//! is fully reinitialized, and any failure forces reinitialization on the
//! very next call. Responses are routed back by correlation id.

use crate::engine::{EngineError, EngineProvider, TransformRequest, TransformResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Invocations allowed on one engine instance before a forced reinit.
pub const REINIT_THRESHOLD: u32 = 3;

/// Sentinel forced onto the counter after a failure so the next invocation
/// unconditionally reinitializes.
const POISONED: u32 = u32::MAX;

/// Engine instance wrapper enforcing the periodic-reinitialization policy.
pub struct EngineLifecycle {
    provider: Arc<dyn EngineProvider>,
    engine: Option<Box<dyn crate::engine::Engine>>,
    invocations: u32,
    invoke_timeout: Option<Duration>,
}

impl EngineLifecycle {
    /// Create a lifecycle around `provider`.
    ///
    /// `invoke_timeout` bounds each invocation; `None` leaves invocations
    /// unbounded and a hung engine blocks its queue slot indefinitely.
    pub fn new(provider: Arc<dyn EngineProvider>, invoke_timeout: Option<Duration>) -> Self {
        Self {
            provider,
            engine: None,
            invocations: 0,
            invoke_timeout,
        }
    }

    /// Number of successful invocations on the current instance.
    pub fn invocations(&self) -> u32 {
        self.invocations
    }

    /// Provision a fresh engine instance if needed.
    ///
    /// Reinitializes when no instance exists, when `force` is set, or when
    /// the invocation counter has reached [`REINIT_THRESHOLD`].
    pub fn ensure_ready(&mut self, force: bool) -> Result<(), EngineError> {
        if force || self.engine.is_none() || self.invocations >= REINIT_THRESHOLD {
            // Drop the old instance first so its staging state is released
            // before the replacement provisions its own.
            self.engine = None;
            self.engine = Some(self.provider.provision()?);
            self.invocations = 0;
            debug!(force, "engine reinitialized");
        }
        Ok(())
    }

    /// Execute one transformation against the wrapped engine.
    ///
    /// Runs the blocking engine call on the blocking pool. On failure the
    /// counter is poisoned and the error propagates; the next invocation
    /// reinitializes. A response whose correlation id does not match the
    /// request is logged and surfaced as a routing error.
    pub async fn invoke(
        &mut self,
        request: TransformRequest,
    ) -> Result<TransformResponse, EngineError> {
        self.ensure_ready(false)?;

        let mut engine = self.engine.take().expect("engine provisioned by ensure_ready");
        let expected = request.correlation_id;

        let task = tokio::task::spawn_blocking(move || {
            let result = engine.transform(&request);
            (engine, result)
        });

        let joined = match self.invoke_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    // The blocking call is detached; its instance is gone
                    // and the next invocation provisions a fresh one.
                    self.invocations = POISONED;
                    warn!(?limit, %expected, "engine invocation timed out");
                    return Err(EngineError::TimedOut(limit));
                }
            },
            None => task.await,
        };

        let (engine, result) = match joined {
            Ok(pair) => pair,
            Err(join_err) => {
                self.invocations = POISONED;
                return Err(EngineError::Panicked(join_err.to_string()));
            }
        };
        self.engine = Some(engine);

        match result {
            Ok(response) => {
                if response.correlation_id != expected {
                    self.invocations = POISONED;
                    warn!(
                        %expected,
                        got = %response.correlation_id,
                        "dropping response with unrecognized correlation id"
                    );
                    return Err(EngineError::ResponseMismatch {
                        expected,
                        got: response.correlation_id,
                    });
                }
                self.invocations = self.invocations.saturating_add(1);
                Ok(response)
            }
            Err(err) => {
                self.invocations = POISONED;
                Err(err)
            }
        }
    }
}
