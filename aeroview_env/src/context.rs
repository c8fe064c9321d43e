//! Clock abstraction for AeroView controllers.

use async_trait::async_trait;
use std::time::{Duration, SystemTime};

/// The time source seen by vehicle controllers and the frame loop.
///
/// Implemented by `SimContext` in the simulation harness, a virtual clock
/// advanced one frame at a time. Poll timers and telemetry sample
/// timestamps are measured against `now()`, so every poll/frame
/// interleaving is reproducible.
#[async_trait]
pub trait ViewerContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time (for log correlation only).
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    async fn sleep(&self, duration: Duration);

    /// Convenience: `now()` in fractional seconds.
    fn now_secs(&self) -> f64 {
        self.now().as_secs_f64()
    }
}
