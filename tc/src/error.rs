//! Errors surfaced by the coordination core

use thiserror::Error;

/// Errors from coordinator operations.
///
/// Note the deliberate absences: a dead subscriber is not an error (it is
/// pruned silently), and a failing `handle_event` is logged and contained
/// rather than propagated - the coordinator keeps running regardless of
/// individual subscriber health.
#[derive(Debug, Error)]
pub enum CoordError {
    /// The timer loop was started twice for one coordinator.
    #[error("timer loop already running")]
    TimerLoopRunning,

    /// A timer was configured with a zero interval.
    #[error("timer interval must be non-zero")]
    ZeroInterval,
}
