use frameflow_arena::ArenaError;
use frameflow_core::FrameShape;
use thiserror::Error;

/// Precondition errors surfaced to the caller of [`crate::Controller::start`].
/// Runtime anomalies after a job has started are never surfaced through this
/// type — they show up as stalled progress and a `check_health() == false`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to open source '{path}': {reason}")]
    SourceOpenFailed { path: String, reason: String },

    #[error("failed to read the first frame from '{path}'")]
    FirstFrameReadFailed { path: String },

    #[error("decoded frame has a degenerate shape {shape}")]
    DegenerateShape { shape: FrameShape },

    #[error("allocating arena '{name}' failed: {source}")]
    ArenaAllocationFailed {
        name: String,
        #[source]
        source: ArenaError,
    },

    #[error("slot_count {have} is insufficient for {need} workers (need slot_count >= worker_count + 2)")]
    InsufficientSlots { have: usize, need: usize },

    #[error("failed to open destination '{path}': {reason}")]
    DestinationOpenFailed { path: String, reason: String },
}
