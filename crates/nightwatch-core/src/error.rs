use thiserror::Error;

/// Errors surfaced by the core crate: the data model, the command validator,
/// and the command executor. These are programmer/environment errors, not
/// the capability-level `{success: false, error}` values the pipeline passes
/// around as data — see `nightwatch-pipeline::error::PipelineError` for those.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid incident graph: {0}")]
    InvalidGraph(String),

    #[error("command execution failed to spawn: {0}")]
    SpawnFailed(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
