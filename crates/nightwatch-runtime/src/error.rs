use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("runtime connection failed: {0}")]
    ConnectionFailed(String),

    #[error("inspect failed: {0}")]
    InspectFailed(String),

    #[error("log stream failed: {0}")]
    LogStreamFailed(String),

    #[error("topology error: {0}")]
    TopologyError(String),

    #[error(transparent)]
    Bollard(#[from] bollard::errors::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
