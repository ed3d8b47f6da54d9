use thiserror::Error;

/// Errors from the reasoner gateway: transport, schema, and repair-pass
/// failures. Not used for capability preconditions — those are data, not
/// errors; see [`CapabilityError`].
#[derive(Debug, Error)]
pub enum ReasonerError {
    #[error("reasoner transport failed: {0}")]
    Transport(String),

    #[error("reasoner returned a client error (not retried): {0}")]
    ClientError(String),

    #[error("could not parse reasoner response as JSON even after a repair attempt: {0}")]
    SchemaViolation(String),

    #[error("tool {0} is not declared for this call")]
    UnknownTool(String),

    #[error("tool {tool} handler failed: {reason}")]
    ToolFailed { tool: String, reason: String },
}

/// Errors raised by a capability handler itself (not precondition failures,
/// which are returned as `CapabilityOutcome::Failure` data so the reasoner
/// can react to them).
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("reasoner call failed: {0}")]
    Reasoner(#[from] ReasonerError),

    #[error("runtime call failed: {0}")]
    Runtime(#[from] nightwatch_runtime::RuntimeError),

    #[error("core error: {0}")]
    Core(#[from] nightwatch_core::CoreError),

    #[error("human interaction failed: {0}")]
    Human(String),

    #[error("knowledge store error: {0}")]
    Knowledge(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to parse container topology: {0}")]
    TopologyParse(#[from] serde_yaml::Error),

    #[error("topology file {0} declares no services")]
    EmptyTopology(String),
}
