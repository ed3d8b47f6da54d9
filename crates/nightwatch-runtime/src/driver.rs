use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// The subset of container state needed to classify an incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub failing_streak: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInspection {
    pub running: bool,
    pub oom_killed: bool,
    pub restart_count: i64,
    pub exit_code: i64,
    pub health: Option<HealthStatus>,
    pub memory_limit_bytes: Option<i64>,
    pub cpu_limit_nanos: Option<i64>,
    pub env_keys: Vec<String>,
    pub restart_policy: String,
    pub mounts: Vec<String>,
    pub network_mode: String,
    pub ports: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone)]
pub struct RawLogFrame {
    pub container: String,
    pub stream: LogStream,
    pub data: String,
}

/// Facade over a container engine. The only implementation carried in this
/// crate talks to the Docker Engine API via `bollard`; a deterministic stub
/// lives alongside it in tests.
///
/// Dyn-compatible by hand (`Pin<Box<dyn Future>>`) rather than via the
/// `async-trait` macro, matching the reasoner gateway's facade trait.
pub trait RuntimeDriver: Send + Sync {
    fn list_containers<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ContainerSummary>, RuntimeError>> + Send + 'a>>;

    fn inspect_container<'a>(
        &'a self,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ContainerInspection, RuntimeError>> + Send + 'a>>;

    /// Opens a multiplexed stdout/stderr stream starting from "now". Each
    /// yielded frame is one line; callers demux and batch further upstream.
    fn follow_logs<'a>(
        &'a self,
        name: &'a str,
    ) -> Pin<
        Box<
            dyn Future<
                    Output = Result<
                        futures::stream::BoxStream<'static, Result<RawLogFrame, RuntimeError>>,
                        RuntimeError,
                    >,
                > + Send
                + 'a,
        >,
    >;
}
