pub mod docker;
pub mod driver;
pub mod error;
pub mod observer;

pub use docker::DockerDriver;
pub use driver::{ContainerInspection, ContainerSummary, HealthStatus, RuntimeDriver};
pub use error::RuntimeError;
pub use observer::{observe_container, Batch, LogBatcher, LogEvent};
