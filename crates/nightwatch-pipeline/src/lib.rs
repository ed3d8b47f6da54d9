pub mod capabilities;
pub mod config;
pub mod error;
#[cfg(feature = "http-reasoner")]
pub mod http_reasoner;
pub mod human;
pub mod knowledge;
pub mod orchestrator;
pub mod reasoner;

pub use config::{Constraints, ContainerTopology, Mode, NightwatchConfig, ReasonerConfig, ReasonerProvider};
pub use error::{CapabilityError, ConfigError, ReasonerError};
#[cfg(feature = "http-reasoner")]
pub use http_reasoner::HttpReasoner;
pub use human::{ApprovalDecision, EscalationDecision, HitlResponder, TerminalHitlResponder};
pub use knowledge::{known_parameter, FileKnowledgeStore, KnowledgeStore};
pub use orchestrator::{AuditEntry, Orchestrator, OrchestrationContext};
pub use reasoner::{
    call, extract_json, Reasoner, ReasonerMessage, ReasonerRequest, ReasonerTurn, StubReasoner,
    Tool, ToolCall, ToolDeclaration, ToolHandlerFn,
};
