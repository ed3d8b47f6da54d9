use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::reasoner::Reasoner;

#[cfg(feature = "http-reasoner")]
use crate::http_reasoner::HttpReasoner;

/// Operating mode: `remediate` exposes the full capability set including
/// plan execution; `observe` is read-only and only ever reports findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Remediate,
    Observe,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Constraints {
    pub max_actions_per_incident: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NightwatchConfig {
    pub mode: Mode,
    pub constraints: Constraints,
    #[serde(default)]
    pub reasoner: ReasonerConfig,
    #[serde(default = "default_topology_path")]
    pub topology_path: String,
    #[serde(default = "default_knowledge_path")]
    pub knowledge_path: String,
}

fn default_topology_path() -> String {
    "docker-compose.yml".into()
}

fn default_knowledge_path() -> String {
    "nightwatch-knowledge.md".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReasonerConfig {
    #[serde(default = "default_provider")]
    pub provider: ReasonerProvider,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonerProvider {
    Http,
    Stub,
}

fn default_provider() -> ReasonerProvider {
    ReasonerProvider::Http
}
fn default_base_url() -> String {
    "http://localhost:8000/v1".into()
}
fn default_model() -> String {
    "gpt-4.1-mini".into()
}

impl NightwatchConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn build_reasoner(&self) -> Result<Arc<dyn Reasoner>, ConfigError> {
        match self.reasoner.provider {
            #[cfg(feature = "http-reasoner")]
            ReasonerProvider::Http => {
                let api_key = std::env::var("NIGHTWATCH_REASONER_API_KEY")
                    .ok()
                    .or_else(|| self.reasoner.api_key.clone());
                Ok(Arc::new(HttpReasoner::new(
                    self.reasoner.base_url.clone(),
                    self.reasoner.model.clone(),
                    api_key,
                )))
            }
            #[cfg(not(feature = "http-reasoner"))]
            ReasonerProvider::Http => {
                Ok(Arc::new(crate::reasoner::StubReasoner::new(vec![])))
            }
            ReasonerProvider::Stub => Ok(Arc::new(crate::reasoner::StubReasoner::new(vec![]))),
        }
    }
}

/// A compose-style topology: `services.<key>.container_name` if present,
/// else `<key>` itself is the container identifier the validator treats as
/// known.
#[derive(Debug, Clone, Deserialize)]
struct ComposeFile {
    #[serde(default)]
    services: HashMap<String, ComposeService>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ComposeService {
    container_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ContainerTopology {
    pub known_containers: Vec<String>,
}

impl ContainerTopology {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&content, &path.display().to_string())
    }

    fn from_str(content: &str, source_name: &str) -> Result<Self, ConfigError> {
        let compose: ComposeFile = serde_yaml::from_str(content)?;
        if compose.services.is_empty() {
            return Err(ConfigError::EmptyTopology(source_name.to_string()));
        }

        let known_containers = compose
            .services
            .into_iter()
            .map(|(key, service)| service.container_name.unwrap_or(key))
            .collect();

        Ok(Self { known_containers })
    }
}
