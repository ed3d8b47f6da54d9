use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use crate::error::CapabilityError;

const HEADER: &str = "# Nightwatch Knowledge";

/// Trait for the fact-accumulation backend. Facts are questions answered by
/// a human during feasibility assessment or escalation, persisted so the
/// reasoner doesn't have to ask twice.
///
/// Dyn-compatible by hand, matching this crate's other facades.
pub trait KnowledgeStore: Send + Sync {
    fn record_fact<'a>(
        &'a self,
        question: &'a str,
        answer: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), CapabilityError>> + Send + 'a>>;

    fn facts<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, CapabilityError>> + Send + 'a>>;
}

/// Markdown-file-backed knowledge store. The file starts with a fixed
/// header; an absent or header-only file is treated as empty. Facts are
/// appended as `- <question> → <answer>` lines.
pub struct FileKnowledgeStore {
    path: PathBuf,
}

impl FileKnowledgeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn ensure_header(&self) -> Result<(), CapabilityError> {
        if !tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| CapabilityError::Knowledge(e.to_string()))?
        {
            tokio::fs::write(&self.path, format!("{HEADER}\n"))
                .await
                .map_err(|e| CapabilityError::Knowledge(e.to_string()))?;
        }
        Ok(())
    }
}

impl KnowledgeStore for FileKnowledgeStore {
    fn record_fact<'a>(
        &'a self,
        question: &'a str,
        answer: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), CapabilityError>> + Send + 'a>> {
        Box::pin(async move {
            self.ensure_header().await?;
            let line = format!("- {question} → {answer}\n");
            use tokio::io::AsyncWriteExt;
            let mut file = tokio::fs::OpenOptions::new()
                .append(true)
                .open(&self.path)
                .await
                .map_err(|e| CapabilityError::Knowledge(e.to_string()))?;
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| CapabilityError::Knowledge(e.to_string()))?;
            Ok(())
        })
    }

    fn facts<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, CapabilityError>> + Send + 'a>> {
        Box::pin(async move {
            if !tokio::fs::try_exists(&self.path)
                .await
                .map_err(|e| CapabilityError::Knowledge(e.to_string()))?
            {
                return Ok(Vec::new());
            }
            let content = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| CapabilityError::Knowledge(e.to_string()))?;
            Ok(parse_facts(&content))
        })
    }
}

fn parse_facts(content: &str) -> Vec<String> {
    content
        .lines()
        .skip_while(|line| line.trim() != HEADER)
        .skip(1)
        .filter_map(|line| {
            let trimmed = line.trim();
            trimmed
                .strip_prefix("- ")
                .map(str::to_string)
                .filter(|_| !trimmed.is_empty())
        })
        .collect()
}

pub fn known_parameter<'a>(facts: &'a [String], parameter: &str) -> Option<&'a str> {
    facts
        .iter()
        .find(|fact| fact.starts_with(parameter))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn absent_file_has_no_facts() {
        let dir = TempDir::new().unwrap();
        let store = FileKnowledgeStore::new(dir.path().join("knowledge.md"));
        assert!(store.facts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn records_and_reads_facts() {
        let dir = TempDir::new().unwrap();
        let store = FileKnowledgeStore::new(dir.path().join("knowledge.md"));

        store
            .record_fact("memory limit for cache?", "512mb")
            .await
            .unwrap();
        store
            .record_fact("can we restart api?", "yes")
            .await
            .unwrap();

        let facts = store.facts().await.unwrap();
        assert_eq!(facts.len(), 2);
        assert!(facts[0].contains("memory limit for cache?"));
    }

    #[tokio::test]
    async fn header_only_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("knowledge.md");
        tokio::fs::write(&path, format!("{HEADER}\n")).await.unwrap();

        let store = FileKnowledgeStore::new(path);
        assert!(store.facts().await.unwrap().is_empty());
    }
}
