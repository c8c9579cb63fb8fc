//! The default retrieval-augmented [`Assistant`].
//!
//! ```text
//! ingest(path): read ─▶ extract ─▶ chunk ─▶ KeywordIndex
//! ask(query):   KeywordIndex::search ─▶ Generator ─▶ answer
//! ```
//!
//! Knowledge lives only in memory and only for the lifetime of one
//! assistant; a session reset builds a new one through [`factory`].

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::assistant::{Assistant, AssistantFactory};
use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, Config, RetrievalConfig};
use crate::error::{IngestionError, QueryError};
use crate::extract::extract_text;
use crate::generate::{create_generator, Generator};
use crate::index::KeywordIndex;

pub struct RagAssistant {
    index: KeywordIndex,
    generator: Arc<dyn Generator>,
    max_tokens: usize,
    overlap_tokens: usize,
    top_k: usize,
}

impl RagAssistant {
    pub fn new(
        generator: Arc<dyn Generator>,
        chunking: &ChunkingConfig,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            index: KeywordIndex::new(),
            generator,
            max_tokens: chunking.max_tokens,
            overlap_tokens: chunking.overlap_tokens,
            top_k: retrieval.top_k,
        }
    }

    /// Number of indexed passages.
    pub fn passage_count(&self) -> usize {
        self.index.len()
    }
}

#[async_trait]
impl Assistant for RagAssistant {
    async fn ingest(&mut self, location: &Path) -> Result<(), IngestionError> {
        let bytes = tokio::fs::read(location)
            .await
            .map_err(|source| IngestionError::Unreadable {
                path: location.display().to_string(),
                source,
            })?;
        let extension = location
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();

        // PDF parsing is CPU-bound.
        let text = tokio::task::spawn_blocking(move || extract_text(&bytes, &extension))
            .await
            .map_err(|e| IngestionError::Backend(format!("extraction task failed: {}", e)))??;

        let chunks = chunk_text(&text, self.max_tokens, self.overlap_tokens);
        if chunks.is_empty() {
            return Err(IngestionError::NoText);
        }
        let total = chunks.len();
        let added = self.index.add(chunks);
        info!(
            path = %location.display(),
            chunks = total,
            added,
            passages = self.passage_count(),
            "document indexed"
        );
        Ok(())
    }

    async fn ask(&mut self, query: &str) -> Result<String, QueryError> {
        if self.index.is_empty() {
            return Err(QueryError::EmptyKnowledgeBase);
        }

        let mut passages = self.index.search(query, self.top_k);
        if passages.is_empty() {
            debug!("no passage matched the query; using leading passages");
            passages = self.index.leading(self.top_k);
        }
        debug!(
            passages = passages.len(),
            top_score = passages.first().map_or(0.0, |hit| hit.score),
            generator = self.generator.name(),
            "generating answer"
        );
        self.generator.generate(query, &passages).await
    }

    fn clear(&mut self) {
        self.index.clear();
    }
}

/// Build an [`AssistantFactory`] producing [`RagAssistant`]s configured from
/// `config`. The generator is created once and shared.
pub fn factory(config: &Config) -> anyhow::Result<Arc<dyn AssistantFactory>> {
    let generator = create_generator(&config.generation)?;
    let chunking = config.chunking.clone();
    let retrieval = config.retrieval.clone();
    Ok(Arc::new(move || -> anyhow::Result<Box<dyn Assistant>> {
        Ok(Box::new(RagAssistant::new(
            generator.clone(),
            &chunking,
            &retrieval,
        )))
    }))
}
