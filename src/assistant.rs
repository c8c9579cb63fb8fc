//! The retrieval-augmented assistant collaborator.
//!
//! A [`Session`](crate::session::Session) drives exactly one [`Assistant`]
//! at a time. The assistant is created by an [`AssistantFactory`] when the
//! session starts and is replaced, never mutated back to empty, whenever an
//! upload resets the session.
//!
//! ```text
//!   Session ──ingest(path)──▶ Assistant
//!           ──ask(query)───▶           ──▶ answer
//!           ──clear()──────▶  (then dropped, factory builds a new one)
//! ```
//!
//! Implement [`Assistant`] to plug in a different retrieval engine:
//!
//! ```rust
//! use async_trait::async_trait;
//! use std::path::Path;
//! use doc_chat::assistant::Assistant;
//! use doc_chat::error::{IngestionError, QueryError};
//!
//! #[derive(Default)]
//! struct Echo {
//!     docs: usize,
//! }
//!
//! #[async_trait]
//! impl Assistant for Echo {
//!     async fn ingest(&mut self, _location: &Path) -> Result<(), IngestionError> {
//!         self.docs += 1;
//!         Ok(())
//!     }
//!
//!     async fn ask(&mut self, query: &str) -> Result<String, QueryError> {
//!         if self.docs == 0 {
//!             return Err(QueryError::EmptyKnowledgeBase);
//!         }
//!         Ok(format!("you asked: {}", query))
//!     }
//!
//!     fn clear(&mut self) {
//!         self.docs = 0;
//!     }
//! }
//! ```

use async_trait::async_trait;
use std::path::Path;

use crate::error::{IngestionError, QueryError};

/// Document ingestion and question answering over ingested documents.
#[async_trait]
pub trait Assistant: Send + Sync {
    /// Make the document stored at `location` queryable.
    ///
    /// The file at `location` is only guaranteed to exist for the duration
    /// of this call.
    async fn ingest(&mut self, location: &Path) -> Result<(), IngestionError>;

    /// Answer `query` from the ingested documents.
    async fn ask(&mut self, query: &str) -> Result<String, QueryError>;

    /// Release all ingested knowledge. Always succeeds.
    fn clear(&mut self);
}

/// Builds fresh [`Assistant`] instances for sessions.
///
/// Shared across sessions; the assistants it builds are not.
pub trait AssistantFactory: Send + Sync {
    fn create(&self) -> anyhow::Result<Box<dyn Assistant>>;
}

impl<F> AssistantFactory for F
where
    F: Fn() -> anyhow::Result<Box<dyn Assistant>> + Send + Sync,
{
    fn create(&self) -> anyhow::Result<Box<dyn Assistant>> {
        self()
    }
}
