//! Error taxonomy for the chat session and its collaborators.
//!
//! Collaborator calls return explicit results ([`IngestionError`],
//! [`QueryError`]); the session converts every failure into a [`Notice`]
//! at its boundary so that no event handler ever propagates an error to
//! the presentation layer.

use serde::Serialize;
use thiserror::Error;

use crate::extract::ExtractError;

/// One document could not be made queryable.
///
/// Scoped to a single document: siblings in the same upload batch are
/// still ingested.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The uploaded bytes could not be written to a transient location.
    #[error("could not stage document: {0}")]
    Staging(#[source] std::io::Error),
    /// The staged file could not be read back.
    #[error("could not read {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Extract(#[from] ExtractError),
    /// Extraction succeeded but produced no text to index.
    #[error("document contains no extractable text")]
    NoText,
    #[error("document exceeds size limit ({size} > {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },
    #[error("{0}")]
    Backend(String),
}

/// The assistant could not produce an answer.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no documents have been ingested yet")]
    EmptyKnowledgeBase,
    /// The session has no assistant (never initialized, or the last reset failed).
    #[error("assistant unavailable; upload documents to start a new session")]
    AssistantUnavailable,
    #[error("answer generation failed: {0}")]
    Generation(String),
}

/// Clearing prior session state failed. Fatal to the current upload.
#[derive(Debug, Error)]
pub enum ResetError {
    #[error("could not create a fresh assistant: {0}")]
    AssistantUnavailable(String),
}

/// Which stage of the interaction a [`Notice`] comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Ingestion,
    Query,
    Reset,
}

/// A user-visible report of a recovered failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    /// Display name of the document, for ingestion notices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    pub message: String,
}

impl Notice {
    pub fn ingestion(document: &str, err: &IngestionError) -> Self {
        Self {
            kind: NoticeKind::Ingestion,
            document: Some(document.to_string()),
            message: format!("Error ingesting {}: {}", document, err),
        }
    }

    pub fn query(err: &QueryError) -> Self {
        Self {
            kind: NoticeKind::Query,
            document: None,
            message: format!("Error processing input: {}", err),
        }
    }

    pub fn reset(err: &ResetError) -> Self {
        Self {
            kind: NoticeKind::Reset,
            document: None,
            message: format!("Error resetting session: {}", err),
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
