//! Core data models shared by the session, its collaborators, and the
//! presentation layers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Notice;

/// One message in the chat transcript.
///
/// Turns are immutable once appended; their identity is their position in
/// the transcript.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub text: String,
    pub is_user: bool,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn new(text: impl Into<String>, is_user: bool) -> Self {
        Self {
            text: text.into(),
            is_user,
            at: Utc::now(),
        }
    }
}

// Timestamps are informational; two turns are equal when text and author match.
impl PartialEq for Turn {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text && self.is_user == other.is_user
    }
}

impl Eq for Turn {}

/// A document blob handed over by the presentation layer.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    /// Display name, e.g. `report.pdf`.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Lowercased file extension of the display name, if any.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

/// Result of handling an upload event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The session was reset and every document was attempted.
    Completed {
        /// Names of documents ingested successfully, in upload order.
        ingested: Vec<String>,
        /// One notice per document that failed.
        notices: Vec<Notice>,
    },
    /// The reset step failed; nothing was ingested.
    Aborted(Notice),
}

impl UploadOutcome {
    pub fn notices(&self) -> &[Notice] {
        match self {
            UploadOutcome::Completed { notices, .. } => notices,
            UploadOutcome::Aborted(notice) => std::slice::from_ref(notice),
        }
    }
}

/// Result of handling a message submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The text trimmed to empty; nothing happened.
    Ignored,
    Answered(String),
    /// The user turn was recorded but no answer could be produced.
    Unanswered(Notice),
}
