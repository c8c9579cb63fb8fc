//! The chat session controller.
//!
//! A [`Session`] reacts to the two events a presentation layer can send:
//! a document upload ([`Session::handle_upload`]) and a message submission
//! ([`Session::handle_message_submit`]). It validates input, drives the
//! [`Assistant`](crate::assistant::Assistant), and keeps the
//! [`SessionStore`] consistent.
//!
//! # Event flow
//!
//! ```text
//! upload:  reset ─▶ for each document { stage ─▶ ingest ─▶ release }
//! submit:  trim ─▶ append user turn ─▶ ask ─▶ append answer | notice
//! ```
//!
//! # Error policy
//!
//! Handlers never return errors. Every collaborator failure becomes a
//! [`Notice`] inside the returned outcome, and the session stays usable:
//!
//! - a failed ingestion is reported for that document and the batch goes on;
//! - a failed answer leaves the user's turn in the transcript, unanswered;
//! - a failed reset aborts the upload before anything is ingested.
//!
//! # Serialization
//!
//! Both handlers take `&mut self`, so events against one session are
//! processed one at a time. Callers that share a session across tasks wrap
//! it in a `tokio::sync::Mutex` (see [`crate::server`]).

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::assistant::AssistantFactory;
use crate::error::{IngestionError, Notice, QueryError, ResetError};
use crate::models::{SubmitOutcome, Turn, UploadOutcome, UploadedDocument};
use crate::progress::{Activity, ActivityReporter, NoActivity};
use crate::staging::Stager;
use crate::store::SessionStore;

pub struct Session {
    store: SessionStore,
    stager: Stager,
    activity: Arc<dyn ActivityReporter>,
}

impl Session {
    /// Create an uninitialized session. Call [`init`](Self::init) before
    /// handling events, or use [`start`](Self::start).
    pub fn new(factory: Arc<dyn AssistantFactory>, stager: Stager) -> Self {
        Self {
            store: SessionStore::new(factory),
            stager,
            activity: Arc::new(NoActivity),
        }
    }

    /// Create and initialize a session.
    pub fn start(factory: Arc<dyn AssistantFactory>, stager: Stager) -> Result<Self, ResetError> {
        let mut session = Self::new(factory, stager);
        session.init()?;
        Ok(session)
    }

    /// Report ingestion and answering activity to `reporter`.
    pub fn with_activity(mut self, reporter: Arc<dyn ActivityReporter>) -> Self {
        self.activity = reporter;
        self
    }

    /// Idempotent; an initialized session is left untouched.
    pub fn init(&mut self) -> Result<(), ResetError> {
        self.store.init()
    }

    pub fn is_initialized(&self) -> bool {
        self.store.is_initialized()
    }

    /// The transcript in chronological order.
    pub fn transcript(&self) -> &[Turn] {
        self.store.snapshot()
    }

    /// Handle a message submitted by the user.
    ///
    /// Text that trims to empty is ignored. Otherwise the trimmed text is
    /// recorded as a user turn before the assistant is asked, so it stays
    /// visible even when no answer can be produced.
    pub async fn handle_message_submit(&mut self, raw_text: &str) -> SubmitOutcome {
        let text = raw_text.trim();
        if text.is_empty() {
            debug!("ignoring empty submission");
            return SubmitOutcome::Ignored;
        }

        self.store.set_pending_input(text);
        self.store.append_turn(text, true);

        let result = match self.store.assistant_mut() {
            Some(assistant) => {
                self.activity.report(Activity::Thinking);
                let result = assistant.ask(text).await;
                self.activity.report(Activity::Idle);
                result
            }
            None => Err(QueryError::AssistantUnavailable),
        };

        let outcome = match result {
            Ok(answer) if !answer.trim().is_empty() => {
                self.store.append_turn(&answer, false);
                SubmitOutcome::Answered(answer)
            }
            Ok(_) => {
                let err = QueryError::Generation("assistant returned an empty answer".to_string());
                warn!(query = ?self.store.pending_input(), error = %err, "query failed");
                SubmitOutcome::Unanswered(Notice::query(&err))
            }
            Err(err) => {
                warn!(query = ?self.store.pending_input(), error = %err, "query failed");
                SubmitOutcome::Unanswered(Notice::query(&err))
            }
        };

        self.store.clear_pending_input();
        outcome
    }

    /// Handle a document upload.
    ///
    /// The session is reset first, unconditionally: the transcript is emptied
    /// and the assistant replaced, even if no document ends up ingested.
    /// Documents are then staged and ingested one by one in upload order.
    pub async fn handle_upload(&mut self, documents: &[UploadedDocument]) -> UploadOutcome {
        info!(documents = documents.len(), "upload received; resetting session");

        if let Err(err) = self.store.reset() {
            warn!(error = %err, "reset failed; upload aborted");
            return UploadOutcome::Aborted(Notice::reset(&err));
        }

        let total = documents.len() as u64;
        let mut ingested = Vec::new();
        let mut notices = Vec::new();

        for (i, doc) in documents.iter().enumerate() {
            self.activity.report(Activity::Ingesting {
                document: doc.name.clone(),
                n: i as u64 + 1,
                total,
            });
            match self.ingest_one(doc).await {
                Ok(()) => {
                    info!(document = %doc.name, "document ingested");
                    ingested.push(doc.name.clone());
                }
                Err(err) => {
                    warn!(document = %doc.name, error = %err, "ingestion failed");
                    notices.push(Notice::ingestion(&doc.name, &err));
                }
            }
        }
        self.activity.report(Activity::Idle);

        UploadOutcome::Completed { ingested, notices }
    }

    async fn ingest_one(&mut self, doc: &UploadedDocument) -> Result<(), IngestionError> {
        let staged = self.stager.stage(doc)?;
        debug!(document = %staged.name(), path = %staged.path().display(), "document staged");

        let result = match self.store.assistant_mut() {
            Some(assistant) => assistant.ingest(staged.path()).await,
            None => Err(IngestionError::Backend("assistant unavailable".to_string())),
        };

        if let Err(err) = staged.release() {
            warn!(document = %doc.name, error = %err, "could not remove staged document");
        }
        result
    }
}
