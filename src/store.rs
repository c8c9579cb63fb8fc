//! Per-session state: the transcript and the current assistant handle.
//!
//! [`SessionStore`] holds state and nothing else; it performs no I/O and
//! makes no decisions. The [`Session`](crate::session::Session) controller
//! is the only writer.

use std::sync::Arc;

use crate::assistant::{Assistant, AssistantFactory};
use crate::error::ResetError;
use crate::models::Turn;

pub struct SessionStore {
    transcript: Vec<Turn>,
    assistant: Option<Box<dyn Assistant>>,
    pending_input: Option<String>,
    factory: Arc<dyn AssistantFactory>,
}

impl SessionStore {
    /// Create an uninitialized store. Call [`init`](Self::init) before use.
    pub fn new(factory: Arc<dyn AssistantFactory>) -> Self {
        Self {
            transcript: Vec::new(),
            assistant: None,
            pending_input: None,
            factory,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.assistant.is_some()
    }

    /// Install a fresh assistant if the store has none.
    ///
    /// Re-entrant calls on an initialized store leave the transcript and the
    /// assistant untouched.
    pub fn init(&mut self) -> Result<(), ResetError> {
        if self.assistant.is_some() {
            return Ok(());
        }
        self.assistant = Some(self.build_assistant()?);
        Ok(())
    }

    /// Append one turn. `text` must be non-empty after trimming.
    pub fn append_turn(&mut self, text: &str, is_user: bool) {
        debug_assert!(!text.trim().is_empty(), "turn text must not be empty");
        if text.trim().is_empty() {
            return;
        }
        self.transcript.push(Turn::new(text, is_user));
    }

    /// Clear the transcript and pending input, and replace the assistant.
    ///
    /// The outgoing assistant is cleared before it is dropped. If a new one
    /// cannot be built the store is left empty and uninitialized.
    pub fn reset(&mut self) -> Result<(), ResetError> {
        self.transcript.clear();
        self.pending_input = None;
        if let Some(mut old) = self.assistant.take() {
            old.clear();
        }
        self.assistant = Some(self.build_assistant()?);
        Ok(())
    }

    /// The transcript in chronological order.
    pub fn snapshot(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn assistant_mut(&mut self) -> Option<&mut (dyn Assistant + 'static)> {
        self.assistant.as_deref_mut()
    }

    pub fn pending_input(&self) -> Option<&str> {
        self.pending_input.as_deref()
    }

    pub fn set_pending_input(&mut self, text: impl Into<String>) {
        self.pending_input = Some(text.into());
    }

    pub fn clear_pending_input(&mut self) {
        self.pending_input = None;
    }

    fn build_assistant(&self) -> Result<Box<dyn Assistant>, ResetError> {
        self.factory
            .create()
            .map_err(|e| ResetError::AssistantUnavailable(format!("{:#}", e)))
    }
}
