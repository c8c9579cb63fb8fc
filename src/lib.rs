//! # doc-chat
//!
//! Chat with your documents: a user uploads one or more documents, they are
//! ingested into a retrieval-augmented assistant, and the user converses with
//! that assistant through a message thread.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  upload / submit  ┌───────────┐  ingest / ask / clear  ┌───────────┐
//! │ HTTP server  │──────────────────▶│  Session  │───────────────────────▶│ Assistant │
//! │ terminal chat│◀──────────────────│ (control) │◀───────────────────────│  (RAG)    │
//! └──────────────┘ outcomes, notices └─────┬─────┘                        └───────────┘
//!                                          │
//!                                    ┌─────▼──────┐
//!                                    │SessionStore│ transcript + assistant handle
//!                                    └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`session`] | Session controller: upload and message handling |
//! | [`store`] | Transcript and assistant-handle state |
//! | [`assistant`] | Assistant collaborator traits |
//! | [`error`] | Error taxonomy and user-visible notices |
//! | [`models`] | Turns, uploaded documents, event outcomes |
//! | [`staging`] | Transient storage for uploaded bytes |
//! | [`progress`] | "Working" indication |
//! | [`rag`] | Default retrieval-augmented assistant |
//! | [`extract`] | Text extraction (PDF, DOCX, plain text) |
//! | [`chunk`] | Text chunking |
//! | [`index`] | In-memory keyword index |
//! | [`generate`] | Answer generators |
//! | [`config`] | TOML configuration parsing |
//! | [`server`] | HTTP server |
//! | [`chat`] | Terminal chat |

pub mod assistant;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod error;
pub mod extract;
pub mod generate;
pub mod index;
pub mod models;
pub mod progress;
pub mod rag;
pub mod server;
pub mod session;
pub mod staging;
pub mod store;
