//! Transient storage locations for uploaded documents.
//!
//! Each uploaded blob is written byte-for-byte to a uniquely named file so
//! the assistant can ingest it from a path. The file lives exactly as long
//! as its [`StagedDocument`]: it is removed by [`StagedDocument::release`],
//! or on drop if ingestion unwinds first.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::error::IngestionError;
use crate::models::UploadedDocument;

const PREFIX: &str = "docchat-";

/// Writes uploaded documents to transient files.
#[derive(Debug, Clone, Default)]
pub struct Stager {
    dir: Option<PathBuf>,
    max_bytes: Option<u64>,
}

impl Stager {
    /// `dir` defaults to the system temp directory.
    pub fn new(dir: Option<PathBuf>, max_bytes: Option<u64>) -> Self {
        Self { dir, max_bytes }
    }

    pub fn stage(&self, doc: &UploadedDocument) -> Result<StagedDocument, IngestionError> {
        let size = doc.bytes.len() as u64;
        if let Some(limit) = self.max_bytes {
            if size > limit {
                return Err(IngestionError::TooLarge { size, limit });
            }
        }

        // Keep the extension so the assistant can pick an extractor.
        let suffix = doc
            .extension()
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX).suffix(&suffix);
        let mut file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(IngestionError::Staging)?;

        file.write_all(&doc.bytes).map_err(IngestionError::Staging)?;
        file.flush().map_err(IngestionError::Staging)?;

        Ok(StagedDocument {
            name: doc.name.clone(),
            path: file.into_temp_path(),
        })
    }
}

/// An uploaded document materialized at a transient path.
#[derive(Debug)]
pub struct StagedDocument {
    name: String,
    path: TempPath,
}

impl StagedDocument {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the transient file.
    pub fn release(self) -> std::io::Result<()> {
        self.path.close()
    }
}
