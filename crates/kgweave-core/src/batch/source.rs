//! Worklist sources.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::artifact_path;
use crate::error::{KgError, KgResult};
use crate::types::Document;

/// Enumerates work items and loads their documents.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// All document identifiers, in a stable order.
    async fn list_ids(&self) -> KgResult<Vec<String>>;

    /// Load the document for one identifier.
    async fn load(&self, id: &str) -> KgResult<Document>;
}

/// Reads one `<id>.json` [`Document`] per work item from a directory.
#[derive(Debug, Clone)]
pub struct JsonDirectorySource {
    dir: PathBuf,
}

impl JsonDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DocumentSource for JsonDirectorySource {
    async fn list_ids(&self) -> KgResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            KgError::storage_read(format!("Cannot list {}: {}", self.dir.display(), e))
        })?;

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        debug!(dir = %self.dir.display(), count = ids.len(), "Listed documents");
        Ok(ids)
    }

    async fn load(&self, id: &str) -> KgResult<Document> {
        let path = artifact_path(&self.dir, id)?;
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            KgError::storage_read(format!("Cannot read {}: {}", path.display(), e))
        })?;

        let mut document: Document = serde_json::from_str(&content)
            .map_err(|e| KgError::malformed_document(id, format!("invalid document JSON: {}", e)))?;

        if document.id.is_empty() {
            document.id = id.to_string();
        } else if document.id != id {
            warn!(file = id, document = %document.id, "Document id differs from file name");
            document.id = id.to_string();
        }
        Ok(document)
    }
}
