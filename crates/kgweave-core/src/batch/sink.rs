//! Output sinks for finalised graphs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::artifact_path;
use crate::error::{KgError, KgResult};
use crate::types::KnowledgeGraph;

/// Stores one graph per document identifier.
///
/// An existing entry marks its identifier as done for resumed runs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphSink: Send + Sync {
    async fn exists(&self, id: &str) -> KgResult<bool>;

    async fn write(&self, id: &str, graph: &KnowledgeGraph) -> KgResult<()>;
}

/// Writes `<id>.json` files into a directory.
///
/// Files are written to a temporary name and renamed into place, so an
/// interrupted write never leaves an entry that looks complete.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl GraphSink for JsonFileSink {
    async fn exists(&self, id: &str) -> KgResult<bool> {
        let path = artifact_path(&self.dir, id)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| KgError::storage_read(format!("Cannot stat {}: {}", path.display(), e)))
    }

    async fn write(&self, id: &str, graph: &KnowledgeGraph) -> KgResult<()> {
        let path = artifact_path(&self.dir, id)?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            KgError::storage_write(format!("Cannot create {}: {}", self.dir.display(), e))
        })?;

        let body = serde_json::to_vec_pretty(graph)?;

        let tmp = self.dir.join(format!(".{}.{}.tmp", id, Uuid::new_v4()));
        tokio::fs::write(&tmp, &body).await.map_err(|e| {
            KgError::storage_write(format!("Cannot write {}: {}", tmp.display(), e))
        })?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(KgError::storage_write(format!(
                "Cannot move graph into {}: {}",
                path.display(),
                e
            )));
        }

        debug!(id, path = %path.display(), bytes = body.len(), "Wrote graph");
        Ok(())
    }
}
