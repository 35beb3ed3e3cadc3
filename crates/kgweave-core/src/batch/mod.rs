//! Batch processing of many independent documents.

mod pipeline;
mod runner;
mod sink;
mod source;

use std::path::{Path, PathBuf};

use crate::error::{KgError, KgResult};

pub use pipeline::DocumentPipeline;
pub use runner::{BatchFailure, BatchReport, BatchRunner, BatchWorker};
pub use sink::{GraphSink, JsonFileSink};
pub use source::{DocumentSource, JsonDirectorySource};

/// Path of the `<id>.json` artifact for an identifier inside `dir`.
///
/// Identifiers that are empty, hidden or contain path separators are rejected.
pub(crate) fn artifact_path(dir: &Path, id: &str) -> KgResult<PathBuf> {
    let invalid = id.is_empty()
        || id.starts_with('.')
        || id.contains(['/', '\\'])
        || id.contains("..");
    if invalid {
        return Err(KgError::malformed_document(id, "invalid document identifier"));
    }
    Ok(dir.join(format!("{}.json", id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_path() {
        let dir = Path::new("/tmp/out");
        assert_eq!(
            artifact_path(dir, "PMC123").unwrap(),
            PathBuf::from("/tmp/out/PMC123.json")
        );
        assert!(artifact_path(dir, "").is_err());
        assert!(artifact_path(dir, "a/b").is_err());
        assert!(artifact_path(dir, "..").is_err());
        assert!(artifact_path(dir, ".hidden").is_err());
    }
}
