//! Error types for kgweave operations.
//!
//! Errors carry a structured [`ErrorCode`] so that batch reports can record
//! the failure kind of a document next to its identifier.

use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Result type alias for kgweave operations.
pub type KgResult<T> = Result<T, KgError>;

/// Which extraction call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionKind {
    Entities,
    Relationships,
}

impl ExtractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionKind::Entities => "entities",
            ExtractionKind::Relationships => "relationships",
        }
    }
}

impl fmt::Display for ExtractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for all kgweave operations.
#[derive(Error, Debug)]
pub enum KgError {
    /// The extraction capability did not produce a well-formed result
    /// within the retry budget.
    #[error("Extraction failure ({kind}) after {attempts} attempt(s): {message}")]
    ExtractionFailure {
        kind: ExtractionKind,
        attempts: u32,
        message: String,
        code: ErrorCode,
    },

    /// A document or section had no usable content.
    #[error("Malformed input: {message}")]
    MalformedInput {
        message: String,
        code: ErrorCode,
        document_id: Option<String>,
    },

    /// LLM operation failed.
    #[error("LLM error: {message}")]
    Llm {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Embedding generation failed.
    #[error("Embedding error: {message}")]
    Embedding {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Document source or graph sink failed.
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Extraction (EXT_xxx)
    ExtRetriesExhausted,

    // Input (IN_xxx)
    InEmptyDocument,

    // LLM (LLM_xxx)
    LlmGenerationFailed,

    // Embedding (EMB_xxx)
    EmbGenerationFailed,
    EmbDimensionMismatch,

    // Storage (STO_xxx)
    StoReadFailed,
    StoWriteFailed,

    // Parse (PARSE_xxx)
    ParseInvalidJson,

    // Configuration
    Config,

    // Worker panicked
    Panic,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ExtRetriesExhausted => "EXT_001",
            ErrorCode::InEmptyDocument => "IN_001",
            ErrorCode::LlmGenerationFailed => "LLM_001",
            ErrorCode::EmbGenerationFailed => "EMB_001",
            ErrorCode::EmbDimensionMismatch => "EMB_002",
            ErrorCode::StoReadFailed => "STO_001",
            ErrorCode::StoWriteFailed => "STO_002",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::Config => "CFG_001",
            ErrorCode::Panic => "PANIC_001",
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl KgError {
    /// Create an extraction failure after `attempts` unsuccessful tries.
    pub fn extraction_failure(
        kind: ExtractionKind,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        Self::ExtractionFailure {
            kind,
            attempts,
            message: message.into(),
            code: ErrorCode::ExtRetriesExhausted,
        }
    }

    /// Create a malformed input error.
    pub fn malformed_input(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
            code: ErrorCode::InEmptyDocument,
            document_id: None,
        }
    }

    /// Create a malformed input error for a specific document.
    pub fn malformed_document(document_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
            code: ErrorCode::InEmptyDocument,
            document_id: Some(document_id.into()),
        }
    }

    /// Create an LLM error.
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
            code: ErrorCode::LlmGenerationFailed,
            source: None,
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
            code: ErrorCode::EmbGenerationFailed,
            source: None,
        }
    }

    /// Create a storage read error.
    pub fn storage_read(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            code: ErrorCode::StoReadFailed,
            source: None,
        }
    }

    /// Create a storage write error.
    pub fn storage_write(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            code: ErrorCode::StoWriteFailed,
            source: None,
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ExtractionFailure { code, .. } => *code,
            Self::MalformedInput { code, .. } => *code,
            Self::Llm { code, .. } => *code,
            Self::Embedding { code, .. } => *code,
            Self::Storage { code, .. } => *code,
            Self::Configuration(_) => ErrorCode::Config,
            Self::Io(_) => ErrorCode::StoReadFailed,
            Self::Serialization(_) => ErrorCode::ParseInvalidJson,
        }
    }

    /// Whether the failure came from the external extraction capability.
    pub fn is_extraction_failure(&self) -> bool {
        matches!(self, Self::ExtractionFailure { .. })
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::ExtractionFailure { .. } => {
                Some("Check the LLM endpoint or raise extraction max_tries")
            }
            Self::MalformedInput { .. } => Some("Check that the document has non-empty sections"),
            Self::Llm { .. } => Some("Please check your LLM provider configuration"),
            Self::Embedding { .. } => Some("Please check your embedding provider configuration"),
            Self::Storage { .. } => Some("Check input and output directory permissions"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_failure() {
        let err = KgError::extraction_failure(ExtractionKind::Entities, 5, "missing key");
        assert_eq!(err.code(), ErrorCode::ExtRetriesExhausted);
        assert!(err.is_extraction_failure());
        assert!(err.to_string().contains("entities"));
        assert!(err.to_string().contains("5 attempt"));
    }

    #[test]
    fn test_malformed_input() {
        let err = KgError::malformed_document("doc-1", "no sections");
        assert_eq!(err.code(), ErrorCode::InEmptyDocument);
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::ExtRetriesExhausted.as_str(), "EXT_001");
        assert_eq!(ErrorCode::Panic.to_string(), "PANIC_001");
    }
}
