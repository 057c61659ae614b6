//! Typed failures for the ingestion pipeline.
//!
//! Ingestion failures propagate to the caller so the HTTP layer can map
//! user-correctable problems (bad extension, oversized upload, empty
//! extraction) to 4xx responses and infrastructure problems to 5xx.
//! Query-time failures are handled differently: they are caught at the
//! orchestrator boundary and never surface as errors (see `query.rs`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The filename extension is not in the allowed set.
    #[error("unsupported file type: '{extension}' (supported: pdf, docx, txt)")]
    UnsupportedType { extension: String },

    /// The upload exceeds the configured byte ceiling.
    #[error("file too large: {size} bytes (maximum: {max} bytes)")]
    TooLarge { size: usize, max: usize },

    /// Extraction produced no non-whitespace text.
    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),

    /// The embedding endpoint failed after retries.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The vector index rejected the upsert or was unreachable.
    #[error("vector store unavailable: {0}")]
    VectorStore(String),

    /// The metadata store write failed (vectors are compensated away).
    #[error("metadata store failed: {0}")]
    Metadata(String),
}

impl IngestError {
    /// Whether the failure is correctable by the uploader (→ HTTP 400)
    /// rather than an infrastructure fault (→ HTTP 500).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            IngestError::UnsupportedType { .. }
                | IngestError::TooLarge { .. }
                | IngestError::ExtractionFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_are_classified() {
        assert!(IngestError::UnsupportedType {
            extension: "exe".into()
        }
        .is_user_error());
        assert!(IngestError::TooLarge {
            size: 20,
            max: 10
        }
        .is_user_error());
        assert!(IngestError::ExtractionFailed("empty".into()).is_user_error());
        assert!(!IngestError::Embedding("timeout".into()).is_user_error());
        assert!(!IngestError::VectorStore("down".into()).is_user_error());
        assert!(!IngestError::Metadata("disk full".into()).is_user_error());
    }

    #[test]
    fn display_includes_detail() {
        let err = IngestError::TooLarge {
            size: 11,
            max: 10,
        };
        assert!(err.to_string().contains("11"));
        assert!(err.to_string().contains("10"));
    }
}
