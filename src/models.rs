//! Core data models.
//!
//! These types represent the documents, chunks, and vector records that flow
//! through the ingestion pipeline, plus the conversation types exchanged
//! with the chat model and the citation types returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata record for an ingested document.
///
/// Created only after the document's vectors have been upserted; deleted
/// explicitly, cascading to all of its vector records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub file_type: FileType,
    pub file_size: i64,
    pub uploaded_at: DateTime<Utc>,
    pub chunk_count: i64,
}

/// Document type detected from the filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Docx,
    Txt,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
            FileType::Txt => "txt",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous text window of a document, the unit of retrieval.
///
/// `chunk_index` is zero-based and global across the document's pages.
/// `page_number` is 1-based for paginated formats (PDF) and absent otherwise.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub document_id: String,
    pub chunk_index: i64,
    pub page_number: Option<u32>,
    pub text: String,
}

/// One embedded chunk as stored in the vector index.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub document_id: String,
    pub chunk_index: i64,
    pub page_number: Option<u32>,
    pub filename: String,
    pub text: String,
}

/// A ranked hit returned from the vector index.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub document_id: String,
    pub chunk_index: i64,
    pub page_number: Option<u32>,
    pub filename: String,
    pub text: String,
}

/// A de-duplicated (filename, page) citation with the first score seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub filename: String,
    /// Page rendered as text; `"N/A"` for unpaginated formats.
    pub page: String,
    pub score: f32,
}

/// Caller-supplied conversation turn (read-only input to a query).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

/// The orchestrator's answer: final text plus structured citations.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub message: String,
    pub sources: Vec<Source>,
}
