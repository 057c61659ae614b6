//! Ingestion pipeline.
//!
//! One document at a time: detect type, enforce the size ceiling, extract
//! page text, chunk, embed, upsert vectors, then write the metadata record
//! last. The vector index is the source of truth; if the metadata write
//! fails after the upsert succeeded, the freshly written points are
//! deleted again so no unlisted document lingers in the index.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use crate::config::IngestionConfig;
use crate::embedding::Embedder;
use crate::error::IngestError;
use crate::extract::{detect_file_type, extract_pages};
use crate::models::{Chunk, Document, VectorRecord};
use crate::splitter::chunk_pages;
use crate::store::DocumentStore;
use crate::vector::VectorStore;

pub struct IngestPipeline {
    store: Arc<DocumentStore>,
    embedder: Arc<dyn Embedder>,
    vector: Arc<dyn VectorStore>,
    config: IngestionConfig,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<DocumentStore>,
        embedder: Arc<dyn Embedder>,
        vector: Arc<dyn VectorStore>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            vector,
            config,
        }
    }

    /// Ingest one uploaded file. Returns the stored document record, or a
    /// typed error the caller can map to a user-facing status.
    pub async fn ingest(&self, filename: &str, bytes: &[u8]) -> Result<Document, IngestError> {
        let file_type = detect_file_type(filename)?;

        if bytes.len() > self.config.max_file_size {
            return Err(IngestError::TooLarge {
                size: bytes.len(),
                max: self.config.max_file_size,
            });
        }

        let pages = extract_pages(bytes, file_type)?;

        let document_id = Uuid::new_v4().to_string();
        let chunks = chunk_pages(
            &document_id,
            &pages,
            self.config.chunk_size,
            self.config.chunk_overlap,
        );
        tracing::info!(
            filename,
            document_id = %document_id,
            pages = pages.len(),
            chunks = chunks.len(),
            "extracted and chunked document"
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| IngestError::Embedding(e.to_string()))?;

        let records = build_records(&chunks, vectors, filename);
        self.vector
            .upsert(&records)
            .await
            .map_err(|e| IngestError::VectorStore(e.to_string()))?;

        let document = Document {
            id: document_id.clone(),
            filename: filename.to_string(),
            file_type,
            file_size: bytes.len() as i64,
            uploaded_at: Utc::now(),
            chunk_count: chunks.len() as i64,
        };

        if let Err(e) = self.store.put(&document).await {
            // Roll back the upsert so the index never holds a document
            // the listing cannot see.
            if let Err(cleanup_err) = self.vector.delete_by_document(&document_id).await {
                tracing::error!(
                    document_id = %document_id,
                    error = %cleanup_err,
                    "failed to clean up vectors after metadata write failure"
                );
            }
            return Err(IngestError::Metadata(e.to_string()));
        }

        tracing::info!(document_id = %document_id, filename, "ingested document");
        Ok(document)
    }

    /// Remove a document from the index and the metadata store. Returns
    /// false when the id was unknown.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let existing = self.store.get(id).await?;
        if existing.is_none() {
            return Ok(false);
        }

        self.vector.delete_by_document(id).await?;
        self.store.delete(id).await?;
        tracing::info!(document_id = id, "deleted document");
        Ok(true)
    }

    /// Fetch a document record, refreshing its chunk count from the index
    /// when the two disagree.
    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let Some(mut document) = self.store.get(id).await? else {
            return Ok(None);
        };

        let actual = self.vector.scroll_by_document(id).await?.len() as i64;
        if actual != document.chunk_count {
            tracing::debug!(
                document_id = id,
                stored = document.chunk_count,
                actual,
                "refreshing stale chunk count"
            );
            self.store.update_chunk_count(id, actual).await?;
            document.chunk_count = actual;
        }

        Ok(Some(document))
    }
}

/// Pair chunks with their vectors as index records. Each record gets a
/// fresh point id; document identity lives in the payload.
fn build_records(chunks: &[Chunk], vectors: Vec<Vec<f32>>, filename: &str) -> Vec<VectorRecord> {
    chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| VectorRecord {
            id: Uuid::new_v4().to_string(),
            vector,
            document_id: chunk.document_id.clone(),
            chunk_index: chunk.chunk_index,
            page_number: chunk.page_number,
            filename: filename.to_string(),
            text: chunk.text.clone(),
        })
        .collect()
}
