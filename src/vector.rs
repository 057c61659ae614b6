//! Vector index adapter over the Qdrant REST API.
//!
//! A single named collection with fixed dimensionality and cosine
//! similarity. The collection is created lazily at startup if absent and
//! left untouched otherwise (no schema migration). All calls go through
//! `reqwest` against Qdrant's JSON API.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::VectorConfig;
use crate::models::{SearchHit, VectorRecord};

/// Upper bound on records returned by a single scroll call. Documents are
/// far smaller than this in practice.
const SCROLL_LIMIT: usize = 10_000;

/// Interface the ingestion pipeline and retrieval tool store/search
/// through. Implemented by [`QdrantIndex`]; test doubles implement it
/// directly.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist yet.
    async fn ensure_collection(&self) -> Result<()>;

    /// Upsert records, idempotent by record id. All-or-nothing per call.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Nearest neighbors by cosine similarity, descending score, truncated
    /// to `limit`, excluding anything below `score_threshold`. When
    /// `document_id` is set, only that document's records are candidates.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
        document_id: Option<&str>,
    ) -> Result<Vec<SearchHit>>;

    /// All records of one document, unranked.
    async fn scroll_by_document(&self, document_id: &str) -> Result<Vec<SearchHit>>;

    /// Remove every record of one document. A no-op for unknown ids.
    async fn delete_by_document(&self, document_id: &str) -> Result<()>;
}

/// Qdrant-backed vector index.
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    dims: usize,
}

impl QdrantIndex {
    pub fn new(config: &VectorConfig, dims: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            dims,
        })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    /// POST a JSON body and return the parsed response, treating non-2xx
    /// statuses as errors.
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("vector store unreachable: {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("vector store error {}: {}", status, text);
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl VectorStore for QdrantIndex {
    async fn ensure_collection(&self) -> Result<()> {
        let url = self.collection_url("");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("vector store unreachable: {}", self.base_url))?;

        if response.status().is_success() {
            tracing::debug!(collection = %self.collection, "collection already exists");
            return Ok(());
        }

        if response.status() != reqwest::StatusCode::NOT_FOUND {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("vector store error {}: {}", status, text);
        }

        let body = json!({
            "vectors": { "size": self.dims, "distance": "Cosine" }
        });
        let response = self.client.put(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("failed to create collection: {} {}", status, text);
        }
        tracing::info!(collection = %self.collection, dims = self.dims, "created collection");
        Ok(())
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let points: Vec<Value> = records.iter().map(record_to_point).collect();
        let url = self.collection_url("/points?wait=true");
        self.client
            .put(&url)
            .json(&json!({ "points": points }))
            .send()
            .await
            .context("vector store unreachable")?
            .error_for_status()
            .context("upsert rejected")?;
        tracing::debug!(points = records.len(), "upserted points");
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
        document_id: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let mut body = json!({
            "query": vector,
            "limit": limit,
            "score_threshold": score_threshold,
            "with_payload": true,
        });
        if let Some(doc_id) = document_id {
            body["filter"] = document_filter(doc_id);
        }

        let response = self
            .post_json(&self.collection_url("/points/query"), &body)
            .await?;
        let points = response
            .pointer("/result/points")
            .and_then(|p| p.as_array())
            .ok_or_else(|| anyhow::anyhow!("invalid search response"))?;

        Ok(points.iter().filter_map(parse_point).collect())
    }

    async fn scroll_by_document(&self, document_id: &str) -> Result<Vec<SearchHit>> {
        let body = json!({
            "filter": document_filter(document_id),
            "limit": SCROLL_LIMIT,
            "with_payload": true,
        });

        let response = self
            .post_json(&self.collection_url("/points/scroll"), &body)
            .await?;
        let points = response
            .pointer("/result/points")
            .and_then(|p| p.as_array())
            .ok_or_else(|| anyhow::anyhow!("invalid scroll response"))?;

        Ok(points.iter().filter_map(parse_point).collect())
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<()> {
        let body = json!({ "filter": document_filter(document_id) });
        self.post_json(&self.collection_url("/points/delete?wait=true"), &body)
            .await?;
        tracing::debug!(document_id, "deleted document points");
        Ok(())
    }
}

/// Qdrant filter matching all points of one document.
fn document_filter(document_id: &str) -> Value {
    json!({
        "must": [
            { "key": "doc_id", "match": { "value": document_id } }
        ]
    })
}

/// Serialize a record into a Qdrant point.
fn record_to_point(record: &VectorRecord) -> Value {
    json!({
        "id": record.id,
        "vector": record.vector,
        "payload": {
            "doc_id": record.document_id,
            "chunk_index": record.chunk_index,
            "page_number": record.page_number,
            "filename": record.filename,
            "text": record.text,
        }
    })
}

/// Deserialize a Qdrant point (search hit or scroll entry) back into a
/// [`SearchHit`]. Scroll entries carry no score; those parse as 0.0.
fn parse_point(point: &Value) -> Option<SearchHit> {
    let payload = point.get("payload")?;
    Some(SearchHit {
        id: point
            .get("id")
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default(),
        score: point.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32,
        document_id: payload.get("doc_id")?.as_str()?.to_string(),
        chunk_index: payload.get("chunk_index").and_then(|i| i.as_i64()).unwrap_or(0),
        page_number: payload
            .get("page_number")
            .and_then(|p| p.as_u64())
            .map(|p| p as u32),
        filename: payload
            .get("filename")
            .and_then(|f| f.as_str())
            .unwrap_or("Unknown")
            .to_string(),
        text: payload
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string(),
    })
}
