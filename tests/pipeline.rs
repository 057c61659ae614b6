//! End-to-end pipeline tests with in-process fakes.
//!
//! Wires the real ingestion pipeline, agent loop, and query orchestrator
//! against an in-memory vector index with actual cosine scoring, a
//! deterministic embedder, and a scripted chat model. No network services
//! are required.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::{Arc, Mutex};

use docqa::agent::AgentLoop;
use docqa::config::{AgentConfig, IngestionConfig};
use docqa::embedding::Embedder;
use docqa::ingest::IngestPipeline;
use docqa::llm::{AssistantReply, ChatMessage, ChatProvider, ToolCall};
use docqa::models::{SearchHit, VectorRecord};
use docqa::query::{QueryEngine, EMPTY_CORPUS_ANSWER};
use docqa::retrieval::{RetrievalTool, Retriever, NO_RESULTS_TEXT, SEARCH_TOOL_NAME};
use docqa::store::DocumentStore;
use docqa::vector::VectorStore;

/// Deterministic bag-of-letters embedder: texts sharing words get close
/// vectors under cosine similarity.
struct LetterEmbedder;

fn letter_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 16];
    for b in text.bytes() {
        v[(b as usize) % 16] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for LetterEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(letter_vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| letter_vector(t)).collect())
    }

    fn dims(&self) -> usize {
        16
    }
}

/// In-memory vector index with real cosine ranking.
#[derive(Default)]
struct MemoryIndex {
    points: Mutex<Vec<VectorRecord>>,
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl VectorStore for MemoryIndex {
    async fn ensure_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        self.points.lock().unwrap().extend_from_slice(records);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
        document_id: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let points = self.points.lock().unwrap();
        let mut hits: Vec<SearchHit> = points
            .iter()
            .filter(|p| document_id.map_or(true, |id| p.document_id == id))
            .map(|p| SearchHit {
                id: p.id.clone(),
                score: cosine(vector, &p.vector),
                document_id: p.document_id.clone(),
                chunk_index: p.chunk_index,
                page_number: p.page_number,
                filename: p.filename.clone(),
                text: p.text.clone(),
            })
            .filter(|h| h.score >= score_threshold)
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scroll_by_document(&self, document_id: &str) -> Result<Vec<SearchHit>> {
        self.search(&vec![1.0; 16], usize::MAX, f32::MIN, Some(document_id))
            .await
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<()> {
        self.points
            .lock()
            .unwrap()
            .retain(|p| p.document_id != document_id);
        Ok(())
    }
}

/// Scripted model: first searches for the user's question verbatim, then
/// answers from whatever the tool observed.
struct SearchingChat {
    calls: Mutex<usize>,
}

#[async_trait]
impl ChatProvider for SearchingChat {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _tools: Option<&[Value]>,
    ) -> Result<AssistantReply> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        if *calls == 1 {
            let question = messages
                .last()
                .and_then(|m| m.content.clone())
                .unwrap_or_default();
            Ok(AssistantReply {
                content: None,
                tool_calls: vec![ToolCall {
                    id: "call_1".to_string(),
                    name: SEARCH_TOOL_NAME.to_string(),
                    arguments: serde_json::json!({ "query": question }).to_string(),
                }],
            })
        } else {
            Ok(AssistantReply {
                content: Some("The documents describe quarterly revenue growth.".to_string()),
                tool_calls: Vec::new(),
            })
        }
    }
}

async fn store() -> Arc<DocumentStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = Arc::new(DocumentStore::new(pool));
    store.init_schema().await.unwrap();
    store
}

fn pipeline(store: Arc<DocumentStore>, index: Arc<MemoryIndex>) -> IngestPipeline {
    IngestPipeline::new(
        store,
        Arc::new(LetterEmbedder),
        index,
        IngestionConfig::default(),
    )
}

fn engine(store: Arc<DocumentStore>, index: Arc<MemoryIndex>) -> QueryEngine {
    let retriever = Arc::new(RetrievalTool::new(Arc::new(LetterEmbedder), index));
    let agent = AgentLoop::new(
        Arc::new(SearchingChat {
            calls: Mutex::new(0),
        }),
        retriever,
        AgentConfig::default(),
    );
    QueryEngine::new(store, agent, "English".to_string())
}

#[tokio::test]
async fn ingest_then_ask_attributes_sources() {
    let store = store().await;
    let index = Arc::new(MemoryIndex::default());
    let pipeline = pipeline(store.clone(), index.clone());

    pipeline
        .ingest(
            "revenue.txt",
            b"Quarterly revenue grew by twelve percent.\n\nGrowth was driven by subscriptions.",
        )
        .await
        .unwrap();
    pipeline
        .ingest("unrelated.txt", b"Office plants need watering on Fridays.")
        .await
        .unwrap();

    let engine = engine(store, index);
    let answer = engine
        .process_query("How did quarterly revenue grow?", &[], None)
        .await;

    assert_eq!(
        answer.message,
        "The documents describe quarterly revenue growth."
    );
    assert!(!answer.sources.is_empty());
    assert!(answer.sources.iter().any(|s| s.filename == "revenue.txt"));
    // Unpaginated formats report no page
    assert!(answer.sources.iter().all(|s| s.page == "N/A"));
}

#[tokio::test]
async fn empty_corpus_answers_without_a_model() {
    let store = store().await;
    let index = Arc::new(MemoryIndex::default());

    let engine = engine(store, index);
    let answer = engine.process_query("Anything there?", &[], None).await;
    assert_eq!(answer.message, EMPTY_CORPUS_ANSWER);
    assert!(answer.sources.is_empty());
}

#[tokio::test]
async fn threshold_above_cosine_range_matches_nothing() {
    let store = store().await;
    let index = Arc::new(MemoryIndex::default());
    let pipeline = pipeline(store, index.clone());

    pipeline
        .ingest("revenue.txt", b"Quarterly revenue grew by twelve percent.")
        .await
        .unwrap();

    // Cosine similarity never exceeds 1.0, so a floor of 1.1 excludes
    // even an exact match.
    let vector = letter_vector("Quarterly revenue grew by twelve percent.");
    let hits = index.search(&vector, 5, 1.1, None).await.unwrap();
    assert!(hits.is_empty());

    let tool = RetrievalTool::new(Arc::new(LetterEmbedder), index);
    let output = tool
        .search("Quarterly revenue grew by twelve percent.", 5, 1.1)
        .await;
    assert_eq!(output.rendered, NO_RESULTS_TEXT);
    assert!(output.sources.is_empty());
}

#[tokio::test]
async fn delete_removes_document_from_both_stores() {
    let store = store().await;
    let index = Arc::new(MemoryIndex::default());
    let pipeline = pipeline(store.clone(), index.clone());

    let doc = pipeline
        .ingest("notes.txt", b"Some notes worth keeping around.")
        .await
        .unwrap();
    assert!(!index.points.lock().unwrap().is_empty());

    assert!(pipeline.delete_document(&doc.id).await.unwrap());
    assert!(store.get(&doc.id).await.unwrap().is_none());
    assert!(index.points.lock().unwrap().is_empty());
}

#[tokio::test]
async fn list_returns_every_ingested_document() {
    let store = store().await;
    let index = Arc::new(MemoryIndex::default());
    let pipeline = pipeline(store.clone(), index);

    pipeline.ingest("first.txt", b"first body").await.unwrap();
    pipeline.ingest("second.txt", b"second body").await.unwrap();

    let docs = store.list().await.unwrap();
    let names: Vec<&str> = docs.iter().map(|d| d.filename.as_str()).collect();
    assert_eq!(docs.len(), 2);
    assert!(names.contains(&"first.txt"));
    assert!(names.contains(&"second.txt"));
}
