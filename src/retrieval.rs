//! Document search tool exposed to the agent.
//!
//! Embeds the query, searches the vector index, and renders the hits as
//! tagged context blocks for the model, alongside the structured sources
//! the orchestrator uses for attribution. The tool never fails its caller:
//! infrastructure errors collapse into a fixed apology string so the agent
//! loop can keep going.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::citations::{hit_source, render_blocks};
use crate::embedding::Embedder;
use crate::models::Source;
use crate::vector::VectorStore;

/// Tool name the model addresses in its tool calls.
pub const SEARCH_TOOL_NAME: &str = "search_documents";

/// Observation text when the search ran but nothing cleared the score
/// threshold.
pub const NO_RESULTS_TEXT: &str = "No relevant documents found.";

/// Observation text when embedding or the index failed.
pub const SEARCH_ERROR_TEXT: &str = "I encountered an error while searching the documents.";

/// What one tool invocation hands back: the text the model sees, plus the
/// structured sources behind it.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub rendered: String,
    pub sources: Vec<Source>,
}

impl ToolOutput {
    fn sentinel(text: &str) -> Self {
        Self {
            rendered: text.to_string(),
            sources: Vec::new(),
        }
    }
}

/// Interface the agent loop searches through. Implemented by
/// [`RetrievalTool`]; test doubles implement it directly.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Run one search. Infallible by contract: errors surface as the
    /// [`SEARCH_ERROR_TEXT`] sentinel with no sources.
    async fn search(&self, query: &str, top_k: usize, score_threshold: f32) -> ToolOutput;
}

/// The OpenAI function schema offered to the model for this tool.
pub fn search_tool_schema(default_top_k: usize) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": SEARCH_TOOL_NAME,
            "description": "Search the uploaded documents for passages relevant to a query. \
                            Returns excerpts with filename, page and relevance score.",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to look for in the documents."
                    },
                    "top_k": {
                        "type": "integer",
                        "description": format!("Maximum number of excerpts to return (default {}).", default_top_k)
                    }
                },
                "required": ["query"]
            }
        }
    })
}

/// Embedder + vector index behind the [`Retriever`] interface.
pub struct RetrievalTool {
    embedder: Arc<dyn Embedder>,
    vector: Arc<dyn VectorStore>,
}

impl RetrievalTool {
    pub fn new(embedder: Arc<dyn Embedder>, vector: Arc<dyn VectorStore>) -> Self {
        Self { embedder, vector }
    }

    async fn try_search(
        &self,
        query: &str,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<ToolOutput> {
        let vector = self.embedder.embed(query).await?;
        let hits = self
            .vector
            .search(&vector, top_k, score_threshold, None)
            .await?;

        if hits.is_empty() {
            return Ok(ToolOutput::sentinel(NO_RESULTS_TEXT));
        }

        let sources = hits.iter().map(hit_source).collect();
        Ok(ToolOutput {
            rendered: render_blocks(&hits),
            sources,
        })
    }
}

#[async_trait]
impl Retriever for RetrievalTool {
    async fn search(&self, query: &str, top_k: usize, score_threshold: f32) -> ToolOutput {
        match self.try_search(query, top_k, score_threshold).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, "document search failed");
                ToolOutput::sentinel(SEARCH_ERROR_TEXT)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchHit;
    use anyhow::bail;

    struct FixedEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            if self.fail {
                bail!("embedding down");
            }
            Ok(vec![0.1, 0.2])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2]).collect())
        }

        fn dims(&self) -> usize {
            2
        }
    }

    struct FixedIndex {
        hits: Vec<SearchHit>,
    }

    #[async_trait]
    impl VectorStore for FixedIndex {
        async fn ensure_collection(&self) -> Result<()> {
            Ok(())
        }

        async fn upsert(&self, _records: &[crate::models::VectorRecord]) -> Result<()> {
            Ok(())
        }

        async fn search(
            &self,
            _vector: &[f32],
            _limit: usize,
            _score_threshold: f32,
            _document_id: Option<&str>,
        ) -> Result<Vec<SearchHit>> {
            Ok(self.hits.clone())
        }

        async fn scroll_by_document(&self, _document_id: &str) -> Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }

        async fn delete_by_document(&self, _document_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn hit(filename: &str, page: Option<u32>, score: f32, text: &str) -> SearchHit {
        SearchHit {
            id: "p1".to_string(),
            score,
            document_id: "doc1".to_string(),
            chunk_index: 0,
            page_number: page,
            filename: filename.to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn renders_hits_with_sources() {
        let tool = RetrievalTool::new(
            Arc::new(FixedEmbedder { fail: false }),
            Arc::new(FixedIndex {
                hits: vec![hit("a.pdf", Some(3), 0.91, "relevant passage")],
            }),
        );

        let output = tool.search("query", 5, 0.3).await;
        assert!(output.rendered.contains("<metadata_source_1>"));
        assert!(output.rendered.contains("filename:a.pdf"));
        assert!(output.rendered.contains("relevant passage"));
        assert_eq!(output.sources.len(), 1);
        assert_eq!(output.sources[0].page, "3");
    }

    #[tokio::test]
    async fn empty_results_yield_sentinel() {
        let tool = RetrievalTool::new(
            Arc::new(FixedEmbedder { fail: false }),
            Arc::new(FixedIndex { hits: Vec::new() }),
        );

        let output = tool.search("query", 5, 0.3).await;
        assert_eq!(output.rendered, NO_RESULTS_TEXT);
        assert!(output.sources.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_yields_error_sentinel() {
        let tool = RetrievalTool::new(
            Arc::new(FixedEmbedder { fail: true }),
            Arc::new(FixedIndex { hits: Vec::new() }),
        );

        let output = tool.search("query", 5, 0.3).await;
        assert_eq!(output.rendered, SEARCH_ERROR_TEXT);
        assert!(output.sources.is_empty());
    }

    #[test]
    fn schema_requires_query() {
        let schema = search_tool_schema(5);
        assert_eq!(schema["function"]["name"], SEARCH_TOOL_NAME);
        assert_eq!(schema["function"]["parameters"]["required"][0], "query");
    }
}
