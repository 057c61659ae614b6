//! Query orchestrator.
//!
//! The outward-facing entry point for questions: short-circuits on an
//! empty corpus, assembles the transcript from history, runs the agent
//! loop, and deduplicates the gathered sources. By contract it never
//! fails its caller; any internal error collapses into an apologetic
//! answer with no sources.

use std::sync::Arc;

use crate::agent::{system_prompt, AgentLoop, AgentOutcome};
use crate::citations::{dedup_sources, parse_source_tags};
use crate::llm::ChatMessage;
use crate::models::{HistoryMessage, QueryAnswer, Source};
use crate::store::DocumentStore;

/// Answer when no documents have been ingested yet. The agent, embedder
/// and index are not touched in this case.
pub const EMPTY_CORPUS_ANSWER: &str =
    "There are no documents in the knowledge base yet. Upload a document before asking questions.";

/// Answer when the run failed outright.
pub const FAILURE_ANSWER: &str =
    "I'm sorry, something went wrong while answering your question. Please try again.";

pub struct QueryEngine {
    store: Arc<DocumentStore>,
    agent: AgentLoop,
    language: String,
}

impl QueryEngine {
    pub fn new(store: Arc<DocumentStore>, agent: AgentLoop, language: String) -> Self {
        Self {
            store,
            agent,
            language,
        }
    }

    /// Answer one question against the corpus. `history` carries prior
    /// turns of the conversation, oldest first; `top_k` overrides the
    /// configured per-search result count when set.
    pub async fn process_query(
        &self,
        query: &str,
        history: &[HistoryMessage],
        top_k: Option<usize>,
    ) -> QueryAnswer {
        match self.store.count().await {
            Ok(0) => {
                tracing::debug!("query against empty corpus");
                return QueryAnswer {
                    message: EMPTY_CORPUS_ANSWER.to_string(),
                    sources: Vec::new(),
                };
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "document count failed");
                return QueryAnswer {
                    message: FAILURE_ANSWER.to_string(),
                    sources: Vec::new(),
                };
            }
        }

        let messages = build_transcript(&self.language, history, query);

        match self.agent.run(messages, top_k).await {
            Ok(outcome) => {
                let sources = collect_sources(&outcome);
                QueryAnswer {
                    message: outcome.answer,
                    sources,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "agent run failed");
                QueryAnswer {
                    message: FAILURE_ANSWER.to_string(),
                    sources: Vec::new(),
                }
            }
        }
    }
}

/// System prompt, prior turns, then the current question.
fn build_transcript(
    language: &str,
    history: &[HistoryMessage],
    query: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt(language)));

    for turn in history {
        match turn.role.as_str() {
            "user" => messages.push(ChatMessage::user(turn.content.clone())),
            "assistant" => messages.push(ChatMessage::assistant(turn.content.clone())),
            other => {
                tracing::warn!(role = other, "skipping history turn with unknown role");
            }
        }
    }

    messages.push(ChatMessage::user(query.to_string()));
    messages
}

/// Deduplicated sources for the answer. The structured side-channel from
/// the tool is authoritative; if it is empty, fall back to scanning every
/// transcript message for source tags. Tags can appear outside tool
/// observations, e.g. in replayed history turns.
fn collect_sources(outcome: &AgentOutcome) -> Vec<Source> {
    if !outcome.sources.is_empty() {
        return dedup_sources(outcome.sources.clone());
    }

    let mut parsed = Vec::new();
    for msg in &outcome.transcript {
        if let Some(content) = &msg.content {
            parsed.extend(parse_source_tags(content));
        }
    }
    dedup_sources(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentLoop;
    use crate::config::AgentConfig;
    use crate::llm::{AssistantReply, ChatProvider, Role};
    use crate::models::{Document, FileType};
    use crate::retrieval::{Retriever, ToolOutput};
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::Value;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChat {
        calls: AtomicUsize,
        reply: Option<String>,
    }

    #[async_trait]
    impl ChatProvider for CountingChat {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _tools: Option<&[Value]>,
        ) -> Result<AssistantReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(text) => Ok(AssistantReply {
                    content: Some(text.clone()),
                    tool_calls: Vec::new(),
                }),
                None => anyhow::bail!("model unavailable"),
            }
        }
    }

    struct NoopRetriever;

    #[async_trait]
    impl Retriever for NoopRetriever {
        async fn search(&self, _query: &str, _top_k: usize, _score_threshold: f32) -> ToolOutput {
            ToolOutput {
                rendered: "No relevant documents found.".to_string(),
                sources: Vec::new(),
            }
        }
    }

    async fn memory_store() -> Arc<DocumentStore> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = DocumentStore::new(pool);
        store.init_schema().await.unwrap();
        Arc::new(store)
    }

    async fn seed_document(store: &DocumentStore) {
        store
            .put(&Document {
                id: "d1".to_string(),
                filename: "a.pdf".to_string(),
                file_type: FileType::Pdf,
                file_size: 100,
                uploaded_at: Utc::now(),
                chunk_count: 1,
            })
            .await
            .unwrap();
    }

    fn engine(store: Arc<DocumentStore>, chat: Arc<CountingChat>) -> QueryEngine {
        let agent = AgentLoop::new(chat, Arc::new(NoopRetriever), AgentConfig::default());
        QueryEngine::new(store, agent, "English".to_string())
    }

    #[tokio::test]
    async fn empty_corpus_short_circuits_without_model_calls() {
        let store = memory_store().await;
        let chat = Arc::new(CountingChat {
            calls: AtomicUsize::new(0),
            reply: Some("should not happen".to_string()),
        });
        let engine = engine(store, chat.clone());

        let answer = engine.process_query("anything?", &[], None).await;
        assert_eq!(answer.message, EMPTY_CORPUS_ANSWER);
        assert!(answer.sources.is_empty());
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn model_failure_yields_apology_not_error() {
        let store = memory_store().await;
        seed_document(&store).await;
        let chat = Arc::new(CountingChat {
            calls: AtomicUsize::new(0),
            reply: None,
        });
        let engine = engine(store, chat);

        let answer = engine.process_query("anything?", &[], None).await;
        assert_eq!(answer.message, FAILURE_ANSWER);
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn plain_answer_passes_through() {
        let store = memory_store().await;
        seed_document(&store).await;
        let chat = Arc::new(CountingChat {
            calls: AtomicUsize::new(0),
            reply: Some("The report covers Q3.".to_string()),
        });
        let engine = engine(store, chat);

        let answer = engine.process_query("what is covered?", &[], None).await;
        assert_eq!(answer.message, "The report covers Q3.");
        assert!(answer.sources.is_empty());
    }

    #[test]
    fn transcript_includes_history_in_order() {
        let history = vec![
            HistoryMessage {
                role: "user".to_string(),
                content: "first question".to_string(),
            },
            HistoryMessage {
                role: "assistant".to_string(),
                content: "first answer".to_string(),
            },
            HistoryMessage {
                role: "system".to_string(),
                content: "ignored".to_string(),
            },
        ];
        let messages = build_transcript("English", &history, "second question");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content.as_deref(), Some("first question"));
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[3].content.as_deref(), Some("second question"));
    }

    #[test]
    fn transcript_fallback_recovers_sources_from_tool_turns() {
        let outcome = AgentOutcome {
            answer: "done".to_string(),
            sources: Vec::new(),
            transcript: vec![ChatMessage::tool_result(
                "call_1",
                "<metadata_source_1>\nfilename:a.pdf\npage:2\nscore:0.71\n</metadata_source_1>\ntext",
            )],
        };
        let sources = collect_sources(&outcome);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].filename, "a.pdf");
        assert_eq!(sources[0].page, "2");
    }

    #[test]
    fn transcript_fallback_scans_every_role() {
        // Replayed history can carry tags in user/assistant turns, not
        // just tool observations.
        let outcome = AgentOutcome {
            answer: "done".to_string(),
            sources: Vec::new(),
            transcript: vec![
                ChatMessage::user("earlier question"),
                ChatMessage::assistant(
                    "context was:\n<metadata_source_1>\nfilename:b.pdf\npage:4\nscore:0.66\n</metadata_source_1>\nbody",
                ),
            ],
        };
        let sources = collect_sources(&outcome);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].filename, "b.pdf");
        assert_eq!(sources[0].page, "4");
    }

    #[test]
    fn side_channel_sources_are_deduplicated() {
        let dup = Source {
            filename: "a.pdf".to_string(),
            page: "1".to_string(),
            score: 0.9,
        };
        let outcome = AgentOutcome {
            answer: "done".to_string(),
            sources: vec![dup.clone(), dup],
            transcript: Vec::new(),
        };
        assert_eq!(collect_sources(&outcome).len(), 1);
    }
}
