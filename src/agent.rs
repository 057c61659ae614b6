//! Tool-calling agent loop.
//!
//! Drives the chat model through bounded DECIDE/ACT turns: each turn the
//! model either answers in plain text (done) or requests one or more
//! `search_documents` calls, whose observations are appended to the
//! transcript in invocation order. When the turn budget runs out before a
//! plain answer arrives, the model is re-invoked once without tools and
//! told to answer from what it has gathered.

use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;

use crate::config::AgentConfig;
use crate::llm::{ChatMessage, ChatProvider};
use crate::models::Source;
use crate::retrieval::{search_tool_schema, Retriever, SEARCH_TOOL_NAME};

const FORCED_ANSWER_INSTRUCTION: &str =
    "Answer the user's question now, using only the document excerpts already \
     retrieved above. Do not request any more searches.";

/// System prompt the loop runs under.
pub fn system_prompt(language: &str) -> String {
    format!(
        "You are a helpful assistant that answers questions about the user's uploaded \
         documents. Use the search_documents tool to find relevant passages before \
         answering, and base your answer only on what the searches return. Do not \
         mention filenames, page numbers or relevance scores in your answer; source \
         attribution is handled separately. Answer in {}.",
        language
    )
}

/// What a finished run produced: the final answer, every structured source
/// gathered across tool invocations (in order, undeduplicated), and the
/// full transcript.
pub struct AgentOutcome {
    pub answer: String,
    pub sources: Vec<Source>,
    pub transcript: Vec<ChatMessage>,
}

pub struct AgentLoop {
    chat: Arc<dyn ChatProvider>,
    retriever: Arc<dyn Retriever>,
    config: AgentConfig,
}

impl AgentLoop {
    pub fn new(chat: Arc<dyn ChatProvider>, retriever: Arc<dyn Retriever>, config: AgentConfig) -> Self {
        Self {
            chat,
            retriever,
            config,
        }
    }

    /// Run the loop over a prepared transcript (system prompt, history,
    /// current question). `top_k` overrides the configured default when set.
    pub async fn run(
        &self,
        mut messages: Vec<ChatMessage>,
        top_k: Option<usize>,
    ) -> Result<AgentOutcome> {
        let default_top_k = top_k.unwrap_or(self.config.top_k);
        let tools = [search_tool_schema(default_top_k)];
        let mut sources: Vec<Source> = Vec::new();

        for turn in 0..self.config.max_turns {
            let reply = self.chat.complete(&messages, Some(&tools)).await?;

            if reply.tool_calls.is_empty() {
                let answer = reply.content.unwrap_or_default();
                tracing::debug!(turns = turn + 1, sources = sources.len(), "agent answered");
                return Ok(AgentOutcome {
                    answer,
                    sources,
                    transcript: messages,
                });
            }

            messages.push(ChatMessage::assistant_tool_calls(
                reply.content,
                reply.tool_calls.clone(),
            ));

            for call in &reply.tool_calls {
                let observation = if call.name == SEARCH_TOOL_NAME {
                    let (query, k) = parse_search_args(&call.arguments, default_top_k);
                    tracing::debug!(%query, top_k = k, "running document search");
                    let output = self
                        .retriever
                        .search(&query, k, self.config.score_threshold)
                        .await;
                    sources.extend(output.sources);
                    output.rendered
                } else {
                    tracing::warn!(tool = %call.name, "model requested unknown tool");
                    format!("Unknown tool: {}", call.name)
                };
                messages.push(ChatMessage::tool_result(call.id.clone(), observation));
            }
        }

        // Turn budget exhausted without a plain answer: one final
        // completion with tools withheld.
        tracing::warn!(max_turns = self.config.max_turns, "turn budget exhausted, forcing answer");
        messages.push(ChatMessage::user(FORCED_ANSWER_INSTRUCTION));
        let reply = self.chat.complete(&messages, None).await?;

        Ok(AgentOutcome {
            answer: reply.content.unwrap_or_default(),
            sources,
            transcript: messages,
        })
    }
}

/// Pull `query` and `top_k` out of the model's raw JSON arguments, falling
/// back to an empty query and the configured k on malformed input.
fn parse_search_args(arguments: &str, default_top_k: usize) -> (String, usize) {
    let parsed: Value = serde_json::from_str(arguments).unwrap_or(Value::Null);
    let query = parsed
        .get("query")
        .and_then(|q| q.as_str())
        .unwrap_or_default()
        .to_string();
    let top_k = parsed
        .get("top_k")
        .and_then(|k| k.as_u64())
        .map(|k| k as usize)
        .filter(|&k| k > 0)
        .unwrap_or(default_top_k);
    (query, top_k)
}
