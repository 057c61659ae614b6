//! # docqa
//!
//! An agentic document question-answering service.
//!
//! docqa ingests PDF, DOCX, and plain-text documents — extracting page
//! text, chunking it losslessly, and embedding the chunks into a Qdrant
//! collection — and answers questions about them through a tool-calling
//! agent loop over an OpenAI-compatible chat model, with per-answer source
//! attribution (filename, page, relevance score).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌─────────┐
//! │  Upload  │──▶│   Pipeline     │──▶│ Qdrant   │
//! │ pdf/docx │   │ Extract+Chunk │   │ +SQLite  │
//! │   /txt   │   │    +Embed     │   └────┬────┘
//! └──────────┘   └───────────────┘        │
//!                                         ▼
//!                 ┌───────────┐     ┌──────────┐
//!                 │ Agent loop │◀──▶│ Retrieval │
//!                 │ (chat LLM) │    │   tool    │
//!                 └─────┬─────┘     └──────────┘
//!                       ▼
//!               answer + sources
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa init                        # create database and collection
//! docqa ingest report.pdf           # ingest a document
//! docqa list                        # list ingested documents
//! docqa ask "what does it say?"     # ask a question
//! docqa serve                       # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`splitter`] | Lossless recursive text chunking |
//! | [`extract`] | PDF/DOCX/TXT text extraction |
//! | [`embedding`] | Embedding gateway |
//! | [`vector`] | Qdrant vector index |
//! | [`store`] | Document metadata store |
//! | [`ingest`] | Ingestion pipeline |
//! | [`llm`] | Chat-completions client |
//! | [`retrieval`] | Document search tool |
//! | [`agent`] | Tool-calling agent loop |
//! | [`citations`] | Source tag rendering and parsing |
//! | [`query`] | Query orchestrator |
//! | [`server`] | HTTP API server |

pub mod agent;
pub mod citations;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod query;
pub mod retrieval;
pub mod server;
pub mod splitter;
pub mod store;
pub mod vector;
