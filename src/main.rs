//! # docqa CLI
//!
//! The `docqa` binary is the primary interface for the document
//! question-answering service. It provides commands for database and
//! collection initialization, document ingestion and management, asking
//! questions, and starting the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the SQLite database and the vector collection |
//! | `docqa ingest <file>` | Ingest a PDF, DOCX, or TXT document |
//! | `docqa list` | List ingested documents |
//! | `docqa delete <id>` | Delete a document and its vectors |
//! | `docqa ask "<question>"` | Ask a question about the documents |
//! | `docqa serve` | Start the HTTP API server |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use docqa::agent::AgentLoop;
use docqa::config::{self, Config};
use docqa::db;
use docqa::embedding::{Embedder, OpenAiEmbedder};
use docqa::ingest::IngestPipeline;
use docqa::llm::OpenAiChatClient;
use docqa::query::QueryEngine;
use docqa::retrieval::RetrievalTool;
use docqa::server;
use docqa::store::DocumentStore;
use docqa::vector::{QdrantIndex, VectorStore};

/// docqa CLI — an agentic document question-answering service.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "docqa — ask questions about your documents",
    version,
    long_about = "docqa ingests PDF, DOCX, and plain-text documents into a vector index \
    and answers questions about them through a tool-calling agent loop over an \
    OpenAI-compatible chat model, with per-answer source attribution."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docqa.toml`. Database, model, vector store,
    /// and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database and vector collection.
    ///
    /// Creates the SQLite database file with its schema and the Qdrant
    /// collection. Idempotent — running it multiple times is safe.
    Init,

    /// Ingest a document.
    ///
    /// Extracts text, chunks it, embeds the chunks, and stores them in
    /// the vector index. Supported formats: pdf, docx, txt.
    Ingest {
        /// Path to the document file.
        file: PathBuf,
    },

    /// List ingested documents, newest first.
    List,

    /// Delete a document and all of its vectors.
    Delete {
        /// Document id (as shown by `docqa list`).
        id: String,
    },

    /// Ask a question about the ingested documents.
    ///
    /// Runs the agent loop and prints the answer followed by the sources
    /// it drew on.
    Ask {
        /// The question.
        question: String,

        /// Maximum number of excerpts per search.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// document and question-answering endpoints.
    Serve,
}

/// The wired storage and model clients behind every command.
struct Components {
    store: Arc<DocumentStore>,
    embedder: Arc<dyn Embedder>,
    vector: Arc<dyn VectorStore>,
    api_key: String,
}

async fn build_components(cfg: &Config) -> Result<Components> {
    let api_key = std::env::var(&cfg.llm.api_key_env).unwrap_or_default();

    let pool = db::connect(cfg).await?;
    let store = Arc::new(DocumentStore::new(pool));
    store.init_schema().await?;

    let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(
        &cfg.embedding,
        &cfg.llm.base_url,
        api_key.clone(),
    )?);
    let vector: Arc<dyn VectorStore> = Arc::new(QdrantIndex::new(&cfg.vector, cfg.embedding.dims)?);

    Ok(Components {
        store,
        embedder,
        vector,
        api_key,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let components = build_components(&cfg).await?;
            components.vector.ensure_collection().await?;
            println!("Database and collection initialized successfully.");
        }
        Commands::Ingest { file } => {
            run_ingest(&cfg, &file).await?;
        }
        Commands::List => {
            run_list(&cfg).await?;
        }
        Commands::Delete { id } => {
            run_delete(&cfg, &id).await?;
        }
        Commands::Ask { question, top_k } => {
            run_ask(&cfg, &question, top_k).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_ingest(cfg: &Config, file: &PathBuf) -> Result<()> {
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("invalid file path")?
        .to_string();
    let bytes =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;

    let components = build_components(cfg).await?;
    components.vector.ensure_collection().await?;

    let pipeline = IngestPipeline::new(
        components.store,
        components.embedder,
        components.vector,
        cfg.ingestion.clone(),
    );

    let document = pipeline.ingest(&filename, &bytes).await?;
    println!(
        "Ingested {} ({} chunks, id {})",
        document.filename, document.chunk_count, document.id
    );
    Ok(())
}

async fn run_list(cfg: &Config) -> Result<()> {
    let components = build_components(cfg).await?;
    let documents = components.store.list().await?;

    if documents.is_empty() {
        println!("No documents ingested yet.");
        return Ok(());
    }

    for doc in &documents {
        println!(
            "{}  {}  {}  {} chunks  {}",
            doc.id,
            doc.file_type,
            doc.uploaded_at.format("%Y-%m-%d %H:%M"),
            doc.chunk_count,
            doc.filename
        );
    }
    println!("{} document(s)", documents.len());
    Ok(())
}

async fn run_delete(cfg: &Config, id: &str) -> Result<()> {
    let components = build_components(cfg).await?;
    let pipeline = IngestPipeline::new(
        components.store,
        components.embedder,
        components.vector,
        cfg.ingestion.clone(),
    );

    if pipeline.delete_document(id).await? {
        println!("Deleted document {}", id);
    } else {
        println!("No document with id {}", id);
    }
    Ok(())
}

async fn run_ask(cfg: &Config, question: &str, top_k: Option<usize>) -> Result<()> {
    let components = build_components(cfg).await?;

    let chat = Arc::new(OpenAiChatClient::new(&cfg.llm, components.api_key.clone())?);
    let retriever = Arc::new(RetrievalTool::new(
        components.embedder.clone(),
        components.vector.clone(),
    ));
    let agent = AgentLoop::new(chat, retriever, cfg.agent.clone());
    let engine = QueryEngine::new(components.store, agent, cfg.agent.language.clone());

    let answer = engine.process_query(question, &[], top_k).await;

    println!("{}", answer.message);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &answer.sources {
            println!(
                "  {} (page {}, score {:.2})",
                source.filename, source.page, source.score
            );
        }
    }
    Ok(())
}
