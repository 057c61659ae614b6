use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub vector: VectorConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL (e.g. `https://api.regolo.ai/v1`).
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible base URL; defaults to the LLM base URL when absent.
    #[serde(default)]
    pub base_url: Option<String>,
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    /// Qdrant REST endpoint (e.g. `http://localhost:6333`).
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            score_threshold: default_score_threshold(),
            max_turns: default_max_turns(),
            language: default_language(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

fn default_api_key_env() -> String {
    "DOCQA_API_KEY".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    5
}
fn default_batch_size() -> usize {
    10
}
fn default_dims() -> usize {
    4096
}
fn default_collection() -> String {
    "documents".to_string()
}
fn default_max_file_size() -> usize {
    10 * 1024 * 1024
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_top_k() -> usize {
    5
}
fn default_score_threshold() -> f32 {
    0.3
}
fn default_max_turns() -> usize {
    6
}
fn default_language() -> String {
    "English".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.ingestion.chunk_size == 0 {
        anyhow::bail!("ingestion.chunk_size must be > 0");
    }

    if config.ingestion.chunk_overlap >= config.ingestion.chunk_size {
        anyhow::bail!(
            "ingestion.chunk_overlap ({}) must be smaller than ingestion.chunk_size ({})",
            config.ingestion.chunk_overlap,
            config.ingestion.chunk_size
        );
    }

    if config.ingestion.max_file_size == 0 {
        anyhow::bail!("ingestion.max_file_size must be > 0");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    if config.agent.top_k == 0 {
        anyhow::bail!("agent.top_k must be >= 1");
    }

    if config.agent.max_turns == 0 {
        anyhow::bail!("agent.max_turns must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.agent.score_threshold) {
        anyhow::bail!("agent.score_threshold must be in [0.0, 1.0]");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_toml() -> String {
        r#"
[db]
path = "./data/docqa.sqlite"

[llm]
base_url = "https://api.example.com/v1"
model = "gpt-oss-120b"

[embedding]
model = "qwen3-embedding-8b"
dims = 4096

[vector]
url = "http://localhost:6333"

[server]
bind = "127.0.0.1:8000"
"#
        .to_string()
    }

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse(&base_toml()).unwrap();
        assert_eq!(config.ingestion.chunk_size, 1000);
        assert_eq!(config.ingestion.chunk_overlap, 200);
        assert_eq!(config.agent.top_k, 5);
        assert_eq!(config.agent.max_turns, 6);
        assert_eq!(config.vector.collection, "documents");
        assert!((config.agent.score_threshold - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let toml_str = format!(
            "{}\n[ingestion]\nchunk_size = 100\nchunk_overlap = 100\n",
            base_toml()
        );
        assert!(parse(&toml_str).is_err());
    }

    #[test]
    fn zero_dims_rejected() {
        let toml_str = base_toml().replace("dims = 4096", "dims = 0");
        assert!(parse(&toml_str).is_err());
    }

    #[test]
    fn score_threshold_out_of_range_rejected() {
        let toml_str = format!("{}\n[agent]\nscore_threshold = 1.5\n", base_toml());
        assert!(parse(&toml_str).is_err());
    }
}
