//! Configuration parsing and validation.
//!
//! Recall is configured via a TOML file (default: `./config/recall.toml`).
//! The config defines the vault roots, storage paths, embedding host, LLM
//! gateway, chunking parameters, retrieval tuning, and server bind address.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub vaults: VaultsConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub pdf: PdfConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub api_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VaultsConfig {
    pub work_notes: PathBuf,
    pub personal_notes: PathBuf,
    #[serde(default)]
    pub work_pdfs: Option<PathBuf>,
    #[serde(default)]
    pub personal_pdfs: Option<PathBuf>,
    /// Glob patterns for paths excluded from indexing, matched against the
    /// path relative to the vault root.
    #[serde(default)]
    pub excluded_globs: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub vector_db_path: PathBuf,
    pub keyword_db_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding host, e.g. `http://localhost:11434`.
    pub host: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Chat-completions gateway base URL; reranking and answer synthesis
    /// are disabled when unset.
    #[serde(default)]
    pub gateway_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_rerank_model")]
    pub rerank_model: String,
    #[serde(default = "default_answer_model")]
    pub answer_model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            gateway_url: None,
            api_token: None,
            rerank_model: default_rerank_model(),
            answer_model: default_answer_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size_tokens: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_tokens: default_chunk_size(),
            chunk_overlap_tokens: default_chunk_overlap(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,
    /// Candidates fetched from each engine before fusion.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default = "default_blend_alpha")]
    pub rerank_blend_alpha: f64,
    #[serde(default = "default_rerank_top_n")]
    pub rerank_top_n: usize,
    #[serde(default = "default_rerank_concurrency")]
    pub rerank_concurrency: usize,
    #[serde(default = "default_max_context_chunks")]
    pub max_context_chunks: usize,
    /// Domain-specific additions to the built-in person-detection stopwords.
    #[serde(default)]
    pub extra_stopwords: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            candidate_k: default_candidate_k(),
            rrf_k: default_rrf_k(),
            rerank_blend_alpha: default_blend_alpha(),
            rerank_top_n: default_rerank_top_n(),
            rerank_concurrency: default_rerank_concurrency(),
            max_context_chunks: default_max_context_chunks(),
            extra_stopwords: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PdfConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_dimensions() -> usize {
    768
}
fn default_embed_timeout() -> u64 {
    30
}
fn default_rerank_model() -> String {
    "qwen2.5:0.5b".to_string()
}
fn default_answer_model() -> String {
    "claude".to_string()
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_search_limit() -> usize {
    10
}
fn default_candidate_k() -> usize {
    30
}
fn default_rrf_k() -> f64 {
    60.0
}
fn default_blend_alpha() -> f64 {
    0.5
}
fn default_rerank_top_n() -> usize {
    30
}
fn default_rerank_concurrency() -> usize {
    5
}
fn default_max_context_chunks() -> usize {
    5
}
fn default_true() -> bool {
    true
}

/// A vault in indexing scope: its name plus the roots scanned for it.
#[derive(Debug, Clone)]
pub struct VaultPaths {
    pub name: &'static str,
    pub notes_root: PathBuf,
    pub pdf_root: Option<PathBuf>,
}

pub const VAULT_NAMES: [&str; 2] = ["work", "personal"];

impl Config {
    /// Resolve a vault scope string (`all` | `work` | `personal`) to the
    /// set of vaults it covers.
    pub fn vaults_in_scope(&self, scope: &str) -> Result<Vec<VaultPaths>> {
        let mut out = Vec::new();
        if scope == "all" || scope == "work" {
            out.push(VaultPaths {
                name: "work",
                notes_root: self.vaults.work_notes.clone(),
                pdf_root: self.vaults.work_pdfs.clone(),
            });
        }
        if scope == "all" || scope == "personal" {
            out.push(VaultPaths {
                name: "personal",
                notes_root: self.vaults.personal_notes.clone(),
                pdf_root: self.vaults.personal_pdfs.clone(),
            });
        }
        if out.is_empty() {
            anyhow::bail!("unknown vault scope: {}. Use all, work, or personal.", scope);
        }
        Ok(out)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    if config.chunking.chunk_size_tokens == 0 {
        anyhow::bail!("chunking.chunk_size_tokens must be > 0");
    }

    if config.embedding.dimensions == 0 {
        anyhow::bail!("embedding.dimensions must be > 0");
    }

    if !(0.0..=1.0).contains(&config.search.rerank_blend_alpha) {
        anyhow::bail!("search.rerank_blend_alpha must be in [0.0, 1.0]");
    }

    if config.search.default_limit == 0 {
        anyhow::bail!("search.default_limit must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> String {
        r#"
[server]
bind = "127.0.0.1:8600"
api_token = "secret"

[vaults]
work_notes = "/data/obsidian/work"
personal_notes = "/data/obsidian/personal"

[storage]
vector_db_path = "/data/recall/vectors.sqlite"
keyword_db_path = "/data/recall/keywords.sqlite"

[embedding]
host = "http://localhost:11434"
"#
        .to_string()
    }

    #[test]
    fn parses_minimal_config_with_defaults() {
        let cfg: Config = toml::from_str(&minimal_toml()).unwrap();
        assert_eq!(cfg.embedding.dimensions, 768);
        assert_eq!(cfg.chunking.chunk_size_tokens, 500);
        assert_eq!(cfg.search.rrf_k, 60.0);
        assert!(cfg.pdf.enabled);
        assert!(cfg.llm.gateway_url.is_none());
    }

    #[test]
    fn scope_resolution() {
        let cfg: Config = toml::from_str(&minimal_toml()).unwrap();
        assert_eq!(cfg.vaults_in_scope("all").unwrap().len(), 2);
        assert_eq!(cfg.vaults_in_scope("work").unwrap()[0].name, "work");
        assert!(cfg.vaults_in_scope("shared").is_err());
    }
}
