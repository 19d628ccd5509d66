//! Embedding host client.
//!
//! Requests vectors from the embedding host over HTTP with a process-local
//! cache keyed by the MD5 of the (truncated) input text. Cache insertions
//! may race under concurrency; the map only grows, so duplicate work is
//! the worst case.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::metadata::md5_hex;

/// Inputs are cut to this many characters before hashing and sending; the
/// host truncates to its own context window anyway.
const MAX_INPUT_CHARS: usize = 8000;

pub struct EmbeddingClient {
    http: reqwest::Client,
    host: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
    cache: Mutex<HashMap<String, Vec<f32>>>,
    latency: Option<prometheus::Histogram>,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimensions: config.dimensions,
            timeout: Duration::from_secs(config.timeout_secs),
            cache: Mutex::new(HashMap::new()),
            latency: None,
        })
    }

    /// Record request latency into the given histogram.
    pub fn with_latency_histogram(mut self, histogram: prometheus::Histogram) -> Self {
        self.latency = Some(histogram);
        self
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed against the configured host.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_host(text, &self.host).await
    }

    /// Embed against an alternate host for the duration of one call; used
    /// by indexing jobs that offload to a GPU-backed host.
    pub async fn embed_with_host(&self, text: &str, host: &str) -> Result<Vec<f32>> {
        let input = truncate_input(text);
        let cache_key = md5_hex(input.as_bytes());

        if let Some(cached) = self.cache.lock().unwrap().get(&cache_key) {
            return Ok(cached.clone());
        }

        let started = std::time::Instant::now();
        let response = self
            .http
            .post(format!("{}/api/embed", host.trim_end_matches('/')))
            .timeout(self.timeout)
            .json(&serde_json::json!({
                "model": self.model,
                "input": input,
            }))
            .send()
            .await
            .context("embedding host unreachable")?;

        if !response.status().is_success() {
            bail!("embedding host returned {}", response.status());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .context("invalid embedding response")?;
        let vector = parse_embedding(&body)?;

        if vector.len() != self.dimensions {
            bail!(
                "embedding dimension mismatch: got {}, expected {}",
                vector.len(),
                self.dimensions
            );
        }

        if let Some(histogram) = &self.latency {
            histogram.observe(started.elapsed().as_secs_f64());
        }

        self.cache
            .lock()
            .unwrap()
            .insert(cache_key, vector.clone());
        Ok(vector)
    }

    /// Probe the embedding host (3 s budget); feeds component health.
    pub async fn probe(&self) -> bool {
        let url = format!("{}/api/tags", self.host);
        match self
            .http
            .get(&url)
            .timeout(Duration::from_secs(3))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    #[cfg(test)]
    pub fn cache_len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

fn truncate_input(text: &str) -> String {
    text.chars().take(MAX_INPUT_CHARS).collect()
}

/// Pull the first embedding out of `{"embeddings": [[...]]}`.
fn parse_embedding(body: &serde_json::Value) -> Result<Vec<f32>> {
    let first = body
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|a| a.first())
        .and_then(|v| v.as_array())
        .context("embedding response missing embeddings array")?;

    Ok(first
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_embedding_takes_first() {
        let body = serde_json::json!({
            "embeddings": [[0.1, 0.2], [0.9, 0.9]]
        });
        let v = parse_embedding(&body).unwrap();
        assert_eq!(v.len(), 2);
        assert!((v[0] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn parse_embedding_rejects_malformed() {
        assert!(parse_embedding(&serde_json::json!({"data": []})).is_err());
        assert!(parse_embedding(&serde_json::json!({"embeddings": []})).is_err());
    }

    #[test]
    fn truncation_is_char_safe() {
        let long = "é".repeat(MAX_INPUT_CHARS + 10);
        let cut = truncate_input(&long);
        assert_eq!(cut.chars().count(), MAX_INPUT_CHARS);
    }
}
