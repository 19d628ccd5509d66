//! LLM gateway client: reranking, query expansion, and answer synthesis.
//!
//! Reranking poses each candidate as a yes/no relevance question to a
//! small, fast model, with bounded concurrency. A failed call scores the
//! candidate 0 rather than failing the query. Nothing is cached; reranking
//! runs per query.

use anyhow::{bail, Context, Result};
use futures::stream::{self, StreamExt};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::models::{truncate_chars, SearchHit};

pub struct LlmGateway {
    http: reqwest::Client,
    base_url: Option<String>,
    api_token: Option<String>,
    rerank_model: String,
    answer_model: String,
    timeout: Duration,
}

impl LlmGateway {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base_url: config
                .gateway_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            api_token: config.api_token.clone(),
            rerank_model: config.rerank_model.clone(),
            answer_model: config.answer_model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }

    /// One chat-completions round trip.
    pub async fn chat(&self, model: &str, prompt: &str) -> Result<String> {
        let base_url = self
            .base_url
            .as_ref()
            .context("LLM gateway is not configured")?;

        let mut request = self
            .http
            .post(format!("{}/v1/chat/completions", base_url))
            .timeout(self.timeout)
            .json(&serde_json::json!({
                "model": model,
                "messages": [{"role": "user", "content": prompt}],
            }));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("LLM gateway unreachable")?;
        if !response.status().is_success() {
            bail!("LLM gateway returned {}", response.status());
        }

        let body: serde_json::Value = response.json().await.context("invalid LLM response")?;
        let content = body
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .context("LLM response missing message content")?;

        Ok(content.to_string())
    }

    /// Score each candidate's relevance to the query in [0, 1]. Calls run
    /// with bounded concurrency; per-call failures score 0.
    pub async fn rerank(&self, query: &str, docs: &[SearchHit], concurrency: usize) -> Vec<f64> {
        stream::iter(0..docs.len())
            .map(|i| self.score_one(query, &docs[i]))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    async fn score_one(&self, query: &str, doc: &SearchHit) -> f64 {
        let prompt = format!(
            "Question: {}\n\nDocument:\n{}\n\nIs this document relevant to answering the question? Answer only yes or no.",
            query,
            truncate_chars(&doc.content, 1500),
        );
        match self.chat(&self.rerank_model, &prompt).await {
            Ok(answer) => relevance_from_answer(&answer),
            Err(e) => {
                tracing::debug!(error = %e, file = %doc.file_path, "rerank call failed");
                0.0
            }
        }
    }

    /// Ask for up to two rephrasings of the query. The original is always
    /// first; on any failure only the original is returned.
    pub async fn expand_query(&self, query: &str) -> Vec<String> {
        let prompt = format!(
            "Rephrase this search query two different ways to improve recall over personal notes. Reply with one rephrasing per line and nothing else.\n\nQuery: {}",
            query
        );
        let mut queries = vec![query.to_string()];
        match self.chat(&self.rerank_model, &prompt).await {
            Ok(response) => {
                for line in response
                    .lines()
                    .map(|l| l.trim().trim_start_matches(['-', '*', ' ']).trim())
                    .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case(query))
                    .take(2)
                {
                    queries.push(line.to_string());
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "query expansion failed");
            }
        }
        queries
    }

    /// Answer synthesis over retrieved context, using the larger model.
    pub async fn answer(&self, prompt: &str) -> Result<String> {
        self.chat(&self.answer_model, prompt).await
    }
}

fn relevance_from_answer(answer: &str) -> f64 {
    let lower = answer.to_lowercase();
    if lower.contains("yes") {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_parsing() {
        assert_eq!(relevance_from_answer("Yes."), 1.0);
        assert_eq!(relevance_from_answer("yes, it covers the topic"), 1.0);
        assert_eq!(relevance_from_answer("No"), 0.0);
        assert_eq!(relevance_from_answer(""), 0.0);
    }

    #[test]
    fn disabled_gateway() {
        let gateway = LlmGateway::new(&LlmConfig::default()).unwrap();
        assert!(!gateway.is_enabled());
    }

    #[tokio::test]
    async fn expand_query_falls_back_to_original() {
        // No gateway configured: expansion degrades to just the original.
        let gateway = LlmGateway::new(&LlmConfig::default()).unwrap();
        let queries = gateway.expand_query("database migration").await;
        assert_eq!(queries, vec!["database migration".to_string()]);
    }

    #[tokio::test]
    async fn rerank_without_gateway_scores_zero() {
        let gateway = LlmGateway::new(&LlmConfig::default()).unwrap();
        let doc = SearchHit {
            score: 1.0,
            file_path: "/v/a.md".to_string(),
            title: "A".to_string(),
            content: "text".to_string(),
            excerpt: String::new(),
            date: None,
            people: Vec::new(),
            category: "notes".to_string(),
            vault: "work".to_string(),
            engine: "bm25",
        };
        let scores = gateway.rerank("query", &[doc], 5).await;
        assert_eq!(scores, vec![0.0]);
    }
}
