//! Search orchestrator.
//!
//! Dispatches the four search modes:
//!
//! | Mode | Pipeline |
//! |------|----------|
//! | `vector` | embed → nearest-neighbor scan |
//! | `bm25` | keyword search |
//! | `hybrid` | temporal parse → classifier → BM25 ∥ vector → RRF → normalize |
//! | `query` | LLM query expansion → per-variant hybrid → RRF → rerank → blend |
//!
//! Hybrid is the default. Person-intent queries boost the BM25 list 3:1
//! during fusion and search BM25 with the name tokens only. A failing
//! engine degrades the query to the surviving half.

use anyhow::{bail, Result};
use chrono::{Local, NaiveDate};
use std::sync::Arc;

use crate::classify::QueryClassifier;
use crate::config::{Config, VAULT_NAMES};
use crate::embedder::EmbeddingClient;
use crate::fusion::{normalize_scores, position_aware_blend, reciprocal_rank_fusion};
use crate::keyword_index::{KeywordHit, KeywordIndex};
use crate::metrics::Metrics;
use crate::models::{truncate_chars, SearchHit, SearchResult};
use crate::rerank::LlmGateway;
use crate::temporal::{parse_temporal, strip_temporal};
use crate::vector_index::{VectorFilters, VectorIndex};

/// One search request, as received from the HTTP surface or CLI.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_vault")]
    pub vault: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub person: Option<String>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_vault() -> String {
    "all".to_string()
}

fn default_mode() -> String {
    "hybrid".to_string()
}

/// A source reference attached to a synthesized answer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnswerSource {
    pub file_path: String,
    pub title: String,
    pub excerpt: String,
}

pub struct Searcher {
    embedder: Arc<EmbeddingClient>,
    vectors: Arc<VectorIndex>,
    keywords: Arc<KeywordIndex>,
    llm: Arc<LlmGateway>,
    classifier: QueryClassifier,
    config: Arc<Config>,
    metrics: Arc<Metrics>,
}

impl Searcher {
    pub fn new(
        embedder: Arc<EmbeddingClient>,
        vectors: Arc<VectorIndex>,
        keywords: Arc<KeywordIndex>,
        llm: Arc<LlmGateway>,
        config: Arc<Config>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let classifier = QueryClassifier::new(&config.search.extra_stopwords);
        Self {
            embedder,
            vectors,
            keywords,
            llm,
            classifier,
            config,
            metrics,
        }
    }

    /// Unified search entry point. Results carry scores in [0, 1] and are
    /// deduplicated by path in the fused modes.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        self.search_with_reference(request, Local::now().date_naive())
            .await
    }

    /// Same as [`Searcher::search`] with an injectable reference date for
    /// temporal expressions.
    pub async fn search_with_reference(
        &self,
        request: &SearchRequest,
        reference: NaiveDate,
    ) -> Result<Vec<SearchResult>> {
        match request.mode.as_str() {
            "vector" | "bm25" | "hybrid" | "query" => {}
            other => bail!(
                "Unknown search mode: {}. Use vector, bm25, hybrid, or query.",
                other
            ),
        }
        if !matches!(request.vault.as_str(), "all" | "work" | "personal") {
            bail!(
                "Unknown vault: {}. Use all, work, or personal.",
                request.vault
            );
        }

        let limit = request.limit.unwrap_or(self.config.search.default_limit);
        let started = std::time::Instant::now();

        let mut hits = match request.mode.as_str() {
            "vector" => {
                self.vector_search(
                    &request.query,
                    &request.vault,
                    request.category.as_deref(),
                    request.person.as_deref(),
                    request.date_from.as_deref(),
                    request.date_to.as_deref(),
                    limit,
                )
                .await
            }
            "bm25" => {
                let mut hits = self
                    .bm25_search(
                        &request.query,
                        &request.vault,
                        request.person.as_deref(),
                        request.date_from.as_deref(),
                        request.date_to.as_deref(),
                        limit,
                    )
                    .await;
                normalize_scores(&mut hits);
                hits
            }
            "query" => self.query_search(request, limit, reference).await,
            _ => {
                self.hybrid_search(
                    &request.query,
                    &request.vault,
                    request.category.as_deref(),
                    request.person.as_deref(),
                    request.date_from.as_deref(),
                    request.date_to.as_deref(),
                    limit,
                    reference,
                )
                .await
            }
        };

        // The keyword store has no category column in its match path;
        // re-apply the category filter over the merged output.
        if let Some(category) = request.category.as_deref() {
            hits.retain(|h| h.category == category);
        }
        hits.truncate(limit);

        self.metrics
            .search_seconds
            .with_label_values(&[request.mode.as_str(), request.vault.as_str()])
            .observe(started.elapsed().as_secs_f64());
        self.metrics
            .search_results
            .with_label_values(&[request.mode.as_str()])
            .observe(hits.len() as f64);

        Ok(hits.into_iter().map(SearchHit::into_result).collect())
    }

    fn vault_tables(&self, vault: &str) -> Vec<&'static str> {
        VAULT_NAMES
            .iter()
            .copied()
            .filter(|name| vault == "all" || vault == *name)
            .collect()
    }

    /// Pure semantic search. An unreachable embedder or a failing vault
    /// scan degrades to an empty list for that part.
    #[allow(clippy::too_many_arguments)]
    async fn vector_search(
        &self,
        query: &str,
        vault: &str,
        category: Option<&str>,
        person: Option<&str>,
        date_from: Option<&str>,
        date_to: Option<&str>,
        limit: usize,
    ) -> Vec<SearchHit> {
        if query.trim().is_empty() {
            return Vec::new();
        }

        let query_vector = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed, skipping vector search");
                return Vec::new();
            }
        };

        let filters = VectorFilters {
            category,
            person,
            date_from,
            date_to,
        };

        let mut hits = Vec::new();
        for table in self.vault_tables(vault) {
            match self.vectors.search(table, &query_vector, filters, limit).await {
                Ok(vault_hits) => {
                    hits.extend(vault_hits.into_iter().map(|h| SearchHit {
                        score: 1.0 / (1.0 + h.distance),
                        file_path: h.file_path,
                        title: h.title,
                        excerpt: truncate_chars(&h.content, 300),
                        content: h.content,
                        date: h.date,
                        people: h.people,
                        category: h.category,
                        vault: table.to_string(),
                        engine: "vector",
                    }));
                }
                Err(e) => {
                    tracing::warn!(vault = table, error = %e, "vector search failed");
                }
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        hits
    }

    /// Pure keyword search. Errors degrade to an empty list so hybrid can
    /// fall back to the vector half.
    async fn bm25_search(
        &self,
        query: &str,
        vault: &str,
        person: Option<&str>,
        date_from: Option<&str>,
        date_to: Option<&str>,
        limit: usize,
    ) -> Vec<SearchHit> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let vault_filter = (vault != "all").then_some(vault);
        match self
            .keywords
            .search(query, vault_filter, person, date_from, date_to, limit)
            .await
        {
            Ok(hits) => hits.into_iter().map(keyword_hit_to_search_hit).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "keyword search failed");
                Vec::new()
            }
        }
    }

    /// BM25 + vector with reciprocal-rank fusion.
    #[allow(clippy::too_many_arguments)]
    async fn hybrid_search(
        &self,
        query: &str,
        vault: &str,
        category: Option<&str>,
        person: Option<&str>,
        date_from: Option<&str>,
        date_to: Option<&str>,
        limit: usize,
        reference: NaiveDate,
    ) -> Vec<SearchHit> {
        // Explicit date filters win; otherwise parse the query.
        let (search_query, date_from, date_to) = if date_from.is_some() || date_to.is_some() {
            (
                query.to_string(),
                date_from.map(str::to_string),
                date_to.map(str::to_string),
            )
        } else if let Some(range) = parse_temporal(query, reference) {
            let cleaned = strip_temporal(query, &range);
            tracing::info!(
                matched = %range.matched,
                start = %range.start,
                end = %range.end,
                cleaned = %cleaned,
                "temporal query detected"
            );
            (cleaned, Some(range.start), Some(range.end))
        } else {
            (query.to_string(), None, None)
        };

        // Purely temporal: chronological results within the range.
        if search_query.is_empty() {
            if let (Some(from), Some(to)) = (date_from.as_deref(), date_to.as_deref()) {
                let vault_filter = (vault != "all").then_some(vault);
                return match self
                    .keywords
                    .recent_in_range(vault_filter, from, to, limit)
                    .await
                {
                    Ok(hits) => hits.into_iter().map(keyword_hit_to_search_hit).collect(),
                    Err(e) => {
                        tracing::warn!(error = %e, "chronological fallback failed");
                        Vec::new()
                    }
                };
            }
            return Vec::new();
        }

        let profile = self.classifier.classify(&search_query);
        let bm25_query = profile.bm25_query.as_deref().unwrap_or(&search_query);
        if profile.person_intent && profile.bm25_query.is_some() {
            tracing::info!(names = ?profile.people, bm25_query, "person query detected");
        }

        let candidate_k = self.config.search.candidate_k;
        let (bm25_hits, vector_hits) = tokio::join!(
            self.bm25_search(
                bm25_query,
                vault,
                person,
                date_from.as_deref(),
                date_to.as_deref(),
                candidate_k,
            ),
            self.vector_search(
                &search_query,
                vault,
                category,
                person,
                date_from.as_deref(),
                date_to.as_deref(),
                candidate_k,
            ),
        );

        tracing::debug!(
            bm25 = bm25_hits.len(),
            vector = vector_hits.len(),
            person_query = profile.person_intent,
            "hybrid search candidates"
        );

        // Person queries weight BM25 3:1; embeddings are weak on proper nouns.
        let lists: Vec<Vec<SearchHit>> = if profile.person_intent && !bm25_hits.is_empty() {
            vec![
                bm25_hits.clone(),
                bm25_hits.clone(),
                bm25_hits,
                vector_hits,
            ]
        } else {
            vec![bm25_hits, vector_hits]
        };

        let mut fused = reciprocal_rank_fusion(&lists, self.config.search.rrf_k);
        normalize_scores(&mut fused);
        fused.truncate(limit);
        fused
    }

    /// Full pipeline: query expansion, per-variant hybrid retrieval, fusion
    /// with the original query weighted double, LLM reranking.
    async fn query_search(
        &self,
        request: &SearchRequest,
        limit: usize,
        reference: NaiveDate,
    ) -> Vec<SearchHit> {
        let queries = if self.llm.is_enabled() {
            self.llm.expand_query(&request.query).await
        } else {
            vec![request.query.clone()]
        };
        if queries.len() > 1 {
            tracing::info!(?queries, "query expansion");
        }

        let candidate_k = self.config.search.candidate_k;
        let mut all_lists = Vec::with_capacity(queries.len() + 1);
        for q in &queries {
            let hits = self
                .hybrid_search(
                    q,
                    &request.vault,
                    request.category.as_deref(),
                    request.person.as_deref(),
                    request.date_from.as_deref(),
                    request.date_to.as_deref(),
                    candidate_k,
                    reference,
                )
                .await;
            all_lists.push(hits);
        }

        // Weight the original query double.
        if all_lists.len() > 1 {
            all_lists.insert(0, all_lists[0].clone());
        }

        let mut fused = reciprocal_rank_fusion(&all_lists, self.config.search.rrf_k);

        if self.llm.is_enabled() && !fused.is_empty() {
            let top_n = self.config.search.rerank_top_n.min(fused.len());
            let scores = self
                .llm
                .rerank(
                    &request.query,
                    &fused[..top_n],
                    self.config.search.rerank_concurrency,
                )
                .await;
            tracing::debug!(reranked = scores.len(), "rerank complete");
            fused = position_aware_blend(fused, &scores, self.config.search.rerank_blend_alpha);
        } else {
            normalize_scores(&mut fused);
        }

        fused.truncate(limit);
        fused
    }

    /// Answer a question over retrieved context. The LLM failing does not
    /// fail the request: the answer text carries the error and the raw
    /// excerpts instead.
    pub async fn answer(
        &self,
        question: &str,
        vault: &str,
        mode: &str,
    ) -> Result<(String, Vec<AnswerSource>)> {
        let started = std::time::Instant::now();
        let results = self
            .search(&SearchRequest {
                query: question.to_string(),
                vault: vault.to_string(),
                category: None,
                person: None,
                date_from: None,
                date_to: None,
                limit: Some(self.config.search.max_context_chunks),
                mode: mode.to_string(),
            })
            .await?;

        if results.is_empty() {
            return Ok((
                "I couldn't find any relevant information in your notes.".to_string(),
                Vec::new(),
            ));
        }

        let mut context = String::new();
        let mut sources = Vec::new();
        for (i, result) in results.iter().enumerate() {
            context.push_str(&format!(
                "[Source {}: {} ({})]\n{}\n\n",
                i + 1,
                result.title,
                result.date.as_deref().unwrap_or("undated"),
                result.excerpt
            ));
            sources.push(AnswerSource {
                file_path: result.file_path.clone(),
                title: result.title.clone(),
                excerpt: truncate_chars(&result.excerpt, 100),
            });
        }

        let prompt = format!(
            "Based on the following context from my notes, please answer this question:\n\n\
             Question: {}\n\nContext:\n{}\n\
             Please provide a concise, helpful answer based only on the information provided. \
             If the context doesn't contain enough information to fully answer the question, say so.",
            question, context
        );

        let answer = match self.llm.answer(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(error = %e, "answer synthesis failed");
                format!(
                    "Error generating answer: {}\n\nBased on search results, here are relevant excerpts:\n\n{}",
                    e, context
                )
            }
        };

        self.metrics
            .answer_seconds
            .with_label_values(&[vault])
            .observe(started.elapsed().as_secs_f64());

        Ok((answer, sources))
    }
}

fn keyword_hit_to_search_hit(hit: KeywordHit) -> SearchHit {
    let excerpt = hit.snippet.clone();
    SearchHit {
        score: hit.score,
        file_path: hit.file_path,
        title: hit.title,
        content: hit.snippet,
        excerpt,
        date: hit.date,
        people: hit.people,
        category: hit.category,
        vault: hit.vault,
        engine: "bm25",
    }
}
