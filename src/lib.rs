//! # Recall
//!
//! **A personal knowledge retrieval engine over markdown and PDF vaults.**
//!
//! Recall ingests two vaults of notes (`work`, `personal`) into a pair of
//! parallel indices — dense vectors for semantic similarity and SQLite
//! FTS5 for BM25 keyword search — and answers queries through a tunable
//! pipeline combining both, with temporal filtering, person-aware query
//! rewriting, reciprocal-rank fusion, and optional LLM reranking.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────┐   ┌─────────────────┐
//! │  Vaults     │──▶│  Indexer          │──▶│  SQLite          │
//! │  md + pdf   │   │ detect/chunk/embed│   │ vectors + FTS5  │
//! └────────────┘   └──────────────────┘   └───────┬─────────┘
//!                                                 │
//!                           ┌─────────────────────┤
//!                           ▼                     ▼
//!                      ┌─────────┐          ┌──────────┐
//!                      │   CLI   │          │   HTTP   │
//!                      │ (recall)│          │  (axum)  │
//!                      └─────────┘          └──────────┘
//! ```
//!
//! ## Data flow
//!
//! - **Ingest**: filesystem → change detection ([`change`]) → metadata
//!   ([`metadata`]) → chunking ([`chunker`]) → embedding ([`embedder`]) →
//!   [`vector_index`] ∥ [`keyword_index`], orchestrated by [`indexer`] and
//!   exposed as async jobs by [`jobs`].
//! - **Query**: request → temporal parse ([`temporal`]) → classification
//!   ([`classify`]) → BM25 ∥ vector → fusion ([`fusion`]) → optional
//!   rerank ([`rerank`]) → uniform results, orchestrated by [`searcher`].
//!
//! ## Search modes
//!
//! | Mode | Engine | Notes |
//! |------|--------|-------|
//! | `vector` | nearest-neighbor scan | fast, semantic |
//! | `bm25` | FTS5 BM25 | fast, exact keywords |
//! | `hybrid` | RRF over both | recommended default |
//! | `query` | expansion + hybrid + rerank | best quality, slowest |
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Shared data types: documents, chunks, hits, jobs |
//! | [`metadata`] | Frontmatter parsing and metadata derivation |
//! | [`chunker`] | Structure-aware markdown/PDF chunking |
//! | [`pdf`] | Per-page PDF text extraction |
//! | [`embedder`] | Embedding host client with cache |
//! | [`vector_index`] | Per-vault chunk tables with embeddings |
//! | [`keyword_index`] | FTS5 BM25 document index |
//! | [`change`] | Two-tier (mtime, hash) change detection |
//! | [`temporal`] | Natural-language date range parsing |
//! | [`classify`] | Person-aware query classification |
//! | [`fusion`] | Reciprocal-rank fusion and score blending |
//! | [`rerank`] | LLM gateway: rerank, expand, answer |
//! | [`searcher`] | Search orchestration across modes |
//! | [`indexer`] | Full/incremental ingestion orchestration |
//! | [`jobs`] | Async job control with progress and cancellation |
//! | [`metrics`] | Prometheus gauges and histograms |
//! | [`app`] | Application assembly |
//! | [`server`] | Axum HTTP surface |

pub mod app;
pub mod change;
pub mod chunker;
pub mod classify;
pub mod config;
pub mod db;
pub mod embedder;
pub mod fusion;
pub mod indexer;
pub mod jobs;
pub mod keyword_index;
pub mod metadata;
pub mod metrics;
pub mod models;
pub mod pdf;
pub mod rerank;
pub mod searcher;
pub mod server;
pub mod temporal;
pub mod vector_index;
