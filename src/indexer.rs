//! Indexing orchestrator.
//!
//! Drives full and incremental ingestion of markdown and PDF vaults into
//! the vector and keyword indices. CPU-bound work (reads, hashing,
//! frontmatter parsing, chunking, PDF extraction) runs on the blocking
//! pool behind a two-permit gate so it cannot crowd out the embedder's
//! network concurrency. The loop yields every 10 markdown / 5 PDF files
//! so concurrent searches stay responsive.
//!
//! Cancellation is a single shared flag, checked before each file and
//! before each chunk's embedding call; observed cancellation commits the
//! work done so far and returns the partial count. The flag doubles as
//! the at-most-one-running-job guard and is reset when a new job starts.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;
use walkdir::WalkDir;

use crate::change::{plan_changes, DiskFile};
use crate::chunker;
use crate::config::{Config, VaultPaths, VAULT_NAMES};
use crate::embedder::EmbeddingClient;
use crate::keyword_index::KeywordIndex;
use crate::metadata::{self, md5_hex};
use crate::metrics::Metrics;
use crate::models::{Chunk, DocumentMeta, EmbeddedChunk, Progress};
use crate::pdf;
use crate::vector_index::VectorIndex;

/// Notified as files complete: `(processed, total, current_file)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64, &str) + Send + Sync>;

/// Documents shorter than this carry no indexable signal.
const MIN_DOCUMENT_CHARS: usize = 50;

/// Worker-pool width for CPU-bound work.
const CPU_WORKERS: usize = 2;

#[derive(Debug, Default, Clone)]
pub struct IndexOutcome {
    /// Chunks written to the vector index.
    pub chunks_indexed: u64,
    /// Files whose records were removed because they left the disk.
    pub files_deleted: u64,
    pub cancelled: bool,
}

struct ProgressTracker {
    processed: u64,
    total: u64,
    started: Instant,
}

pub struct Indexer {
    config: Arc<Config>,
    embedder: Arc<EmbeddingClient>,
    vectors: Arc<VectorIndex>,
    keywords: Arc<KeywordIndex>,
    cancel: AtomicBool,
    cpu_gate: Semaphore,
    progress: Mutex<Option<Progress>>,
    metrics: Arc<Metrics>,
}

impl Indexer {
    pub fn new(
        config: Arc<Config>,
        embedder: Arc<EmbeddingClient>,
        vectors: Arc<VectorIndex>,
        keywords: Arc<KeywordIndex>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            embedder,
            vectors,
            keywords,
            cancel: AtomicBool::new(false),
            cpu_gate: Semaphore::new(CPU_WORKERS),
            progress: Mutex::new(None),
            metrics,
        }
    }

    /// Create both indices' schemas if missing.
    pub async fn ensure_ready(&self) -> Result<()> {
        self.vectors.ensure_tables(&VAULT_NAMES).await?;
        self.keywords.ensure_schema().await?;
        Ok(())
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Progress of the running job, if any.
    pub fn progress_snapshot(&self) -> Option<Progress> {
        self.progress.lock().unwrap().clone()
    }

    /// Drop every record in scope, then ingest everything found on disk.
    pub async fn full_reindex(
        &self,
        scope: &str,
        embedding_host: Option<&str>,
        progress: Option<&ProgressFn>,
    ) -> Result<IndexOutcome> {
        self.cancel.store(false, Ordering::SeqCst);
        let vaults = self.config.vaults_in_scope(scope)?;
        let mut outcome = IndexOutcome::default();

        let mut listings = Vec::new();
        let mut total_files = 0u64;
        for vault in &vaults {
            let md_files = self.list_files(vault.notes_root.clone(), "md").await?;
            let pdf_files = match &vault.pdf_root {
                Some(root) if self.config.pdf.enabled => {
                    self.list_files(root.clone(), "pdf").await?
                }
                _ => Vec::new(),
            };
            total_files += (md_files.len() + pdf_files.len()) as u64;
            listings.push((vault.clone(), md_files, pdf_files));
        }

        let mut tracker = ProgressTracker {
            processed: 0,
            total: total_files,
            started: Instant::now(),
        };

        'vaults: for (vault, md_files, pdf_files) in listings {
            tracing::info!(vault = vault.name, "full reindex");
            self.vectors.clear_vault(vault.name).await?;
            self.keywords.clear_vault(vault.name).await?;

            for (i, file) in md_files.iter().enumerate() {
                if self.cancelled() {
                    outcome.cancelled = true;
                    break 'vaults;
                }
                let count = self
                    .index_markdown_file(&file.path, &vault, file.mtime, embedding_host)
                    .await;
                outcome.chunks_indexed += count;
                tracker.processed += 1;
                self.report_progress(&mut tracker, &file.path, progress);
                if i % 10 == 0 {
                    tokio::task::yield_now().await;
                }
            }

            for (i, file) in pdf_files.iter().enumerate() {
                if self.cancelled() {
                    outcome.cancelled = true;
                    break 'vaults;
                }
                let count = self
                    .index_pdf_file(&file.path, &vault, file.mtime, embedding_host)
                    .await;
                outcome.chunks_indexed += count;
                tracker.processed += 1;
                self.report_progress(&mut tracker, &file.path, progress);
                if i % 5 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }

        self.refresh_index_gauges().await;
        self.clear_progress();
        tracing::info!(
            chunks = outcome.chunks_indexed,
            cancelled = outcome.cancelled,
            "full reindex complete"
        );
        Ok(outcome)
    }

    /// Reconcile the indices against the filesystem: delete records for
    /// removed files, re-ingest changed files, refresh mtimes for files
    /// whose content is hash-identical after an mtime change.
    pub async fn incremental_reindex(
        &self,
        scope: &str,
        embedding_host: Option<&str>,
        progress: Option<&ProgressFn>,
    ) -> Result<IndexOutcome> {
        self.cancel.store(false, Ordering::SeqCst);
        let vaults = self.config.vaults_in_scope(scope)?;
        let mut outcome = IndexOutcome::default();

        struct VaultPlan {
            vault: VaultPaths,
            deletes: Vec<String>,
            md_candidates: Vec<DiskFile>,
            pdf_candidates: Vec<DiskFile>,
            md_skipped_mtime: u64,
            pdf_skipped_mtime: u64,
        }

        let mut plans = Vec::new();
        let mut total_candidates = 0u64;
        for vault in &vaults {
            let state = self
                .vectors
                .list_paths_with_meta(vault.name)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(vault = vault.name, error = %e, "could not read index state");
                    Default::default()
                });

            let md_files = self.list_files(vault.notes_root.clone(), "md").await?;
            let pdf_files = match &vault.pdf_root {
                Some(root) if self.config.pdf.enabled => {
                    self.list_files(root.clone(), "pdf").await?
                }
                _ => Vec::new(),
            };

            // Partition the index state by type so each plan sees its own
            // deletes and skips.
            let mut md_state = state.clone();
            md_state.retain(|path, _| path.ends_with(".md"));
            let mut pdf_state = state;
            pdf_state.retain(|path, _| !path.ends_with(".md"));

            let md_plan = plan_changes(&md_files, &md_state);
            let pdf_plan = plan_changes(&pdf_files, &pdf_state);

            let mut deletes = md_plan.deletes;
            deletes.extend(pdf_plan.deletes);
            total_candidates +=
                (md_plan.candidates.len() + pdf_plan.candidates.len()) as u64;

            plans.push(VaultPlan {
                vault: vault.clone(),
                deletes,
                md_candidates: md_plan.candidates,
                pdf_candidates: pdf_plan.candidates,
                md_skipped_mtime: md_plan.skipped_mtime,
                pdf_skipped_mtime: pdf_plan.skipped_mtime,
            });
        }

        let mut tracker = ProgressTracker {
            processed: 0,
            total: total_candidates,
            started: Instant::now(),
        };

        'vaults: for plan in plans {
            let vault = &plan.vault;
            tracing::info!(vault = vault.name, "incremental reindex");

            if !plan.deletes.is_empty() {
                tracing::info!(
                    vault = vault.name,
                    count = plan.deletes.len(),
                    "removing records for deleted files"
                );
            }
            for path in &plan.deletes {
                if self.cancelled() {
                    outcome.cancelled = true;
                    break 'vaults;
                }
                if let Err(e) = self.vectors.delete_by_path(vault.name, path).await {
                    tracing::warn!(path = %path, error = %e, "vector delete failed");
                    continue;
                }
                if let Err(e) = self
                    .keywords
                    .delete_document(path, Some(vault.name))
                    .await
                {
                    tracing::warn!(path = %path, error = %e, "keyword delete failed");
                }
                outcome.files_deleted += 1;
            }

            let state = self.vectors.list_paths_with_meta(vault.name).await?;
            let mut md_indexed = 0u64;
            let mut md_skipped_hash = 0u64;
            let mut pdf_indexed = 0u64;
            let mut pdf_skipped = plan.pdf_skipped_mtime;

            for (i, file) in plan.md_candidates.iter().enumerate() {
                if self.cancelled() {
                    outcome.cancelled = true;
                    break 'vaults;
                }
                let path_str = file.path.to_string_lossy().to_string();

                let read = {
                    let path = file.path.clone();
                    self.run_blocking(move || {
                        std::fs::read_to_string(&path)
                            .map(|content| {
                                let hash = md5_hex(content.as_bytes());
                                (content, hash)
                            })
                    })
                    .await?
                };
                let (content, hash) = match read {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(path = %path_str, error = %e, "read failed, skipping");
                        continue;
                    }
                };

                // Tier 2: mtime moved but content did not (touch, copy).
                if state.get(&path_str).map(|m| m.file_hash.as_str()) == Some(hash.as_str()) {
                    if let Err(e) = self
                        .vectors
                        .refresh_mtime(vault.name, &path_str, file.mtime)
                        .await
                    {
                        tracing::warn!(path = %path_str, error = %e, "mtime refresh failed");
                    }
                    md_skipped_hash += 1;
                } else {
                    let count = self
                        .index_markdown_content(
                            &file.path,
                            vault,
                            content,
                            file.mtime,
                            embedding_host,
                        )
                        .await;
                    outcome.chunks_indexed += count;
                    if count > 0 {
                        md_indexed += 1;
                    }
                }

                tracker.processed += 1;
                self.report_progress(&mut tracker, &file.path, progress);
                if i % 10 == 0 {
                    tokio::task::yield_now().await;
                }
            }

            for (i, file) in plan.pdf_candidates.iter().enumerate() {
                if self.cancelled() {
                    outcome.cancelled = true;
                    break 'vaults;
                }
                let path_str = file.path.to_string_lossy().to_string();

                let read = {
                    let path = file.path.clone();
                    self.run_blocking(move || {
                        std::fs::read(&path).map(|bytes| {
                            let hash = md5_hex(&bytes);
                            (bytes, hash)
                        })
                    })
                    .await?
                };
                let (bytes, hash) = match read {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(path = %path_str, error = %e, "read failed, skipping");
                        continue;
                    }
                };

                if state.get(&path_str).map(|m| m.file_hash.as_str()) == Some(hash.as_str()) {
                    if let Err(e) = self
                        .vectors
                        .refresh_mtime(vault.name, &path_str, file.mtime)
                        .await
                    {
                        tracing::warn!(path = %path_str, error = %e, "mtime refresh failed");
                    }
                    pdf_skipped += 1;
                } else {
                    let count = self
                        .index_pdf_bytes(&file.path, vault, bytes, file.mtime, embedding_host)
                        .await;
                    outcome.chunks_indexed += count;
                    if count > 0 {
                        pdf_indexed += 1;
                    }
                }

                tracker.processed += 1;
                self.report_progress(&mut tracker, &file.path, progress);
                if i % 5 == 0 {
                    tokio::task::yield_now().await;
                }
            }

            tracing::info!(
                vault = vault.name,
                md_indexed,
                md_skipped_mtime = plan.md_skipped_mtime,
                md_skipped_hash,
                pdf_indexed,
                pdf_skipped,
                deleted = outcome.files_deleted,
                "incremental reindex counters"
            );
        }

        self.refresh_index_gauges().await;
        self.clear_progress();
        tracing::info!(
            chunks = outcome.chunks_indexed,
            deleted = outcome.files_deleted,
            cancelled = outcome.cancelled,
            "incremental reindex complete"
        );
        Ok(outcome)
    }

    /// Index one markdown file from disk.
    async fn index_markdown_file(
        &self,
        path: &Path,
        vault: &VaultPaths,
        mtime: f64,
        embedding_host: Option<&str>,
    ) -> u64 {
        let read = {
            let path = path.to_path_buf();
            self.run_blocking(move || std::fs::read_to_string(&path)).await
        };
        match read {
            Ok(Ok(content)) => {
                self.index_markdown_content(path, vault, content, mtime, embedding_host)
                    .await
            }
            Ok(Err(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "read failed, skipping");
                0
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "blocking read failed");
                0
            }
        }
    }

    /// Extract, chunk, embed, and upsert one markdown document. Embedding
    /// failures skip the chunk; the file keeps its other chunks.
    async fn index_markdown_content(
        &self,
        path: &Path,
        vault: &VaultPaths,
        content: String,
        mtime: f64,
        embedding_host: Option<&str>,
    ) -> u64 {
        if content.trim().chars().count() < MIN_DOCUMENT_CHARS {
            tracing::debug!(path = %path.display(), "skipping short document");
            return 0;
        }

        let prepared = {
            let path = path.to_path_buf();
            let vault_name = vault.name;
            let vault_root = vault.notes_root.clone();
            let params = self.config.chunking.clone();
            self.run_blocking(move || {
                let (meta, body) =
                    metadata::extract_markdown_meta(&path, &content, vault_name, &vault_root);
                let chunks = chunker::chunk_markdown(&body, &params);
                (meta, body, chunks)
            })
            .await
        };
        let (meta, body, chunks) = match prepared {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "extraction failed");
                return 0;
            }
        };

        self.embed_and_upsert(path, vault.name, meta, body, chunks, mtime, embedding_host)
            .await
    }

    /// Index one PDF file from disk.
    async fn index_pdf_file(
        &self,
        path: &Path,
        vault: &VaultPaths,
        mtime: f64,
        embedding_host: Option<&str>,
    ) -> u64 {
        let read = {
            let path = path.to_path_buf();
            self.run_blocking(move || std::fs::read(&path)).await
        };
        match read {
            Ok(Ok(bytes)) => {
                self.index_pdf_bytes(path, vault, bytes, mtime, embedding_host)
                    .await
            }
            Ok(Err(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "read failed, skipping");
                0
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "blocking read failed");
                0
            }
        }
    }

    async fn index_pdf_bytes(
        &self,
        path: &Path,
        vault: &VaultPaths,
        bytes: Vec<u8>,
        mtime: f64,
        embedding_host: Option<&str>,
    ) -> u64 {
        let pdf_root = vault
            .pdf_root
            .clone()
            .unwrap_or_else(|| vault.notes_root.clone());

        let prepared = {
            let path = path.to_path_buf();
            let vault_name = vault.name;
            let params = self.config.chunking.clone();
            self.run_blocking(move || -> Result<_> {
                let pages = pdf::extract_pages_from_bytes(&bytes)?;
                if pages.is_empty() {
                    return Ok(None);
                }
                let meta = metadata::extract_pdf_meta(&path, &bytes, vault_name, &pdf_root);
                let full_text = pages
                    .iter()
                    .map(|(_, text)| text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                let chunks = chunker::chunk_pdf_pages(&pages, &params);
                Ok(Some((meta, full_text, chunks)))
            })
            .await
        };

        let (meta, full_text, chunks) = match prepared {
            Ok(Ok(Some(p))) => p,
            Ok(Ok(None)) => {
                tracing::debug!(path = %path.display(), "skipping empty PDF");
                return 0;
            }
            Ok(Err(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "PDF extraction failed");
                return 0;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "blocking extraction failed");
                return 0;
            }
        };

        self.embed_and_upsert(
            path,
            vault.name,
            meta,
            full_text,
            chunks,
            mtime,
            embedding_host,
        )
        .await
    }

    /// Embed the chunk set and commit it to both indices. Returns the
    /// number of chunks written.
    #[allow(clippy::too_many_arguments)]
    async fn embed_and_upsert(
        &self,
        path: &Path,
        vault: &str,
        meta: DocumentMeta,
        full_text: String,
        chunks: Vec<Chunk>,
        mtime: f64,
        embedding_host: Option<&str>,
    ) -> u64 {
        if chunks.is_empty() {
            return 0;
        }

        let mut records = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if self.cancelled() {
                tracing::info!(path = %path.display(), "indexing cancelled mid-file");
                break;
            }
            let embedded = match embedding_host {
                Some(host) => self.embedder.embed_with_host(&chunk.content, host).await,
                None => self.embedder.embed(&chunk.content).await,
            };
            match embedded {
                Ok(vector) => records.push(EmbeddedChunk { chunk, vector }),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        chunk = chunk.chunk_index,
                        error = %e,
                        "embedding failed, skipping chunk"
                    );
                }
            }
        }

        if records.is_empty() {
            return 0;
        }

        if let Err(e) = self.vectors.upsert_chunks(vault, &meta, mtime, &records).await {
            tracing::warn!(path = %path.display(), error = %e, "vector upsert failed");
            return 0;
        }

        if let Err(e) = self
            .keywords
            .upsert_document(
                &meta.file_path,
                &meta.title,
                &full_text,
                vault,
                &meta.category,
                &meta.people,
                meta.date.as_deref(),
            )
            .await
        {
            // The vector half is committed; keyword search just won't see
            // this revision until the next pass.
            tracing::warn!(path = %path.display(), error = %e, "keyword upsert failed");
        }

        tracing::info!(
            path = %path.display(),
            chunks = records.len(),
            source = meta.source_type.as_str(),
            "indexed"
        );
        records.len() as u64
    }

    /// Walk a root for files with the given extension, skipping dotfiles
    /// and configured exclusions. A missing root yields an empty list.
    async fn list_files(&self, root: PathBuf, extension: &'static str) -> Result<Vec<DiskFile>> {
        let excludes = build_globset(&self.config.vaults.excluded_globs)?;
        self.run_blocking(move || {
            if !root.exists() {
                return Vec::new();
            }
            let mut files = Vec::new();
            for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy();
                if name.starts_with('.') {
                    continue;
                }
                if entry
                    .path()
                    .extension()
                    .map(|e| !e.eq_ignore_ascii_case(extension))
                    .unwrap_or(true)
                {
                    continue;
                }
                let relative = entry.path().strip_prefix(&root).unwrap_or(entry.path());
                if excludes.is_match(relative) {
                    continue;
                }
                let mtime = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);
                files.push(DiskFile {
                    path: entry.path().to_path_buf(),
                    mtime,
                });
            }
            files.sort_by(|a, b| a.path.cmp(&b.path));
            files
        })
        .await
    }

    /// Run CPU-bound work on the blocking pool, at most [`CPU_WORKERS`]
    /// tasks at a time.
    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let _permit = self
            .cpu_gate
            .acquire()
            .await
            .context("worker pool closed")?;
        tokio::task::spawn_blocking(f)
            .await
            .context("blocking task panicked")
    }

    fn report_progress(
        &self,
        tracker: &mut ProgressTracker,
        current: &Path,
        callback: Option<&ProgressFn>,
    ) {
        let percent = if tracker.total > 0 {
            tracker.processed as f64 / tracker.total as f64 * 100.0
        } else {
            100.0
        };
        let eta_seconds = if tracker.processed > 0 && tracker.total > tracker.processed {
            let per_file = tracker.started.elapsed().as_secs_f64() / tracker.processed as f64;
            Some(per_file * (tracker.total - tracker.processed) as f64)
        } else {
            None
        };

        let current_file = current.to_string_lossy().to_string();
        let snapshot = Progress {
            processed: tracker.processed,
            total: tracker.total,
            percent,
            current_file: current_file.clone(),
            eta_seconds,
        };

        self.metrics.progress_percent.set(percent);
        self.metrics.eta_seconds.set(eta_seconds.unwrap_or(0.0));
        *self.progress.lock().unwrap() = Some(snapshot);

        if let Some(callback) = callback {
            callback(tracker.processed, tracker.total, &current_file);
        }
    }

    fn clear_progress(&self) {
        *self.progress.lock().unwrap() = None;
        self.metrics.progress_percent.set(0.0);
        self.metrics.eta_seconds.set(0.0);
    }

    async fn refresh_index_gauges(&self) {
        for vault in VAULT_NAMES {
            if let Ok(count) = self.vectors.count_documents(vault).await {
                self.metrics
                    .indexed_documents
                    .with_label_values(&[vault, "vector"])
                    .set(count);
            }
            if let Ok(count) = self.keywords.count(Some(vault)).await {
                self.metrics
                    .indexed_documents
                    .with_label_values(&[vault, "keyword"])
                    .set(count);
            }
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
