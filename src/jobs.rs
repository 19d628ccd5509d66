//! Asynchronous index job control.
//!
//! Accepts index requests, assigns job ids, runs the work on a background
//! task, and tracks state in an in-memory table (lost on restart, by
//! design). At most one job runs at a time; the indexer's shared
//! cancellation flag is the guard, reset when a new job starts. Terminal
//! states fire a best-effort callback POST when a callback URL was given.

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::indexer::{Indexer, ProgressFn};
use crate::metrics::Metrics;
use crate::models::{JobRecord, JobStatus, Progress};

/// Parameters of one index request.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub vault: String,
    pub full: bool,
    pub callback_url: Option<String>,
    /// Alternate embedding host for this job only (e.g. a GPU box).
    pub embedding_host: Option<String>,
}

pub struct JobController {
    jobs: Mutex<HashMap<String, JobRecord>>,
    indexer: Arc<Indexer>,
    metrics: Arc<Metrics>,
    http: reqwest::Client,
}

impl JobController {
    pub fn new(indexer: Arc<Indexer>, metrics: Arc<Metrics>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            indexer,
            metrics,
            http: reqwest::Client::new(),
        }
    }

    /// Accept a job and schedule it. Returns the fresh job id immediately;
    /// refuses while another job is pending or running.
    pub fn submit(self: &Arc<Self>, request: JobRequest) -> Result<String> {
        let job_id = Uuid::new_v4().to_string();
        {
            let mut jobs = self.jobs.lock().unwrap();
            if jobs
                .values()
                .any(|j| matches!(j.status, JobStatus::Pending | JobStatus::Running))
            {
                bail!("an indexing job is already running");
            }
            jobs.insert(
                job_id.clone(),
                JobRecord {
                    job_id: job_id.clone(),
                    status: JobStatus::Pending,
                    vault: request.vault.clone(),
                    full: request.full,
                    started_at: None,
                    completed_at: None,
                    duration_seconds: None,
                    indexed_count: None,
                    deleted_count: None,
                    error: None,
                    callback_url: request.callback_url.clone(),
                    progress: None,
                },
            );
        }

        let controller = Arc::clone(self);
        let id = job_id.clone();
        tokio::spawn(async move {
            controller.run_job(id, request).await;
        });

        Ok(job_id)
    }

    pub fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.lock().unwrap().get(job_id).cloned()
    }

    /// The running job with its live progress block, if any.
    pub fn current(&self) -> Option<JobRecord> {
        let jobs = self.jobs.lock().unwrap();
        jobs.values()
            .find(|j| j.status == JobStatus::Running)
            .cloned()
            .map(|mut job| {
                job.progress = self.indexer.progress_snapshot().or(job.progress);
                job
            })
    }

    /// Set the cancellation flag for a pending/running job. Returns false
    /// for unknown or already-terminal jobs.
    pub fn cancel(&self, job_id: &str) -> bool {
        let jobs = self.jobs.lock().unwrap();
        match jobs.get(job_id) {
            Some(job) if matches!(job.status, JobStatus::Pending | JobStatus::Running) => {
                self.indexer.request_cancel();
                true
            }
            _ => false,
        }
    }

    async fn run_job(self: Arc<Self>, job_id: String, request: JobRequest) {
        let started = Instant::now();
        self.update(&job_id, |job| {
            job.status = JobStatus::Running;
            job.started_at = Some(now_iso());
        });
        self.metrics.job_running.set(1);

        // Mirror the orchestrator's progress into the job record so status
        // polls see it even after the job finishes a phase.
        let progress_cb: ProgressFn = {
            let controller = Arc::clone(&self);
            let id = job_id.clone();
            let indexer = Arc::clone(&self.indexer);
            Arc::new(move |processed, total, current_file| {
                let snapshot = indexer.progress_snapshot().unwrap_or(Progress {
                    processed,
                    total,
                    percent: 0.0,
                    current_file: current_file.to_string(),
                    eta_seconds: None,
                });
                controller.update(&id, |job| job.progress = Some(snapshot.clone()));
            })
        };

        let result = if request.full {
            self.indexer
                .full_reindex(
                    &request.vault,
                    request.embedding_host.as_deref(),
                    Some(&progress_cb),
                )
                .await
        } else {
            self.indexer
                .incremental_reindex(
                    &request.vault,
                    request.embedding_host.as_deref(),
                    Some(&progress_cb),
                )
                .await
        };

        let duration = started.elapsed().as_secs_f64();
        match result {
            Ok(outcome) => {
                // Cancellation still commits partial work and completes.
                self.update(&job_id, |job| {
                    job.status = JobStatus::Completed;
                    job.completed_at = Some(now_iso());
                    job.duration_seconds = Some(duration);
                    job.indexed_count = Some(outcome.chunks_indexed);
                    job.deleted_count = Some(outcome.files_deleted);
                });
                tracing::info!(
                    job_id = %job_id,
                    chunks = outcome.chunks_indexed,
                    cancelled = outcome.cancelled,
                    "index job completed"
                );
            }
            Err(e) => {
                self.update(&job_id, |job| {
                    job.status = JobStatus::Failed;
                    job.completed_at = Some(now_iso());
                    job.duration_seconds = Some(duration);
                    job.error = Some(e.to_string());
                });
                tracing::error!(job_id = %job_id, error = %e, "index job failed");
            }
        }
        self.metrics.job_running.set(0);

        if let Some(url) = &request.callback_url {
            self.fire_callback(url, &job_id).await;
        }
    }

    /// POST the job summary once. Failure is logged and does not alter the
    /// job state.
    async fn fire_callback(&self, url: &str, job_id: &str) {
        let Some(record) = self.get(job_id) else {
            return;
        };
        let result = self
            .http
            .post(url)
            .timeout(Duration::from_secs(10))
            .json(&record)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!(job_id = %job_id, url = %url, "completion callback delivered");
            }
            Ok(response) => {
                tracing::warn!(job_id = %job_id, url = %url, status = %response.status(), "completion callback rejected");
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, url = %url, error = %e, "completion callback failed");
            }
        }
    }

    fn update(&self, job_id: &str, mutate: impl FnOnce(&mut JobRecord)) {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(job_id) {
            mutate(job);
        }
    }
}

fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
