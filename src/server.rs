//! HTTP surface.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/search` | Search the indices (vector, bm25, hybrid, query) |
//! | `POST` | `/ask` | Retrieve and synthesize an answer |
//! | `POST` | `/index/start` | Start an async index job |
//! | `GET`  | `/index/status/{id}` | Job record by id |
//! | `GET`  | `/index/progress` | Progress of the running job |
//! | `POST` | `/index/cancel/{id}` | Request job cancellation |
//! | `GET`  | `/stats` | Per-vault document counts |
//! | `GET`  | `/health` | Component health (public) |
//! | `GET`  | `/metrics` | Prometheus exposition (public) |
//!
//! All endpoints except `/health` and `/metrics` require
//! `Authorization: Bearer <api_token>`; mismatches get 401.
//!
//! Errors use a JSON envelope:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::app::App;
use crate::jobs::JobRequest;
use crate::models::{JobRecord, SearchResult};
use crate::searcher::{AnswerSource, SearchRequest};

/// Start serving on the configured bind address. Runs until the process
/// is terminated.
pub async fn run_server(app: App) -> anyhow::Result<()> {
    let bind_addr = app.config.server.bind.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/search", post(handle_search))
        .route("/ask", post(handle_ask))
        .route("/index/start", post(handle_index_start))
        .route("/index/status/{id}", get(handle_index_status))
        .route("/index/progress", get(handle_index_progress))
        .route("/index/cancel/{id}", post(handle_index_cancel))
        .route("/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .layer(middleware::from_fn_with_state(app.clone(), require_bearer))
        .layer(cors)
        .with_state(app);

    tracing::info!(bind = %bind_addr, "recall API listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

// ============ Auth ============

const PUBLIC_PATHS: [&str; 2] = ["/health", "/metrics"];

async fn require_bearer(State(app): State<App>, request: Request, next: Next) -> Response {
    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let expected = format!("Bearer {}", app.config.server.api_token);
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if presented != Some(expected.as_str()) {
        return AppError {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized".to_string(),
            message: "Invalid token".to_string(),
        }
        .into_response();
    }

    next.run(request).await
}

// ============ Error envelope ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn conflict(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "conflict".to_string(),
        message: message.into(),
    }
}

fn internal_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ POST /search ============

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

async fn handle_search(
    State(app): State<App>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if request.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let results = app.searcher.search(&request).await.map_err(|e| {
        let message = e.to_string();
        if message.starts_with("Unknown") {
            bad_request(message)
        } else {
            internal_error(message)
        }
    })?;

    Ok(Json(SearchResponse { results }))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default = "default_vault")]
    vault: String,
    #[serde(default = "default_ask_mode")]
    mode: String,
}

fn default_vault() -> String {
    "all".to_string()
}

fn default_ask_mode() -> String {
    "hybrid".to_string()
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<AnswerSource>,
}

async fn handle_ask(
    State(app): State<App>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    if request.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let (answer, sources) = app
        .searcher
        .answer(&request.question, &request.vault, &request.mode)
        .await
        .map_err(|e| {
            let message = e.to_string();
            if message.starts_with("Unknown") {
                bad_request(message)
            } else {
                internal_error(message)
            }
        })?;

    Ok(Json(AskResponse { answer, sources }))
}

// ============ POST /index/start ============

#[derive(Deserialize)]
struct IndexStartRequest {
    #[serde(default = "default_vault")]
    vault: String,
    #[serde(default)]
    full: bool,
    #[serde(default)]
    callback_url: Option<String>,
    #[serde(default)]
    embedding_host: Option<String>,
}

#[derive(Serialize)]
struct IndexStartResponse {
    job_id: String,
    status: String,
}

async fn handle_index_start(
    State(app): State<App>,
    Json(request): Json<IndexStartRequest>,
) -> Result<Json<IndexStartResponse>, AppError> {
    if !matches!(request.vault.as_str(), "all" | "work" | "personal") {
        return Err(bad_request(format!(
            "Unknown vault: {}. Use all, work, or personal.",
            request.vault
        )));
    }

    let job_id = app
        .jobs
        .submit(JobRequest {
            vault: request.vault,
            full: request.full,
            callback_url: request.callback_url,
            embedding_host: request.embedding_host,
        })
        .map_err(|e| conflict(e.to_string()))?;

    Ok(Json(IndexStartResponse {
        job_id,
        status: "started".to_string(),
    }))
}

// ============ GET /index/status/{id} ============

async fn handle_index_status(
    State(app): State<App>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, AppError> {
    app.jobs
        .get(&id)
        .map(Json)
        .ok_or_else(|| not_found(format!("job not found: {}", id)))
}

// ============ GET /index/progress ============

async fn handle_index_progress(State(app): State<App>) -> Result<Json<JobRecord>, AppError> {
    app.jobs
        .current()
        .map(Json)
        .ok_or_else(|| not_found("no indexing job is running"))
}

// ============ POST /index/cancel/{id} ============

#[derive(Serialize)]
struct CancelResponse {
    job_id: String,
    status: String,
}

async fn handle_index_cancel(
    State(app): State<App>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, AppError> {
    if app.jobs.cancel(&id) {
        Ok(Json(CancelResponse {
            job_id: id,
            status: "cancelling".to_string(),
        }))
    } else {
        Err(not_found(format!("no cancellable job: {}", id)))
    }
}

// ============ GET /stats ============

#[derive(Serialize)]
struct VaultStats {
    vault: String,
    vector_documents: i64,
    keyword_documents: i64,
}

#[derive(Serialize)]
struct StatsResponse {
    vaults: Vec<VaultStats>,
}

async fn handle_stats(State(app): State<App>) -> Result<Json<StatsResponse>, AppError> {
    let mut vaults = Vec::new();
    for vault in crate::config::VAULT_NAMES {
        let vector_documents = app
            .vectors
            .count_documents(vault)
            .await
            .map_err(|e| internal_error(e.to_string()))?;
        let keyword_documents = app
            .keywords
            .count(Some(vault))
            .await
            .map_err(|e| internal_error(e.to_string()))?;
        vaults.push(VaultStats {
            vault: vault.to_string(),
            vector_documents,
            keyword_documents,
        });
    }
    Ok(Json(StatsResponse { vaults }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    embedding_host_up: bool,
}

async fn handle_health(State(app): State<App>) -> Json<HealthResponse> {
    let embedding_host_up = app.embedder.probe().await;
    app.metrics
        .component_up
        .with_label_values(&["embedding_host"])
        .set(embedding_host_up as i64);

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        embedding_host_up,
    })
}

// ============ GET /metrics ============

async fn handle_metrics(State(app): State<App>) -> Response {
    match app.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => internal_error(e.to_string()).into_response(),
    }
}
