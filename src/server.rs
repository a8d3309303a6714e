//! HTTP API for papers and crawl control.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `PUT`    | `/v1/crawler` | Start the background crawl |
//! | `DELETE` | `/v1/crawler` | Stop the background crawl |
//! | `GET`    | `/v1/crawler` | Crawl loop status |
//! | `GET`    | `/v1/crawler/progress` | Historical crawl totals |
//! | `GET`    | `/v1/crawler/events` | Recent crawl events (`?limit=`) |
//! | `POST`   | `/v1/papers` | Crawl one paper on demand |
//! | `GET`    | `/v1/papers` | List papers (`?category=&limit=&offset=`) |
//! | `GET`    | `/v1/papers/{identifier}` | One paper by paper id or arXiv id |
//! | `GET`    | `/v1/papers/{identifier}/summary` | Latest summary of a paper |
//! | `GET`    | `/v1/statistics` | Database statistics |
//! | `GET`    | `/v1/categories` | Configured categories |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid arXiv identifier: 'x'" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `upstream_rate_limited`
//! (503), `upstream_error` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::arxiv_id::extract_arxiv_id;
use crate::config::Config;
use crate::crawler::Crawler;
use crate::db;
use crate::error::ArxivError;
use crate::migrate;
use crate::models::{CrawlEvent, CrawlStatistics, CrawlerProgress, Paper, Summary};
use crate::service::{CrawlService, CrawlerStatusResponse};
use crate::store::{self, PaperFilter, PaperPage};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub service: Arc<CrawlService>,
}

impl AppState {
    pub async fn new(config: Arc<Config>, pool: SqlitePool) -> anyhow::Result<Self> {
        let crawler = Arc::new(Crawler::new(pool.clone(), config.clone())?);
        Self::with_crawler(config, pool, crawler).await
    }

    pub async fn with_crawler(
        config: Arc<Config>,
        pool: SqlitePool,
        crawler: Arc<Crawler>,
    ) -> anyhow::Result<Self> {
        let service = Arc::new(CrawlService::new(crawler).await?);
        Ok(Self {
            config,
            pool,
            service,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/v1/crawler",
            get(handle_crawler_status)
                .put(handle_crawler_start)
                .delete(handle_crawler_stop),
        )
        .route("/v1/crawler/progress", get(handle_crawler_progress))
        .route("/v1/crawler/events", get(handle_crawler_events))
        .route("/v1/papers", get(handle_list_papers).post(handle_crawl_paper))
        .route("/v1/papers/{identifier}", get(handle_get_paper))
        .route("/v1/papers/{identifier}/summary", get(handle_get_summary))
        .route("/v1/statistics", get(handle_statistics))
        .route("/v1/categories", get(handle_categories))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server and the crawl service.
///
/// Binds to `[server].bind`. With `[crawler].auto_start` the background
/// loop starts before the listener opens. Ctrl-C stops the loop and shuts
/// the server down.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());

    let pool = db::connect(&config).await?;
    migrate::create_schema(&pool).await?;

    let state = AppState::new(config.clone(), pool.clone()).await?;
    let service = state.service.clone();

    if config.crawler.auto_start {
        service.start().await?;
        println!("Background crawl started (auto_start)");
    }

    let app = router(state);

    println!("TheArk API listening on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    service.shutdown().await?;
    pool.close().await;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

/// arXiv errors keep their meaning; anything else is a 500.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<ArxivError>() {
            Some(ArxivError::InvalidIdentifier(_)) => bad_request(err.to_string()),
            Some(ArxivError::NotFound(_)) => not_found(err.to_string()),
            Some(ArxivError::RateLimited { .. }) => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "upstream_rate_limited",
                message: err.to_string(),
            },
            Some(_) => AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "upstream_error",
                message: err.to_string(),
            },
            None => {
                tracing::error!(error = %format!("{:#}", err), "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message: format!("{:#}", err),
                }
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /v1/crawler ============

#[derive(Serialize)]
struct CrawlerActionResponse {
    message: String,
    was_already_running: bool,
}

async fn handle_crawler_start(
    State(state): State<AppState>,
) -> Result<Json<CrawlerActionResponse>, AppError> {
    let outcome = state.service.start().await?;
    let message = if outcome.was_already_running {
        "Crawler is already running"
    } else {
        "Crawler started"
    };
    Ok(Json(CrawlerActionResponse {
        message: message.to_string(),
        was_already_running: outcome.was_already_running,
    }))
}

async fn handle_crawler_stop(
    State(state): State<AppState>,
) -> Result<Json<CrawlerActionResponse>, AppError> {
    let was_running = state.service.stop().await?;
    let message = if was_running {
        "Crawler stopped"
    } else {
        "Crawler was not running"
    };
    Ok(Json(CrawlerActionResponse {
        message: message.to_string(),
        was_already_running: was_running,
    }))
}

async fn handle_crawler_status(State(state): State<AppState>) -> Json<CrawlerStatusResponse> {
    Json(state.service.status().await)
}

async fn handle_crawler_progress(
    State(state): State<AppState>,
) -> Result<Json<CrawlerProgress>, AppError> {
    Ok(Json(state.service.progress().await?))
}

#[derive(Deserialize)]
struct EventsQuery {
    limit: Option<i64>,
}

#[derive(Serialize)]
struct EventsResponse {
    events: Vec<CrawlEvent>,
}

async fn handle_crawler_events(
    State(state): State<AppState>,
    Query(q): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, AppError> {
    let limit = q.limit.unwrap_or(50).clamp(1, 1000);
    let events = store::recent_events(&state.pool, limit).await?;
    Ok(Json(EventsResponse { events }))
}

// ============ /v1/papers ============

#[derive(Deserialize)]
struct CrawlPaperRequest {
    identifier: String,
}

async fn handle_crawl_paper(
    State(state): State<AppState>,
    Json(req): Json<CrawlPaperRequest>,
) -> Result<(StatusCode, Json<Paper>), AppError> {
    if req.identifier.trim().is_empty() {
        return Err(bad_request("identifier must not be empty"));
    }
    match state
        .service
        .crawler()
        .crawl_single_paper(&req.identifier)
        .await?
    {
        Some(paper) => Ok((StatusCode::CREATED, Json(paper))),
        None => Err(not_found(format!(
            "paper not found on arXiv: {}",
            req.identifier.trim()
        ))),
    }
}

#[derive(Deserialize)]
struct PapersQuery {
    category: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn handle_list_papers(
    State(state): State<AppState>,
    Query(q): Query<PapersQuery>,
) -> Result<Json<PaperPage>, AppError> {
    let filter = PaperFilter {
        category: q.category.filter(|c| !c.trim().is_empty()),
        limit: q.limit.unwrap_or(20),
        offset: q.offset.unwrap_or(0),
    };
    Ok(Json(store::list_papers(&state.pool, &filter).await?))
}

/// Numeric identifiers are paper ids; anything else must be an arXiv id.
async fn lookup_paper(pool: &SqlitePool, identifier: &str) -> Result<Paper, AppError> {
    let found = match identifier.parse::<i64>() {
        Ok(paper_id) => store::get_paper(pool, paper_id).await?,
        Err(_) => {
            let arxiv_id = extract_arxiv_id(identifier).map_err(|e| bad_request(e.to_string()))?;
            store::get_paper_by_arxiv_id(pool, &arxiv_id).await?
        }
    };
    found.ok_or_else(|| not_found(format!("paper not found: {}", identifier)))
}

async fn handle_get_paper(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<Paper>, AppError> {
    Ok(Json(lookup_paper(&state.pool, &identifier).await?))
}

async fn handle_get_summary(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<Summary>, AppError> {
    let paper = lookup_paper(&state.pool, &identifier).await?;
    store::latest_summary(&state.pool, paper.paper_id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("no summary for paper {}", paper.paper_id)))
}

// ============ misc ============

async fn handle_statistics(
    State(state): State<AppState>,
) -> Result<Json<CrawlStatistics>, AppError> {
    Ok(Json(store::crawl_statistics(&state.pool).await?))
}

#[derive(Serialize)]
struct CategoriesResponse {
    categories: Vec<String>,
}

async fn handle_categories(State(state): State<AppState>) -> Json<CategoriesResponse> {
    Json(CategoriesResponse {
        categories: state.config.crawler.categories.clone(),
    })
}
