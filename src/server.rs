//! HTTP API server.
//!
//! # Endpoints
//!
//! | Method | Path | Tier | Description |
//! |--------|------|------|-------------|
//! | `POST` | `/api/search` | api | Hybrid search |
//! | `POST` | `/api/answer` | expensive | Cited answer |
//! | `POST` | `/api/answer/stream` | expensive | Cited answer as server-sent events |
//! | `POST` | `/api/autocomplete` | cached | Query suggestions |
//! | `GET`  | `/health` | none | Health check (returns version) |
//!
//! # Rate Limiting
//!
//! The caller's quota is checked before the body is parsed. Rejections
//! answer 429 with a `Retry-After` header:
//!
//! ```json
//! { "error": "Too Many Requests", "message": "...", "retryAfter": 60 }
//! ```
//!
//! Every rate-limited response carries `X-RateLimit-Limit`,
//! `X-RateLimit-Remaining`, and `X-RateLimit-Reset` (seconds).
//!
//! # Error Contract
//!
//! ```json
//! { "error": "Search failed", "details": "retrieval unavailable" }
//! ```
//!
//! Schema violations are 400; pipeline failures are 500.
//!
//! # Streaming
//!
//! `/api/answer/stream` emits `delta` events (`{"text": "..."}`) as the
//! model produces text, then exactly one `result` event carrying the full
//! answer object, or one `error` event.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use docs_assistant_core::error::PipelineError;
use docs_assistant_core::index::Suggestion;
use docs_assistant_core::ratelimit::{client_identifier, RateLimitDecision, RateLimitTiers, Tier};

use crate::autocomplete::Autocomplete;
use crate::config::Config;
use crate::pipeline::{AnswerParams, Pipeline, SearchParams};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub autocomplete: Arc<Autocomplete>,
    pub limits: RateLimitTiers,
    /// Seconds advertised to throttled callers.
    pub retry_after_secs: u64,
}

impl AppState {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pipeline = Pipeline::from_config(config)?;
        let services = pipeline.services();
        let autocomplete = Autocomplete::new(
            services.lexical.clone(),
            services.cache.clone(),
            config.cache.autocomplete_ttl(),
        );
        Ok(Self {
            autocomplete: Arc::new(autocomplete),
            pipeline: Arc::new(pipeline),
            limits: RateLimitTiers::in_memory(&config.rate_limit.quotas()),
            retry_after_secs: config.rate_limit.retry_after_secs,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/search", post(handle_search))
        .route("/api/answer", post(handle_answer))
        .route("/api/answer/stream", post(handle_answer_stream))
        .route("/api/autocomplete", post(handle_autocomplete))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process ends.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    details: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThrottleBody {
    error: &'static str,
    message: &'static str,
    retry_after: u64,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Internal { error: &'static str, details: String },
    TooManyRequests { message: &'static str, retry_after: u64 },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(details) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: "Invalid request".to_string(),
                    details,
                }),
            )
                .into_response(),
            AppError::Internal { error, details } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: error.to_string(),
                    details,
                }),
            )
                .into_response(),
            AppError::TooManyRequests {
                message,
                retry_after,
            } => {
                let mut resp = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ThrottleBody {
                        error: "Too Many Requests",
                        message,
                        retry_after,
                    }),
                )
                    .into_response();
                resp.headers_mut()
                    .insert(axum::http::header::RETRY_AFTER, HeaderValue::from(retry_after));
                resp
            }
        }
    }
}

/// Maps a pipeline failure to 400 or 500, labelled with the operation.
fn pipeline_error(operation: &'static str, err: PipelineError) -> AppError {
    if err.is_client_error() {
        AppError::BadRequest(err.to_string())
    } else {
        tracing::warn!(error = %err, "{}", operation);
        AppError::Internal {
            error: operation,
            details: err.public_message(),
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(e.to_string()))
}

// ============ Rate limiting ============

fn rate_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from(decision.reset_after.as_secs()),
    );
}

async fn enforce(
    state: &AppState,
    tier: Tier,
    headers: &HeaderMap,
    message: &'static str,
) -> Result<RateLimitDecision, Response> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let identifier = client_identifier(header("x-forwarded-for"), header("x-real-ip"));
    let decision = state.limits.check(tier, &identifier).await;

    if decision.allowed {
        return Ok(decision);
    }

    tracing::info!(identifier = %identifier, tier = ?tier, "rate limit exceeded");
    let mut resp = AppError::TooManyRequests {
        message,
        retry_after: state.retry_after_secs,
    }
    .into_response();
    rate_headers(resp.headers_mut(), &decision);
    Err(resp)
}

fn with_rate_headers(resp: impl IntoResponse, decision: &RateLimitDecision) -> Response {
    let mut resp = resp.into_response();
    rate_headers(resp.headers_mut(), decision);
    resp
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

// ============ POST /api/search ============

async fn handle_search(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let decision = match enforce(
        &state,
        Tier::Api,
        &headers,
        "Search rate limit exceeded. Please wait a moment.",
    )
    .await
    {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let result = async {
        let params: SearchParams = parse_body(&body)?;
        let request = state
            .pipeline
            .search_request(params)
            .map_err(|e| pipeline_error("Search failed", e))?;
        state
            .pipeline
            .search(&request)
            .await
            .map_err(|e| pipeline_error("Search failed", e))
    }
    .await;

    match result {
        Ok(response) => with_rate_headers(Json(response), &decision),
        Err(e) => with_rate_headers(e, &decision),
    }
}

// ============ POST /api/answer ============

const ANSWER_LIMIT_MESSAGE: &str =
    "Answer generation rate limit exceeded. This operation is expensive, please wait a minute.";

async fn handle_answer(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let decision = match enforce(&state, Tier::Expensive, &headers, ANSWER_LIMIT_MESSAGE).await {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let result = async {
        let params: AnswerParams = parse_body(&body)?;
        let request = state.pipeline.answer_request(params);
        state
            .pipeline
            .answer(&request)
            .await
            .map_err(|e| pipeline_error("Answer generation failed", e))
    }
    .await;

    match result {
        Ok(answer) => with_rate_headers(Json(answer), &decision),
        Err(e) => with_rate_headers(e, &decision),
    }
}

// ============ POST /api/answer/stream ============

fn json_event(name: &str, value: &impl Serialize) -> Event {
    Event::default()
        .event(name)
        .json_data(value)
        .unwrap_or_else(|_| Event::default().event("error").data("unserializable event"))
}

async fn handle_answer_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let decision = match enforce(&state, Tier::Expensive, &headers, ANSWER_LIMIT_MESSAGE).await {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let params: AnswerParams = match parse_body(&body) {
        Ok(p) => p,
        Err(e) => return with_rate_headers(e, &decision),
    };
    let request = state.pipeline.answer_request(params);

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        let delta_tx = tx.clone();
        let run = pipeline.answer_streaming(&request, move |text| {
            let _ = delta_tx.send(json_event("delta", &serde_json::json!({ "text": text })));
        });
        tokio::select! {
            outcome = run => {
                let event = match outcome {
                    Ok(result) => json_event("result", &result),
                    Err(e) => {
                        tracing::warn!(error = %e, "streamed answer failed");
                        json_event(
                            "error",
                            &ErrorBody {
                                error: "Answer generation failed".to_string(),
                                details: e.public_message(),
                            },
                        )
                    }
                };
                let _ = tx.send(event);
            }
            _ = tx.closed() => {
                tracing::debug!("client went away, abandoning streamed answer");
            }
        }
    });

    let events = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<Event, Infallible>(event), rx))
    });

    with_rate_headers(Sse::new(events).keep_alive(KeepAlive::default()), &decision)
}

// ============ POST /api/autocomplete ============

#[derive(Deserialize)]
struct AutocompleteParams {
    #[serde(default)]
    query: String,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Serialize)]
struct AutocompleteResponse {
    suggestions: Vec<Suggestion>,
}

async fn handle_autocomplete(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let decision = match enforce(
        &state,
        Tier::Cached,
        &headers,
        "Please slow down. Try again in a moment.",
    )
    .await
    {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let suggestions = match serde_json::from_slice::<AutocompleteParams>(&body) {
        Ok(params) => {
            let version = params
                .version
                .unwrap_or_else(|| state.pipeline.settings().default_version.clone());
            state.autocomplete.suggest(&params.query, &version).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "unparseable autocomplete body");
            Vec::new()
        }
    };

    with_rate_headers(Json(AutocompleteResponse { suggestions }), &decision)
}
