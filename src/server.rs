//! HTTP boundary: one answer endpoint plus a health probe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::context::ClientMatch;
use crate::conversation::{Conversation, ConversationTurn};
use crate::error::PipelineError;
use crate::orchestrator::{AnswerResult, Orchestrator};

/// Shared handler state; cloned per request.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    rate_limiter: Option<RateLimiter>,
    request_timeout: Duration,
    expose_rewritten_query: bool,
    next_request_id: Arc<AtomicU64>,
}

impl AppState {
    /// State with no rate limit that reports the rewritten query.
    pub fn new(orchestrator: Arc<Orchestrator>, request_timeout: Duration) -> Self {
        Self {
            orchestrator,
            rate_limiter: None,
            request_timeout,
            expose_rewritten_query: true,
            next_request_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Installs (or clears) the admission limiter.
    pub fn with_rate_limiter(mut self, limiter: Option<RateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    /// Controls whether responses carry `rewrittenQuery`.
    pub fn expose_rewritten_query(mut self, expose: bool) -> Self {
        self.expose_rewritten_query = expose;
        self
    }
}

/// Inbound body of `POST /v1/answer`.
#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    /// Conversation so far, oldest first.
    #[serde(default)]
    pub messages: Vec<ConversationTurn>,
}

/// Success body of `POST /v1/answer`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    /// Grounded answer text.
    pub answer: String,
    /// Sources backing the answer.
    pub matches: Vec<ClientMatch>,
    /// Standalone query used for retrieval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewritten_query: Option<String>,
}

/// Failure body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

/// Builds the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/answer", post(answer_handler))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn answer_handler(
    State(state): State<AppState>,
    payload: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "rejected malformed body");
        error_response(StatusCode::BAD_REQUEST, rejection.body_text())
    })?;
    let conversation = Conversation::new(request.messages).map_err(|err| {
        tracing::info!(error = %err, "rejected conversation");
        error_response(StatusCode::BAD_REQUEST, err.to_string())
    })?;
    if let Some(limiter) = &state.rate_limiter {
        if !limiter.try_admit() {
            return Err(error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "rate limit exceeded",
            ));
        }
    }

    let request_id = state.next_request_id.fetch_add(1, Ordering::Relaxed);
    let span = tracing::info_span!("answer", request_id);
    let start = Instant::now();
    let outcome = tokio::time::timeout(
        state.request_timeout,
        state.orchestrator.answer_conversation(conversation),
    )
    .instrument(span.clone())
    .await
    .unwrap_or(Err(PipelineError::Timeout(state.request_timeout)));
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

    span.in_scope(|| match outcome {
        Ok(result) => {
            tracing::info!(latency_ms, matches = result.matches.len(), "request succeeded");
            Ok(Json(into_response(result, state.expose_rewritten_query)))
        }
        Err(err) => {
            let (status, message) = classify(&err);
            if status.is_client_error() {
                tracing::info!(latency_ms, kind = err.kind(), error = %err, "request rejected");
            } else {
                tracing::error!(latency_ms, kind = err.kind(), error = %err, "request failed");
            }
            Err(error_response(status, message))
        }
    })
}

fn into_response(result: AnswerResult, expose_rewritten_query: bool) -> AnswerResponse {
    AnswerResponse {
        answer: result.answer,
        matches: result.matches,
        rewritten_query: expose_rewritten_query.then_some(result.rewritten_query),
    }
}

/// Maps a pipeline failure to a status and a message safe to show users.
fn classify(err: &PipelineError) -> (StatusCode, String) {
    match err {
        PipelineError::InvalidInput(inner) => (StatusCode::BAD_REQUEST, inner.to_string()),
        PipelineError::Retrieval(_) => (
            StatusCode::BAD_GATEWAY,
            "could not search the professor profiles; please try again".to_string(),
        ),
        PipelineError::Generation(_) => (
            StatusCode::BAD_GATEWAY,
            "could not generate an answer; please try again".to_string(),
        ),
        PipelineError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, err.to_string()),
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// Admission control shared by every clone of the router state.
///
/// Allows bursts of up to `burst` requests and refills at
/// `max_per_minute / 60` requests per second.
#[derive(Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<TokenBucket>>,
}

impl RateLimiter {
    /// Returns `None` when either limit is zero (limiting disabled).
    pub fn new(max_per_minute: u32, burst: u32) -> Option<Self> {
        if max_per_minute == 0 || burst == 0 {
            return None;
        }
        let bucket = TokenBucket::full(f64::from(burst), f64::from(max_per_minute) / 60.0);
        Some(Self {
            bucket: Arc::new(Mutex::new(bucket)),
        })
    }

    /// Spends one admission if the bucket allows it.
    pub fn try_admit(&self) -> bool {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.take(Instant::now())
    }
}

struct TokenBucket {
    capacity: f64,
    available: f64,
    per_second: f64,
    updated_at: Instant,
}

impl TokenBucket {
    fn full(capacity: f64, per_second: f64) -> Self {
        Self {
            capacity,
            available: capacity,
            per_second,
            updated_at: Instant::now(),
        }
    }

    fn take(&mut self, now: Instant) -> bool {
        let earned = now.saturating_duration_since(self.updated_at).as_secs_f64() * self.per_second;
        self.available = self.capacity.min(self.available + earned);
        self.updated_at = now;
        let admitted = self.available >= 1.0;
        if admitted {
            self.available -= 1.0;
        }
        admitted
    }
}
