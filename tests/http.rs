mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use profrag::server::{router, AnswerResponse, AppState, ErrorBody, RateLimiter};
use serde::de::DeserializeOwned;
use tower::ServiceExt;

use common::{global_pool, scoped_pool, summary, CountingEmbedder, Harness, ScriptedIndex, ScriptedLlm};

fn app(harness: &Harness) -> Router {
    router(AppState::new(
        Arc::clone(&harness.orchestrator),
        Duration::from_secs(5),
    ))
}

fn post_answer(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/answer")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

async fn read_json<T: DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test(flavor = "current_thread")]
async fn healthz_reports_ok() {
    let harness = Harness::well_routed();
    let response = app(&harness)
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(flavor = "current_thread")]
async fn answers_with_matches_and_rewritten_query() {
    let harness = Harness::well_routed();
    let response = app(&harness)
        .oneshot(post_answer(
            r#"{"messages":[{"role":"user","content":"Who works on quantum cryptography?"}]}"#,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body: AnswerResponse = read_json(response).await;
    assert!(!body.answer.is_empty());
    assert_eq!(body.matches.len(), 7);
    assert_eq!(
        body.rewritten_query.as_deref(),
        Some("Who works on quantum cryptography?")
    );
    assert!(body.matches.iter().all(|found| found.snippet.chars().count() <= 220));
}

#[tokio::test(flavor = "current_thread")]
async fn hidden_rewritten_query_is_omitted() {
    let harness = Harness::well_routed();
    let app = router(
        AppState::new(Arc::clone(&harness.orchestrator), Duration::from_secs(5))
            .expose_rewritten_query(false),
    );
    let response = app
        .oneshot(post_answer(
            r#"{"messages":[{"role":"user","content":"Who works on quantum cryptography?"}]}"#,
        ))
        .await
        .expect("response");
    let body: serde_json::Value = read_json(response).await;
    assert!(body.get("rewrittenQuery").is_none());
    assert!(body["matches"][0].get("professorName").is_some());
}

#[tokio::test(flavor = "current_thread")]
async fn empty_messages_are_rejected_before_any_call() {
    let harness = Harness::well_routed();
    let response = app(&harness)
        .oneshot(post_answer(r#"{"messages":[]}"#))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: ErrorBody = read_json(response).await;
    assert!(body.error.contains("at least one message"));
    assert_eq!(harness.rewrite_llm.calls(), 0);
    assert_eq!(harness.embedder.calls(), 0);
    assert_eq!(harness.index.calls(), 0);
    assert_eq!(harness.answer_llm.calls(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn malformed_json_is_a_bad_request() {
    let harness = Harness::well_routed();
    let response = app(&harness)
        .oneshot(post_answer(r#"{"messages":[{"role":"robot","content":"x"}]}"#))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = read_json(response).await;
    assert!(!body.error.is_empty());
    assert_eq!(harness.embedder.calls(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn nothing_found_is_a_success() {
    let harness = Harness::new(
        CountingEmbedder::ok(),
        ScriptedIndex::new(Vec::new(), Vec::new(), Vec::new()),
        ScriptedLlm::replying("q"),
        ScriptedLlm::replying("unused"),
    );
    let response = app(&harness)
        .oneshot(post_answer(r#"{"messages":[{"role":"user","content":"q"}]}"#))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body: AnswerResponse = read_json(response).await;
    assert_eq!(body.answer, profrag::NO_MATCHES_ANSWER);
    assert!(body.matches.is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn generation_failure_is_a_bad_gateway() {
    let harness = Harness::new(
        CountingEmbedder::ok(),
        ScriptedIndex::new(vec![summary("alice", 0.9)], scoped_pool(), global_pool()),
        ScriptedLlm::replying("q"),
        ScriptedLlm::failing("upstream 500 with internal detail"),
    );
    let response = app(&harness)
        .oneshot(post_answer(r#"{"messages":[{"role":"user","content":"q"}]}"#))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: ErrorBody = read_json(response).await;
    assert!(!body.error.contains("internal detail"));
    assert_eq!(harness.index.calls(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn slow_dependency_hits_request_deadline() {
    let harness = Harness::new(
        CountingEmbedder::slow(Duration::from_secs(30)),
        ScriptedIndex::new(Vec::new(), Vec::new(), Vec::new()),
        ScriptedLlm::replying("q"),
        ScriptedLlm::replying("unused"),
    );
    let app = router(AppState::new(
        Arc::clone(&harness.orchestrator),
        Duration::from_millis(50),
    ));
    let response = app
        .oneshot(post_answer(r#"{"messages":[{"role":"user","content":"q"}]}"#))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(harness.index.calls(), 0);
    assert_eq!(harness.answer_llm.calls(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn rate_limited_requests_get_429() {
    let harness = Harness::well_routed();
    let app = router(
        AppState::new(Arc::clone(&harness.orchestrator), Duration::from_secs(5))
            .with_rate_limiter(RateLimiter::new(1, 1)),
    );
    let body = r#"{"messages":[{"role":"user","content":"Who works on quantum cryptography?"}]}"#;
    let first = app
        .clone()
        .oneshot(post_answer(body))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(post_answer(body)).await.expect("response");
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(harness.embedder.calls(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn invalid_conversation_does_not_spend_rate_limit() {
    let harness = Harness::well_routed();
    let app = router(
        AppState::new(Arc::clone(&harness.orchestrator), Duration::from_secs(5))
            .with_rate_limiter(RateLimiter::new(1, 1)),
    );
    let rejected = app
        .clone()
        .oneshot(post_answer(
            r#"{"messages":[{"role":"assistant","content":"Hello!"}]}"#,
        ))
        .await
        .expect("response");
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

    let accepted = app
        .oneshot(post_answer(
            r#"{"messages":[{"role":"user","content":"Who works on quantum cryptography?"}]}"#,
        ))
        .await
        .expect("response");
    assert_eq!(accepted.status(), StatusCode::OK);
    assert_eq!(harness.embedder.calls(), 1);
}
