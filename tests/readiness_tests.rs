//! Readiness prober tests: exhaustive HTTP-outcome mapping, retry bounds,
//! and cache behavior.

use serde_json::json;
use shadowbot::clob::{ReadinessProber, ReadinessStatus};
use shadowbot::reasons::ReasonCode;
use shadowbot::transport::{HttpResponse, ScriptedTransport, TransportError};
use std::sync::Arc;

fn prober_with(transport: Arc<ScriptedTransport>) -> ReadinessProber {
    ReadinessProber::new(transport)
}

#[tokio::test]
async fn ready_when_midpoint_has_mid() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(
        "/midpoint",
        Ok(HttpResponse::json_body(200, &json!({"mid": "0.5"}))),
    );
    let mut prober = prober_with(transport.clone());

    let result = prober.probe("1111").await;
    assert_eq!(result.status, ReadinessStatus::Ready);
    assert_eq!(result.reason, ReasonCode::Ok);
    assert_eq!(result.meta["mid"], "0.5");
    assert_eq!(transport.calls_to("/midpoint"), 1);
}

#[tokio::test]
async fn ready_result_is_cached_within_ttl() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(
        "/midpoint",
        Ok(HttpResponse::json_body(200, &json!({"mid": "0.5"}))),
    );
    let mut prober = prober_with(transport.clone());

    let first = prober.probe("1111").await;
    let second = prober.probe("1111").await;
    assert_eq!(first.status, ReadinessStatus::Ready);
    assert_eq!(second.status, ReadinessStatus::Ready);
    // Exactly one network call: the second probe was served from cache.
    assert_eq!(transport.calls_to("/midpoint"), 1);
}

#[tokio::test]
async fn two_hundred_without_mid_is_invalid_payload() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(
        "/midpoint",
        Ok(HttpResponse::json_body(200, &json!({"price": "0.5"}))),
    );
    let mut prober = prober_with(transport.clone());

    let result = prober.probe("2222").await;
    assert_eq!(result.status, ReadinessStatus::NotReady);
    assert_eq!(result.reason, ReasonCode::ClobInvalidPayload);
    assert_eq!(transport.calls_to("/midpoint"), 1);
}

#[tokio::test]
async fn not_found_with_no_orderbook_message() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(
        "/midpoint",
        Ok(HttpResponse::json_body(
            404,
            &json!({"error": "No orderbook exists for this token"}),
        )),
    );
    let mut prober = prober_with(transport.clone());

    let result = prober.probe("3333").await;
    assert_eq!(result.status, ReadinessStatus::NotReady);
    assert_eq!(result.reason, ReasonCode::ClobNoOrderbook);
}

#[tokio::test]
async fn not_found_without_message_is_unknown() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(
        "/midpoint",
        Ok(HttpResponse::json_body(404, &json!({"error": "gone"}))),
    );
    let mut prober = prober_with(transport.clone());

    let result = prober.probe("4444").await;
    assert_eq!(result.status, ReadinessStatus::NotReady);
    assert_eq!(result.reason, ReasonCode::NotFoundUnknown);
}

#[tokio::test]
async fn bad_request_is_invalid_token() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route("/midpoint", Ok(HttpResponse::new(400, "")));
    let mut prober = prober_with(transport.clone());

    let result = prober.probe("not-a-token").await;
    assert_eq!(result.status, ReadinessStatus::NotReady);
    assert_eq!(result.reason, ReasonCode::InvalidTokenId);
    assert_eq!(transport.calls_to("/midpoint"), 1);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_probe_retries_then_reports() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route("/midpoint", Ok(HttpResponse::new(429, "")));
    let mut prober = prober_with(transport.clone());

    let result = prober.probe("5555").await;
    // 1 initial call + 3 retries.
    assert_eq!(transport.calls_to("/midpoint"), 4);
    assert_eq!(result.status, ReadinessStatus::RetryableError);
    assert_eq!(result.reason, ReasonCode::ClobRateLimited);

    // Cached (TTL 30s): a follow-up probe makes no further calls.
    let again = prober.probe("5555").await;
    assert_eq!(again.reason, ReasonCode::ClobRateLimited);
    assert_eq!(transport.calls_to("/midpoint"), 4);
}

#[tokio::test(start_paused = true)]
async fn server_errors_retry_then_report() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route("/midpoint", Ok(HttpResponse::new(503, "")));
    let mut prober = prober_with(transport.clone());

    let result = prober.probe("6666").await;
    assert_eq!(transport.calls_to("/midpoint"), 4);
    assert_eq!(result.status, ReadinessStatus::RetryableError);
    assert_eq!(result.reason, ReasonCode::Clob5xx);
}

#[tokio::test(start_paused = true)]
async fn timeouts_retry_then_report() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route("/midpoint", Err(TransportError::Timeout));
    let mut prober = prober_with(transport.clone());

    let result = prober.probe("7777").await;
    assert_eq!(transport.calls_to("/midpoint"), 4);
    assert_eq!(result.status, ReadinessStatus::RetryableError);
    assert_eq!(result.reason, ReasonCode::ClobTimeout);
}

#[tokio::test(start_paused = true)]
async fn transient_then_success_recovers() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route("/midpoint", Ok(HttpResponse::new(429, "")));
    transport.route(
        "/midpoint",
        Ok(HttpResponse::json_body(200, &json!({"mid": "0.42"}))),
    );
    let mut prober = prober_with(transport.clone());

    let result = prober.probe("8888").await;
    assert_eq!(transport.calls_to("/midpoint"), 2);
    assert_eq!(result.status, ReadinessStatus::Ready);
    assert_eq!(result.reason, ReasonCode::Ok);
}

#[tokio::test]
async fn unexpected_status_is_unknown_error() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route("/midpoint", Ok(HttpResponse::new(302, "")));
    let mut prober = prober_with(transport.clone());

    let result = prober.probe("9999").await;
    assert_eq!(result.status, ReadinessStatus::RetryableError);
    assert_eq!(result.reason, ReasonCode::ClobUnknownError);
    assert_eq!(transport.calls_to("/midpoint"), 1);
}
