//! Gamma parsing, eligibility filtering, and the selection pipeline.

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use shadowbot::clob::{CandidateSelector, ReadinessProber, ReadinessStatus};
use shadowbot::clob::discovery::{market_eligibility, parse_yes_no_tokens};
use shadowbot::reasons::ReasonCode;
use shadowbot::transport::{HttpResponse, ScriptedTransport};
use std::sync::Arc;

fn iso(hours_from_now: i64) -> String {
    (Utc::now() + Duration::hours(hours_from_now))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

fn ready_market() -> Value {
    json!({
        "id": "m1",
        "question": "Will it settle yes?",
        "slug": "will-it-settle-yes",
        "enableOrderBook": true,
        "acceptingOrders": true,
        "closed": false,
        "restricted": false,
        "endDateIso": iso(48),
        "liquidityNum": 1000.0,
        "volume24hr": 500.0,
        "outcomes": "[\"Yes\",\"No\"]",
        "clobTokenIds": "[\"1111\",\"2222\"]",
    })
}

// ---------------------------------------------------------------------------
// Token extraction
// ---------------------------------------------------------------------------

#[test]
fn tokens_from_json_encoded_strings() {
    let (yes, no) = parse_yes_no_tokens(&ready_market()).unwrap();
    assert_eq!(yes, "1111");
    assert_eq!(no, "2222");
}

#[test]
fn tokens_from_native_lists_and_int_ids() {
    let market = json!({
        "outcomes": ["No", "Yes"],
        "clobTokenIds": [2222, 1111],
    });
    let (yes, no) = parse_yes_no_tokens(&market).unwrap();
    assert_eq!(yes, "1111");
    assert_eq!(no, "2222");
}

#[test]
fn outcome_labels_are_case_insensitive() {
    let market = json!({
        "outcomes": [" YES ", "no"],
        "clobTokenIds": ["a", "b"],
    });
    let (yes, no) = parse_yes_no_tokens(&market).unwrap();
    assert_eq!(yes, "a");
    assert_eq!(no, "b");
}

#[test]
fn missing_outcomes_is_parse_error() {
    let market = json!({ "clobTokenIds": ["1", "2"] });
    assert_eq!(
        parse_yes_no_tokens(&market).unwrap_err(),
        ReasonCode::GammaParseError
    );
}

#[test]
fn missing_token_ids() {
    let market = json!({ "outcomes": ["Yes", "No"] });
    assert_eq!(
        parse_yes_no_tokens(&market).unwrap_err(),
        ReasonCode::MissingClobTokenIds
    );
    let market = json!({ "outcomes": ["Yes", "No"], "clobTokenIds": [] });
    assert_eq!(
        parse_yes_no_tokens(&market).unwrap_err(),
        ReasonCode::MissingClobTokenIds
    );
}

#[test]
fn invalid_json_string_is_parse_error() {
    let market = json!({
        "outcomes": "not json",
        "clobTokenIds": "[\"1\",\"2\"]",
    });
    assert_eq!(
        parse_yes_no_tokens(&market).unwrap_err(),
        ReasonCode::GammaParseError
    );
}

#[test]
fn length_mismatch() {
    let market = json!({
        "outcomes": ["Yes", "No"],
        "clobTokenIds": ["1", "2", "3"],
    });
    assert_eq!(
        parse_yes_no_tokens(&market).unwrap_err(),
        ReasonCode::OutcomeTokenLengthMismatch
    );
}

#[test]
fn non_binary_outcomes() {
    let market = json!({
        "outcomes": ["Yes", "No", "Maybe"],
        "clobTokenIds": ["1", "2", "3"],
    });
    assert_eq!(
        parse_yes_no_tokens(&market).unwrap_err(),
        ReasonCode::UnsupportedOutcomesShape
    );

    let market = json!({
        "outcomes": ["Up", "Down"],
        "clobTokenIds": ["1", "2"],
    });
    assert_eq!(
        parse_yes_no_tokens(&market).unwrap_err(),
        ReasonCode::UnsupportedOutcomesShape
    );
}

#[test]
fn non_scalar_token_ids_rejected() {
    let market = json!({
        "outcomes": ["Yes", "No"],
        "clobTokenIds": [["nested"], "2"],
    });
    assert_eq!(
        parse_yes_no_tokens(&market).unwrap_err(),
        ReasonCode::InvalidTokenId
    );
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

#[test]
fn eligibility_reasons_are_specific() {
    let now = Utc::now();
    let base = ready_market();

    assert!(market_eligibility(&base, now).is_ok());

    let mut m = base.clone();
    m["enableOrderBook"] = json!(false);
    assert_eq!(
        market_eligibility(&m, now).unwrap_err(),
        ReasonCode::OrderbookDisabled
    );

    let mut m = base.clone();
    m["acceptingOrders"] = json!(false);
    assert_eq!(
        market_eligibility(&m, now).unwrap_err(),
        ReasonCode::NotAcceptingOrders
    );

    let mut m = base.clone();
    m["closed"] = json!(true);
    assert_eq!(
        market_eligibility(&m, now).unwrap_err(),
        ReasonCode::MarketFilteredOut
    );

    let mut m = base.clone();
    m["restricted"] = json!(true);
    assert_eq!(
        market_eligibility(&m, now).unwrap_err(),
        ReasonCode::Restricted
    );

    let mut m = base.clone();
    m.as_object_mut().unwrap().remove("endDateIso");
    assert_eq!(
        market_eligibility(&m, now).unwrap_err(),
        ReasonCode::NoEndDate
    );

    let mut m = base.clone();
    m["endDateIso"] = json!("01/02/2026");
    assert_eq!(
        market_eligibility(&m, now).unwrap_err(),
        ReasonCode::BadDateFormat
    );

    let mut m = base.clone();
    m["endDateIso"] = json!(iso(12));
    assert_eq!(
        market_eligibility(&m, now).unwrap_err(),
        ReasonCode::ExpiringSoon
    );
}

// ---------------------------------------------------------------------------
// Selection pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn selector_picks_ready_market() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(
        "/markets?",
        Ok(HttpResponse::json_body(200, &json!([ready_market()]))),
    );
    transport.route(
        "/midpoint",
        Ok(HttpResponse::json_body(200, &json!({"mid": "0.5"}))),
    );

    let selector = CandidateSelector::new(transport.clone());
    let mut prober = ReadinessProber::new(transport.clone());

    let selection = selector.select(&mut prober).await;
    assert_eq!(selection.status, ReadinessStatus::Ready);
    assert_eq!(selection.reason, ReasonCode::Ok);
    assert_eq!(selection.market_id.as_deref(), Some("m1"));
    assert_eq!(selection.token_id.as_deref(), Some("1111"));
    assert_eq!(selection.no_token_id.as_deref(), Some("2222"));
    assert_eq!(selection.probes_attempted, 1);

    // A second pass hits the readiness cache: no new midpoint call.
    let again = selector.select(&mut prober).await;
    assert_eq!(again.status, ReadinessStatus::Ready);
    assert_eq!(transport.calls_to("/midpoint"), 1);
}

#[tokio::test]
async fn empty_discovery_exhausts() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route("/markets?", Ok(HttpResponse::json_body(200, &json!([]))));

    let selector = CandidateSelector::new(transport.clone());
    let mut prober = ReadinessProber::new(transport.clone());

    let selection = selector.select(&mut prober).await;
    assert_eq!(selection.status, ReadinessStatus::NotReady);
    assert_eq!(selection.reason, ReasonCode::ExhaustedProbesOrCandidates);
}

#[tokio::test]
async fn all_filtered_out_reports_filtering() {
    let mut closed = ready_market();
    closed["closed"] = json!(true);

    let transport = Arc::new(ScriptedTransport::new());
    transport.route("/markets?", Ok(HttpResponse::json_body(200, &json!([closed]))));

    let selector = CandidateSelector::new(transport.clone());
    let mut prober = ReadinessProber::new(transport.clone());

    let selection = selector.select(&mut prober).await;
    assert_eq!(selection.reason, ReasonCode::MarketFilteredOut);
    assert_eq!(selection.skipped, 1);
}

#[tokio::test]
async fn unready_probes_exhaust_candidates() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(
        "/markets?",
        Ok(HttpResponse::json_body(200, &json!([ready_market()]))),
    );
    transport.route(
        "/midpoint",
        Ok(HttpResponse::json_body(
            404,
            &json!({"error": "No orderbook exists"}),
        )),
    );

    let selector = CandidateSelector::new(transport.clone());
    let mut prober = ReadinessProber::new(transport.clone());

    let selection = selector.select(&mut prober).await;
    assert_eq!(selection.status, ReadinessStatus::NotReady);
    assert_eq!(selection.reason, ReasonCode::NoReadyCandidates);
    assert_eq!(selection.probes_attempted, 1);
}

#[tokio::test]
async fn ranking_prefers_liquidity_then_volume() {
    let mut low = ready_market();
    low["id"] = json!("low");
    low["liquidityNum"] = json!(10.0);
    low["clobTokenIds"] = json!("[\"lo-yes\",\"lo-no\"]");

    let mut high = ready_market();
    high["id"] = json!("high");
    high["liquidityNum"] = json!(5000.0);
    high["clobTokenIds"] = json!("[\"hi-yes\",\"hi-no\"]");

    let transport = Arc::new(ScriptedTransport::new());
    transport.route(
        "/markets?",
        Ok(HttpResponse::json_body(200, &json!([low, high]))),
    );
    transport.route(
        "/midpoint",
        Ok(HttpResponse::json_body(200, &json!({"mid": "0.5"}))),
    );

    let selector = CandidateSelector::new(transport.clone());
    let mut prober = ReadinessProber::new(transport.clone());

    let selection = selector.select(&mut prober).await;
    assert_eq!(selection.market_id.as_deref(), Some("high"));
    assert_eq!(selection.token_id.as_deref(), Some("hi-yes"));
}
