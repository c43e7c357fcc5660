//! Metadata and time-window admission for the cents venue, plus the
//! per-market cooldown gate used by risk post-processing.

use crate::reasons::ReasonCode;
use crate::resolution::{parse_rules_text, ResolutionSource, ResolutionVenue};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    UnsupportedRules,
    MissingCloseTime,
    MarketClosed,
    FeedRoutingUnknown,
}

impl Eligibility {
    /// Reason emitted when a market fails admission.
    pub fn reason(&self) -> ReasonCode {
        match self {
            Eligibility::Eligible => ReasonCode::Ok,
            Eligibility::UnsupportedRules => ReasonCode::ResolutionSourceUnknown,
            Eligibility::MissingCloseTime => ReasonCode::MissingCloseTime,
            Eligibility::MarketClosed => ReasonCode::MarketClosed,
            Eligibility::FeedRoutingUnknown => ReasonCode::FeedRoutingUnknown,
        }
    }
}

pub const DEFAULT_CLOSE_BUFFER_SEC: f64 = 5.0;

/// Open means strictly before `close_ts - buffer_sec`.
pub fn is_market_open(now_ts: f64, close_ts: f64, buffer_sec: f64) -> bool {
    now_ts < close_ts - buffer_sec
}

fn parse_close_time(raw: &str) -> Option<f64> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp_millis() as f64 / 1000.0)
}

/// Admission check for a Kalshi market: rules text must resolve to a routable
/// feed, and the close time must be ISO-parseable and not within the buffer.
pub fn check_kalshi_eligibility(
    metadata: &Value,
    now_ts: f64,
    buffer_sec: f64,
) -> (Eligibility, Option<ResolutionSource>) {
    let rules_text = metadata
        .get("rules_primary")
        .or_else(|| metadata.get("rules"))
        .and_then(|v| v.as_str())
        .unwrap_or("");

    if rules_text.is_empty() {
        return (Eligibility::UnsupportedRules, None);
    }

    let source = parse_rules_text(rules_text);
    if source.is_unknown() {
        return (Eligibility::UnsupportedRules, None);
    }

    if !matches!(
        source.venue,
        ResolutionVenue::Coinbase | ResolutionVenue::Gemini | ResolutionVenue::Binance
    ) {
        return (Eligibility::FeedRoutingUnknown, Some(source));
    }

    let Some(close_raw) = metadata.get("close_time").and_then(|v| v.as_str()) else {
        return (Eligibility::MissingCloseTime, Some(source));
    };
    let Some(close_ts) = parse_close_time(close_raw) else {
        return (Eligibility::MissingCloseTime, Some(source));
    };

    if !is_market_open(now_ts, close_ts, buffer_sec) {
        return (Eligibility::MarketClosed, Some(source));
    }

    (Eligibility::Eligible, Some(source))
}

/// Parse a market's close time for per-cycle time gating.
pub fn close_ts_from_metadata(metadata: &Value) -> Option<f64> {
    metadata
        .get("close_time")
        .and_then(|v| v.as_str())
        .and_then(parse_close_time)
}

/// Suppresses a market for `cooldown_sec` after a marked trade.
#[derive(Debug, Default)]
pub struct CooldownGate {
    cooldown_sec: i64,
    last_trade_ms: HashMap<String, i64>,
}

impl CooldownGate {
    pub fn new(cooldown_sec: i64) -> Self {
        Self {
            cooldown_sec: cooldown_sec.max(0),
            last_trade_ms: HashMap::new(),
        }
    }

    pub fn is_eligible(&self, market_id: &str, now_ms: i64) -> bool {
        if self.cooldown_sec <= 0 {
            return true;
        }
        match self.last_trade_ms.get(market_id) {
            Some(last) => now_ms - last >= self.cooldown_sec * 1000,
            None => true,
        }
    }

    pub fn mark_trade(&mut self, market_id: &str, now_ms: i64) {
        self.last_trade_ms.insert(market_id.to_string(), now_ms);
    }
}
