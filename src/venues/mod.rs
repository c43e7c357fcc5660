//! Canonical venue order-book contract and per-venue adapters.
//!
//! Raw payloads are untrusted `serde_json::Value`s. Parsers are total: any
//! malformed, ambiguous, or out-of-range input produces a `NO_TRADE` book
//! with a specific fail reason, never a panic or an error to the caller.

pub mod kalshi;
pub mod polymarket;

use crate::transport::{HttpTransport, TransportError};
use crate::types::MarketVenue;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookStatus {
    Ok,
    NoTrade,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Ok => "OK",
            BookStatus::NoTrade => "NO_TRADE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookFailReason {
    NoBbo,
    DepthBelowThreshold,
    SpreadWide,
    BookUnavailable,
    ParseAmbiguous,
}

impl BookFailReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookFailReason::NoBbo => "NO_BBO",
            BookFailReason::DepthBelowThreshold => "DEPTH_BELOW_THRESHOLD",
            BookFailReason::SpreadWide => "SPREAD_WIDE",
            BookFailReason::BookUnavailable => "BOOK_UNAVAILABLE",
            BookFailReason::ParseAmbiguous => "PARSE_AMBIGUOUS",
        }
    }
}

/// Canonical order-book record. Immutable after construction.
///
/// Invariants: `status == Ok` implies a finite, uncrossed best bid/ask and no
/// fail reason; `status == NoTrade` implies both bests are absent.
#[derive(Debug, Clone)]
pub struct VenueBook {
    pub venue: MarketVenue,
    /// Capture time, epoch seconds
    pub ts: f64,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    /// Quantity resting at the best bid/ask, when the book is OK
    pub best_bid_qty: Option<f64>,
    pub best_ask_qty: Option<f64>,
    pub depth_qty_total: f64,
    pub depth_notional_total_usd: Option<f64>,
    pub status: BookStatus,
    pub fail_reason: Option<BookFailReason>,
}

impl VenueBook {
    pub(crate) fn ok(
        venue: MarketVenue,
        ts: f64,
        best_bid: (f64, f64),
        best_ask: (f64, f64),
        depth_qty_total: f64,
        depth_notional_total_usd: Option<f64>,
    ) -> Self {
        Self {
            venue,
            ts,
            best_bid: Some(best_bid.0),
            best_ask: Some(best_ask.0),
            best_bid_qty: Some(best_bid.1),
            best_ask_qty: Some(best_ask.1),
            depth_qty_total,
            depth_notional_total_usd,
            status: BookStatus::Ok,
            fail_reason: None,
        }
    }

    pub(crate) fn fail(venue: MarketVenue, ts: f64, reason: BookFailReason) -> Self {
        Self::fail_with_depth(venue, ts, reason, 0.0, None)
    }

    pub(crate) fn fail_with_depth(
        venue: MarketVenue,
        ts: f64,
        reason: BookFailReason,
        depth_qty_total: f64,
        depth_notional_total_usd: Option<f64>,
    ) -> Self {
        Self {
            venue,
            ts,
            best_bid: None,
            best_ask: None,
            best_bid_qty: None,
            best_ask_qty: None,
            depth_qty_total,
            depth_notional_total_usd,
            status: BookStatus::NoTrade,
            fail_reason: Some(reason),
        }
    }

    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "venue": self.venue.as_str(),
            "ts": self.ts,
            "best_bid": self.best_bid,
            "best_ask": self.best_ask,
            "depth_qty_total": self.depth_qty_total,
            "depth_notional_total_usd": self.depth_notional_total_usd,
            "status": self.status.as_str(),
            "fail_reason": self.fail_reason.map(|r| r.as_str()),
        })
    }
}

/// Book fetch failure after retries.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("invalid JSON payload")]
    InvalidJson,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_SECS: f64 = 1.0;
const MAX_BACKOFF_SECS: f64 = 5.0;

fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// GET a JSON payload with up to `MAX_RETRIES` retries on transient errors
/// (429, 5xx, timeout, connection) and exponential backoff 1s -> 2s -> 4s
/// capped at 5s.
pub(crate) async fn get_json_with_retry(
    transport: &dyn HttpTransport,
    url: &str,
    bearer: Option<&str>,
    timeout: Duration,
) -> Result<Value, FetchError> {
    let mut last_err = FetchError::InvalidJson;

    for attempt in 0..=MAX_RETRIES {
        match transport.get(url, bearer, timeout).await {
            Ok(response) if response.is_success() => {
                return response.json().ok_or(FetchError::InvalidJson);
            }
            Ok(response) if is_transient_status(response.status) => {
                last_err = FetchError::Status(response.status);
                warn!(status = response.status, attempt, "transient book fetch failure");
            }
            Ok(response) => return Err(FetchError::Status(response.status)),
            Err(e) => {
                last_err = FetchError::Transport(e);
                warn!(attempt, "book fetch transport failure");
            }
        }

        if attempt < MAX_RETRIES {
            let secs = (BASE_BACKOFF_SECS * 2f64.powi(attempt as i32)).min(MAX_BACKOFF_SECS);
            tokio::time::sleep(Duration::from_secs_f64(secs)).await;
        }
    }

    Err(last_err)
}

/// Rejected raw level data; callers map this to `PARSE_AMBIGUOUS`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LevelParseError;

#[derive(PartialEq, Clone, Copy)]
enum LevelShape {
    List,
    Dict,
}

fn level_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Parse one side of a raw book into `(price, qty)` pairs.
///
/// Accepted level shapes are `[price, qty]` and `{price, size|qty|quantity}`;
/// mixing shapes within a side, duplicate qty fields that disagree, and any
/// non-finite or negative number are all rejected.
pub(crate) fn parse_levels(raw: &Value) -> Result<Vec<(f64, f64)>, LevelParseError> {
    let Some(items) = raw.as_array() else {
        return Err(LevelParseError);
    };

    let mut levels = Vec::with_capacity(items.len());
    let mut shape: Option<LevelShape> = None;

    for item in items {
        let (price, qty) = match item {
            Value::Object(map) => {
                if shape == Some(LevelShape::List) {
                    return Err(LevelParseError);
                }
                shape = Some(LevelShape::Dict);

                let price_raw = map.get("price").ok_or(LevelParseError)?;
                let qty_fields: Vec<&Value> = ["size", "qty", "quantity"]
                    .iter()
                    .filter_map(|k| map.get(*k))
                    .collect();
                if qty_fields.is_empty() {
                    return Err(LevelParseError);
                }
                if qty_fields.iter().any(|v| *v != qty_fields[0]) {
                    return Err(LevelParseError);
                }

                let price = level_number(price_raw).ok_or(LevelParseError)?;
                let qty = level_number(qty_fields[0]).ok_or(LevelParseError)?;
                (price, qty)
            }
            Value::Array(pair) if pair.len() == 2 => {
                if shape == Some(LevelShape::Dict) {
                    return Err(LevelParseError);
                }
                shape = Some(LevelShape::List);

                let price = level_number(&pair[0]).ok_or(LevelParseError)?;
                let qty = level_number(&pair[1]).ok_or(LevelParseError)?;
                (price, qty)
            }
            _ => return Err(LevelParseError),
        };

        if !price.is_finite() || !qty.is_finite() || price < 0.0 || qty < 0.0 {
            return Err(LevelParseError);
        }

        levels.push((price, qty));
    }

    Ok(levels)
}

pub(crate) fn total_depth(levels: &[(f64, f64)]) -> f64 {
    levels.iter().map(|(_, qty)| qty).sum()
}

pub(crate) fn total_notional(levels: &[(f64, f64)]) -> f64 {
    levels.iter().map(|(price, qty)| price * qty).sum()
}

pub(crate) fn sort_bids_desc(levels: &mut [(f64, f64)]) {
    levels.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
}

pub(crate) fn sort_asks_asc(levels: &mut [(f64, f64)]) {
    levels.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
}
