//! Core types used throughout ShadowBot
//!
//! Defines common data structures for venues, sides, and decision actions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prediction-market venue being evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketVenue {
    Polymarket,
    Kalshi,
}

impl Default for MarketVenue {
    fn default() -> Self {
        MarketVenue::Polymarket
    }
}

impl MarketVenue {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketVenue::Polymarket => "polymarket",
            MarketVenue::Kalshi => "kalshi",
        }
    }

    /// Venue tag as it appears in journal rows
    pub fn journal_tag(&self) -> &'static str {
        match self {
            MarketVenue::Polymarket => "POLYMARKET",
            MarketVenue::Kalshi => "KALSHI",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "polymarket" => Some(MarketVenue::Polymarket),
            "kalshi" => Some(MarketVenue::Kalshi),
            _ => None,
        }
    }
}

impl fmt::Display for MarketVenue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Official spot-price feed venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedVenue {
    Coinbase,
    Gemini,
    Binance,
}

impl FeedVenue {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedVenue::Coinbase => "coinbase",
            FeedVenue::Gemini => "gemini",
            FeedVenue::Binance => "binance",
        }
    }
}

impl fmt::Display for FeedVenue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Contract side for a binary market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// Hypothetical action attached to a shadow decision.
///
/// `PlaceOrder` only exists inside the pipeline; the runner relabels it
/// `WouldEnter` before anything is journaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    NoTrade,
    WouldEnter,
    WouldExit,
    CancelReplace,
    PlaceOrder,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::NoTrade => "NO_TRADE",
            TradeAction::WouldEnter => "WOULD_ENTER",
            TradeAction::WouldExit => "WOULD_EXIT",
            TradeAction::CancelReplace => "CANCEL_REPLACE",
            TradeAction::PlaceOrder => "PLACE_ORDER",
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Wall-clock epoch milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Wall-clock epoch seconds (fractional), used for eligibility windows
pub fn now_ts() -> f64 {
    now_ms() as f64 / 1000.0
}
