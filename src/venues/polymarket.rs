//! Polymarket CLOB book adapter.
//!
//! Prices are probabilities in [0,1]; anything above 1.0 is out of range for
//! this venue and the whole payload is rejected as ambiguous.

use super::{
    get_json_with_retry, parse_levels, sort_asks_asc, sort_bids_desc, total_depth, total_notional,
    BookFailReason, FetchError, VenueBook,
};
use crate::config::BookThresholds;
use crate::transport::HttpTransport;
use crate::types::{now_ts, MarketVenue};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

const CLOB_BOOK_URL: &str = "https://clob.polymarket.com/book";

fn fail(ts: f64, reason: BookFailReason) -> VenueBook {
    VenueBook::fail(MarketVenue::Polymarket, ts, reason)
}

fn fail_with_depth(ts: f64, reason: BookFailReason, depth: f64, notional: f64) -> VenueBook {
    VenueBook::fail_with_depth(MarketVenue::Polymarket, ts, reason, depth, Some(notional))
}

/// Normalize a raw `/book` payload into a canonical [`VenueBook`].
pub fn parse_book(data: &Value, ts: f64, thresholds: &BookThresholds) -> VenueBook {
    let Some(obj) = data.as_object() else {
        return fail(ts, BookFailReason::ParseAmbiguous);
    };

    if !obj.get("market").map_or(false, |m| m.is_string()) {
        return fail(ts, BookFailReason::ParseAmbiguous);
    }

    let bids_raw = obj.get("bids");
    let asks_raw = obj.get("asks");
    if bids_raw.is_none() && asks_raw.is_none() {
        return fail(ts, BookFailReason::ParseAmbiguous);
    }

    let empty = Value::Array(vec![]);
    let mut bids = match parse_levels(bids_raw.unwrap_or(&empty)) {
        Ok(levels) => levels,
        Err(_) => return fail(ts, BookFailReason::ParseAmbiguous),
    };
    let mut asks = match parse_levels(asks_raw.unwrap_or(&empty)) {
        Ok(levels) => levels,
        Err(_) => return fail(ts, BookFailReason::ParseAmbiguous),
    };

    if bids.iter().chain(asks.iter()).any(|(price, _)| *price > 1.0) {
        return fail(ts, BookFailReason::ParseAmbiguous);
    }

    sort_bids_desc(&mut bids);
    sort_asks_asc(&mut asks);

    let depth_qty_total = total_depth(&bids) + total_depth(&asks);
    let depth_notional_total_usd = total_notional(&bids) + total_notional(&asks);

    if bids.is_empty() || asks.is_empty() {
        return fail_with_depth(
            ts,
            BookFailReason::NoBbo,
            depth_qty_total,
            depth_notional_total_usd,
        );
    }

    let best_bid = bids[0].0;
    let best_ask = asks[0].0;
    if best_bid >= best_ask {
        return fail_with_depth(
            ts,
            BookFailReason::ParseAmbiguous,
            depth_qty_total,
            depth_notional_total_usd,
        );
    }

    if depth_qty_total < thresholds.pm_depth_qty_min {
        return fail_with_depth(
            ts,
            BookFailReason::DepthBelowThreshold,
            depth_qty_total,
            depth_notional_total_usd,
        );
    }

    if best_ask - best_bid > thresholds.pm_spread_max {
        return fail_with_depth(
            ts,
            BookFailReason::SpreadWide,
            depth_qty_total,
            depth_notional_total_usd,
        );
    }

    VenueBook::ok(
        MarketVenue::Polymarket,
        ts,
        bids[0],
        asks[0],
        depth_qty_total,
        Some(depth_notional_total_usd),
    )
}

/// Fetch and normalize the book for a token. Any fetch failure maps to
/// `NO_TRADE / BOOK_UNAVAILABLE`; this never returns an error.
pub async fn fetch_venuebook(
    transport: &dyn HttpTransport,
    token_id: &str,
    thresholds: &BookThresholds,
    timeout: Duration,
) -> VenueBook {
    let ts = now_ts();
    let url = format!("{CLOB_BOOK_URL}?token_id={token_id}");

    match get_json_with_retry(transport, &url, None, timeout).await {
        Ok(raw) => parse_book(&raw, ts, thresholds),
        Err(e) => {
            log_fetch_failure(&e);
            fail(ts, BookFailReason::BookUnavailable)
        }
    }
}

fn log_fetch_failure(error: &FetchError) {
    warn!(venue = "polymarket", error = %error, "book fetch failed");
}
