//! Kalshi book adapter.
//!
//! Kalshi quotes probabilities in cents (0-100) or occasionally already in
//! [0,1]; the scale is detected from the payload and everything is normalized
//! to [0,1]. A missing YES side can be derived from the complementary NO side
//! as `scale - price`.

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

fn fail(ts: f64, reason: BookFailReason) -> VenueBook {
    VenueBook::fail(MarketVenue::Kalshi, ts, reason)
}

fn fail_with_depth(ts: f64, reason: BookFailReason, depth: f64, notional: f64) -> VenueBook {
    VenueBook::fail_with_depth(MarketVenue::Kalshi, ts, reason, depth, Some(notional))
}

/// All prices at or below 1 -> scale 1; any above 1 with all at or below
/// 100 -> scale 100; mixed magnitudes or anything above 100 is ambiguous.
fn detect_scale(prices: &[f64]) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }
    let has_le_one = prices.iter().any(|p| *p <= 1.0);
    let has_gt_one = prices.iter().any(|p| *p > 1.0);
    if has_le_one && has_gt_one {
        return None;
    }
    if prices.iter().any(|p| *p > 100.0) {
        return None;
    }
    Some(if has_gt_one { 100.0 } else { 1.0 })
}

/// A side key counts as present only when it is non-null and, for arrays,
/// non-empty; otherwise the nested `yes`/`no` container is consulted.
fn side_raw<'a>(payload: &'a Value, key: &str, container: Option<&'a Value>, container_key: &str) -> Option<&'a Value> {
    payload
        .get(key)
        .filter(|v| !v.is_null() && !v.as_array().map_or(false, |a| a.is_empty()))
        .or_else(|| container.and_then(|c| c.get(container_key)))
}

/// Normalize a raw orderbook payload into a canonical [`VenueBook`].
pub fn parse_book(data: &Value, ts: f64, thresholds: &BookThresholds) -> VenueBook {
    if !data.is_object() {
        return fail(ts, BookFailReason::ParseAmbiguous);
    }

    let payload = match data.get("orderbook") {
        Some(inner) => inner,
        None => data,
    };
    if !payload.is_object() {
        return fail(ts, BookFailReason::ParseAmbiguous);
    }

    let yes_container = payload.get("yes").filter(|v| v.is_object());
    let no_container = payload.get("no").filter(|v| v.is_object());

    let yes_bid_raw = side_raw(payload, "yes_bid", yes_container, "bids");
    let yes_ask_raw = side_raw(payload, "yes_ask", yes_container, "asks");
    let no_bid_raw = side_raw(payload, "no_bid", no_container, "bids");
    let no_ask_raw = side_raw(payload, "no_ask", no_container, "asks");

    if yes_bid_raw.is_none() && yes_ask_raw.is_none() && no_bid_raw.is_none() && no_ask_raw.is_none()
    {
        return fail(ts, BookFailReason::ParseAmbiguous);
    }

    let parse_side = |raw: Option<&Value>| match raw {
        Some(value) => parse_levels(value),
        None => Ok(Vec::new()),
    };

    let (mut yes_bids, mut yes_asks, no_bids, no_asks) = match (
        parse_side(yes_bid_raw),
        parse_side(yes_ask_raw),
        parse_side(no_bid_raw),
        parse_side(no_ask_raw),
    ) {
        (Ok(yb), Ok(ya), Ok(nb), Ok(na)) => (yb, ya, nb, na),
        _ => return fail(ts, BookFailReason::ParseAmbiguous),
    };

    let mut scale_prices: Vec<f64> = yes_bids.iter().chain(yes_asks.iter()).map(|l| l.0).collect();
    if scale_prices.is_empty() {
        scale_prices = no_bids.iter().chain(no_asks.iter()).map(|l| l.0).collect();
    }
    let Some(scale) = detect_scale(&scale_prices) else {
        return fail(ts, BookFailReason::ParseAmbiguous);
    };

    // Derive missing YES sides from the complementary NO side, preserving qty.
    if yes_bids.is_empty() && !no_asks.is_empty() {
        for (price, qty) in &no_asks {
            if *price > scale {
                return fail(ts, BookFailReason::ParseAmbiguous);
            }
            yes_bids.push((scale - price, *qty));
        }
    }
    if yes_asks.is_empty() && !no_bids.is_empty() {
        for (price, qty) in &no_bids {
            if *price > scale {
                return fail(ts, BookFailReason::ParseAmbiguous);
            }
            yes_asks.push((scale - price, *qty));
        }
    }

    if yes_bids.is_empty() || yes_asks.is_empty() {
        let depth = total_depth(&yes_bids) + total_depth(&yes_asks);
        let notional: f64 = yes_bids
            .iter()
            .chain(yes_asks.iter())
            .map(|(p, q)| (p / scale) * q)
            .sum();
        return fail_with_depth(ts, BookFailReason::NoBbo, depth, notional);
    }

    let mut bids: Vec<(f64, f64)> = yes_bids.iter().map(|(p, q)| (p / scale, *q)).collect();
    let mut asks: Vec<(f64, f64)> = yes_asks.iter().map(|(p, q)| (p / scale, *q)).collect();
    sort_bids_desc(&mut bids);
    sort_asks_asc(&mut asks);

    let depth_qty_total = total_depth(&bids) + total_depth(&asks);
    let depth_notional_total_usd = total_notional(&bids) + total_notional(&asks);

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

    if depth_notional_total_usd < thresholds.kalshi_depth_notional_min {
        return fail_with_depth(
            ts,
            BookFailReason::DepthBelowThreshold,
            depth_qty_total,
            depth_notional_total_usd,
        );
    }

    if best_ask - best_bid > thresholds.kalshi_spread_max {
        return fail_with_depth(
            ts,
            BookFailReason::SpreadWide,
            depth_qty_total,
            depth_notional_total_usd,
        );
    }

    VenueBook::ok(
        MarketVenue::Kalshi,
        ts,
        bids[0],
        asks[0],
        depth_qty_total,
        Some(depth_notional_total_usd),
    )
}

/// Fetch and normalize the book for a market ticker. Fetch failures map to
/// `NO_TRADE / BOOK_UNAVAILABLE`.
pub async fn fetch_venuebook(
    transport: &dyn HttpTransport,
    base_url: &str,
    market: &str,
    bearer: Option<&str>,
    thresholds: &BookThresholds,
    timeout: Duration,
) -> VenueBook {
    let ts = now_ts();
    let url = format!(
        "{}/trade-api/v2/markets/{market}/orderbook",
        base_url.trim_end_matches('/')
    );

    match get_json_with_retry(transport, &url, bearer, timeout).await {
        Ok(raw) => parse_book(&raw, ts, thresholds),
        Err(e) => {
            warn!(venue = "kalshi", error = %e, "book fetch failed");
            fail(ts, BookFailReason::BookUnavailable)
        }
    }
}

/// Fetch market metadata by ticker, unwrapping the `{"market": {...}}`
/// envelope. Used by the eligibility gate.
pub async fn fetch_market(
    transport: &dyn HttpTransport,
    base_url: &str,
    ticker: &str,
    bearer: Option<&str>,
    timeout: Duration,
) -> Result<Value, FetchError> {
    let url = format!(
        "{}/trade-api/v2/markets/{ticker}",
        base_url.trim_end_matches('/')
    );

    let response = transport.get(&url, bearer, timeout).await?;
    if !response.is_success() {
        return Err(FetchError::Status(response.status));
    }

    let raw = response.json().ok_or(FetchError::InvalidJson)?;
    Ok(raw.get("market").cloned().unwrap_or(raw))
}
