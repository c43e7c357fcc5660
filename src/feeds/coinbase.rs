//! Coinbase spot mid-price adapter.

use crate::transport::HttpTransport;
use crate::types::now_ms;
use std::time::Duration;
use tracing::warn;

const TICKER_URL: &str = "https://api.exchange.coinbase.com/products";

/// Return `(mid, venue_ts_ms, local_ts_ms)`, or `None` on any failure.
pub async fn mid_price(
    transport: &dyn HttpTransport,
    symbol: &str,
    timeout: Duration,
) -> Option<(f64, i64, i64)> {
    let url = format!("{TICKER_URL}/{symbol}/ticker");
    let response = match transport.get(&url, None, timeout).await {
        Ok(r) => r,
        Err(e) => {
            warn!(source = "coinbase", error = %e, "feed request failed");
            return None;
        }
    };

    if response.status == 451 {
        warn!(source = "coinbase", "feed geo-blocked (HTTP 451)");
        return None;
    }
    if !response.is_success() {
        warn!(source = "coinbase", status = response.status, "feed request rejected");
        return None;
    }

    let data = response.json()?;
    let bid: f64 = data.get("bid")?.as_str()?.parse().ok()?;
    let ask: f64 = data.get("ask")?.as_str()?.parse().ok()?;
    let local_ts_ms = now_ms();

    // Ticker time is RFC 3339 with nanosecond precision; fall back to local
    // time when it fails to parse.
    let venue_ts_ms = data
        .get("time")
        .and_then(|t| t.as_str())
        .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(local_ts_ms);

    Some(((bid + ask) / 2.0, venue_ts_ms, local_ts_ms))
}
