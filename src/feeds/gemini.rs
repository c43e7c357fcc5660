//! Gemini spot mid-price adapter.

use crate::transport::HttpTransport;
use crate::types::now_ms;
use std::time::Duration;
use tracing::warn;

const TICKER_URL: &str = "https://api.gemini.com/v1/pubticker";

/// Return `(mid, venue_ts_ms, local_ts_ms)`, or `None` on any failure.
/// The v1 pubticker carries no top-level timestamp, so venue time defaults
/// to local time.
pub async fn mid_price(
    transport: &dyn HttpTransport,
    symbol: &str,
    timeout: Duration,
) -> Option<(f64, i64, i64)> {
    let url = format!("{TICKER_URL}/{symbol}");
    let response = match transport.get(&url, None, timeout).await {
        Ok(r) => r,
        Err(e) => {
            warn!(source = "gemini", error = %e, "feed request failed");
            return None;
        }
    };

    if response.status == 451 {
        warn!(source = "gemini", "feed geo-blocked (HTTP 451)");
        return None;
    }
    if !response.is_success() {
        warn!(source = "gemini", status = response.status, "feed request rejected");
        return None;
    }

    let data = response.json()?;
    let bid: f64 = data.get("bid")?.as_str()?.parse().ok()?;
    let ask: f64 = data.get("ask")?.as_str()?.parse().ok()?;
    let local_ts_ms = now_ms();

    Some(((bid + ask) / 2.0, local_ts_ms, local_ts_ms))
}
