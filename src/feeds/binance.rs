//! Binance spot mid-price adapter with retries and server-time sync.

use crate::transport::{HttpResponse, HttpTransport, TransportError};
use crate::types::now_ms;
use std::time::Duration;
use tracing::warn;

const TIME_URL: &str = "https://api.binance.com/api/v3/time";
const BOOK_URL: &str = "https://api.binance.com/api/v3/ticker/bookTicker";

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(500);

enum FetchOutcome {
    Payload(serde_json::Value),
    Blocked,
    Retryable,
}

fn classify(result: Result<HttpResponse, TransportError>, source: &str) -> FetchOutcome {
    match result {
        Ok(response) if response.status == 451 => {
            warn!(source, "feed geo-blocked (HTTP 451)");
            FetchOutcome::Blocked
        }
        Ok(response) if response.is_success() => match response.json() {
            Some(value) => FetchOutcome::Payload(value),
            None => {
                warn!(source, "feed payload was not valid JSON");
                FetchOutcome::Retryable
            }
        },
        Ok(response) => {
            warn!(source, status = response.status, "feed request rejected");
            FetchOutcome::Retryable
        }
        Err(e) => {
            warn!(source, error = %e, "feed request failed");
            FetchOutcome::Retryable
        }
    }
}

async fn server_time_ms(transport: &dyn HttpTransport, timeout: Duration) -> Option<i64> {
    match classify(transport.get(TIME_URL, None, timeout).await, "binance") {
        FetchOutcome::Payload(value) => value.get("serverTime").and_then(|v| v.as_i64()),
        _ => None,
    }
}

/// Return `(mid, venue_ts_ms, local_ts_ms)`, or `None` on failure or
/// geo-block. Venue time comes from the exchange's time endpoint when it
/// answers, local time otherwise.
pub async fn mid_price(
    transport: &dyn HttpTransport,
    symbol: &str,
    timeout: Duration,
) -> Option<(f64, i64, i64)> {
    let url = format!("{BOOK_URL}?symbol={symbol}");

    for attempt in 0..MAX_ATTEMPTS {
        let server_ts = server_time_ms(transport, timeout).await;

        let payload = match classify(transport.get(&url, None, timeout).await, "binance") {
            FetchOutcome::Payload(value) => value,
            FetchOutcome::Blocked => return None,
            FetchOutcome::Retryable => {
                if attempt < MAX_ATTEMPTS - 1 {
                    tokio::time::sleep(BASE_BACKOFF * 2u32.pow(attempt)).await;
                    continue;
                }
                return None;
            }
        };

        let parsed = payload
            .get("bidPrice")
            .and_then(|v| v.as_str())
            .and_then(|v| v.parse::<f64>().ok())
            .zip(
                payload
                    .get("askPrice")
                    .and_then(|v| v.as_str())
                    .and_then(|v| v.parse::<f64>().ok()),
            );

        let Some((bid, ask)) = parsed else {
            warn!(source = "binance", "invalid book payload");
            if attempt < MAX_ATTEMPTS - 1 {
                tokio::time::sleep(BASE_BACKOFF * 2u32.pow(attempt)).await;
                continue;
            }
            return None;
        };

        let local_ts_ms = now_ms();
        let venue_ts_ms = server_ts.unwrap_or(local_ts_ms);
        return Some(((bid + ask) / 2.0, venue_ts_ms, local_ts_ms));
    }

    None
}
