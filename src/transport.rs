//! HTTP transport seam.
//!
//! Every outbound request in the pipeline goes through [`HttpTransport`] so
//! tests and fixture mode can swap the network for an in-memory script. The
//! production implementation wraps a shared `reqwest` client carrying a single
//! `User-Agent` header.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

pub const USER_AGENT: &str = "shadowbot/0.1";

/// Default timeout applied when a caller does not parameterize its own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json_body(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET. `bearer` is attached as an `Authorization: Bearer` header
    /// when present; it must never be logged by callers.
    async fn get(
        &self,
        url: &str,
        bearer: Option<&str>,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

/// Production transport backed by `reqwest`.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        bearer: Option<&str>,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connection(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}

struct Route {
    matcher: String,
    queue: VecDeque<Result<HttpResponse, TransportError>>,
    last: Option<Result<HttpResponse, TransportError>>,
    calls: usize,
}

/// In-memory transport with scripted responses, matched by URL substring.
///
/// Each matcher holds a queue of responses consumed in order; once the queue
/// drains, the last response repeats. Call counts are recorded per route so
/// tests can assert retry and cache behavior.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    total_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for URLs containing `url_contains`. Routes match in
    /// insertion order; the first hit wins.
    pub fn route(&self, url_contains: &str, result: Result<HttpResponse, TransportError>) {
        let mut routes = self.routes.lock().expect("scripted routes poisoned");
        if let Some(route) = routes.iter_mut().find(|r| r.matcher == url_contains) {
            route.queue.push_back(result);
        } else {
            let mut queue = VecDeque::new();
            queue.push_back(result);
            routes.push(Route {
                matcher: url_contains.to_string(),
                queue,
                last: None,
                calls: 0,
            });
        }
    }

    pub fn calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub fn calls_to(&self, url_contains: &str) -> usize {
        let routes = self.routes.lock().expect("scripted routes poisoned");
        routes
            .iter()
            .find(|r| r.matcher == url_contains)
            .map(|r| r.calls)
            .unwrap_or(0)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(
        &self,
        url: &str,
        _bearer: Option<&str>,
        _timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let mut routes = self.routes.lock().expect("scripted routes poisoned");
        let Some(route) = routes.iter_mut().find(|r| url.contains(&r.matcher)) else {
            return Ok(HttpResponse::new(404, ""));
        };

        route.calls += 1;
        if let Some(result) = route.queue.pop_front() {
            route.last = Some(result.clone());
            result
        } else if let Some(last) = &route.last {
            last.clone()
        } else {
            Ok(HttpResponse::new(404, ""))
        }
    }
}

/// Canned transport for `POLYMARKET_FIXTURE_MODE`: a ready gamma candidate, a
/// live midpoint, and a healthy Polymarket book. Unmatched routes (official
/// feeds included) return 404 so the pipeline exercises its missing-feed
/// paths offline.
pub fn fixture_transport() -> ScriptedTransport {
    let transport = ScriptedTransport::new();

    let end_date = (chrono::Utc::now() + chrono::Duration::hours(48))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string();
    let candidate = json!([{
        "id": "fixture-market",
        "question": "Fixture market?",
        "slug": "fixture-market",
        "enableOrderBook": true,
        "acceptingOrders": true,
        "closed": false,
        "restricted": false,
        "endDateIso": end_date,
        "liquidityNum": 1000.0,
        "volume24hr": 500.0,
        "outcomes": "[\"Yes\",\"No\"]",
        "clobTokenIds": "[\"1111\",\"2222\"]",
    }]);
    transport.route("/markets?", Ok(HttpResponse::json_body(200, &candidate)));

    transport.route(
        "/midpoint",
        Ok(HttpResponse::json_body(200, &json!({"mid": "0.5"}))),
    );

    let book = json!({
        "market": "fixture-market",
        "bids": [["0.48", "120"], ["0.47", "80"]],
        "asks": [["0.52", "120"], ["0.53", "80"]],
    });
    transport.route("/book", Ok(HttpResponse::json_body(200, &book)));

    transport
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_routes_consume_in_order_then_repeat() {
        let transport = ScriptedTransport::new();
        transport.route("/midpoint", Ok(HttpResponse::new(429, "")));
        transport.route("/midpoint", Ok(HttpResponse::new(200, "{\"mid\":\"0.5\"}")));

        let first = transport
            .get("https://x/midpoint?token_id=1", None, DEFAULT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(first.status, 429);

        let second = transport
            .get("https://x/midpoint?token_id=1", None, DEFAULT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(second.status, 200);

        // Queue drained: last response repeats.
        let third = transport
            .get("https://x/midpoint?token_id=1", None, DEFAULT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(third.status, 200);
        assert_eq!(transport.calls_to("/midpoint"), 3);
    }

    #[tokio::test]
    async fn unmatched_url_is_not_found() {
        let transport = ScriptedTransport::new();
        let resp = transport
            .get("https://x/unknown", None, DEFAULT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(resp.status, 404);
    }
}
