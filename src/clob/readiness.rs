//! CLOB readiness prober.
//!
//! A token's order book is live when the midpoint endpoint answers 200 with a
//! `mid` field. Every other outcome maps to an exhaustive typed result, and
//! results are cached per token with a TTL derived from the outcome so hot
//! loops do not hammer the endpoint.

use crate::reasons::ReasonCode;
use crate::transport::HttpTransport;
use rand::Rng;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

pub const DEFAULT_CLOB_BASE: &str = "https://clob.polymarket.com";

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_SECS: f64 = 0.25;
const MAX_BACKOFF_SECS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessStatus {
    Ready,
    NotReady,
    RetryableError,
    PermError,
}

impl ReadinessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessStatus::Ready => "READY",
            ReadinessStatus::NotReady => "NOT_READY",
            ReadinessStatus::RetryableError => "RETRYABLE_ERROR",
            ReadinessStatus::PermError => "PERM_ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadinessResult {
    pub status: ReadinessStatus,
    pub reason: ReasonCode,
    pub meta: Value,
}

/// TTL seconds for a cached probe outcome.
///
/// `CLOB_NO_ORDERBOOK` is treated as NOT_READY (non-retryable within a cycle)
/// but books do appear later, so it gets the standard soft-failure TTL.
pub fn cache_ttl_for(status: ReadinessStatus, reason: ReasonCode) -> u64 {
    match status {
        ReadinessStatus::Ready => 1800,
        ReadinessStatus::RetryableError => 30,
        ReadinessStatus::NotReady if reason == ReasonCode::ClobNoOrderbook => 300,
        ReadinessStatus::NotReady => 300,
        ReadinessStatus::PermError => 3600,
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    expiry_ts: f64,
    value: ReadinessResult,
}

/// Per-pipeline probe cache: `token -> (expiry, result)`. Expired entries are
/// evicted lazily on lookup. `now_ts` is a monotonic seconds value supplied
/// by the caller.
#[derive(Debug, Default)]
pub struct ReadinessCache {
    entries: HashMap<String, CacheEntry>,
}

impl ReadinessCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, token_id: &str, now_ts: f64) -> Option<ReadinessResult> {
        match self.entries.get(token_id) {
            Some(entry) if now_ts < entry.expiry_ts => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(token_id);
                None
            }
            None => None,
        }
    }

    pub fn put(&mut self, token_id: &str, value: ReadinessResult, now_ts: f64) {
        let ttl = cache_ttl_for(value.status, value.reason) as f64;
        self.entries.insert(
            token_id.to_string(),
            CacheEntry {
                expiry_ts: now_ts + ttl,
                value,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Safe log form of a token id: its last six characters only.
pub fn token_suffix(token_id: &str) -> &str {
    let len = token_id.len();
    if len >= 6 {
        &token_id[len - 6..]
    } else {
        token_id
    }
}

pub struct ReadinessProber {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    bearer: Option<String>,
    timeout: Duration,
    cache: ReadinessCache,
    epoch: Instant,
}

impl ReadinessProber {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_CLOB_BASE.to_string(),
            bearer: None,
            timeout: Duration::from_secs(5),
            cache: ReadinessCache::new(),
            epoch: Instant::now(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_bearer(mut self, bearer: Option<String>) -> Self {
        self.bearer = bearer;
        self
    }

    fn monotonic_ts(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    async fn backoff(&self, attempt: u32) {
        let sleep = (BASE_BACKOFF_SECS * 2f64.powi(attempt as i32)).min(MAX_BACKOFF_SECS);
        let jitter = rand::thread_rng().gen_range(0.0..=sleep * 0.1);
        tokio::time::sleep(Duration::from_secs_f64(sleep + jitter)).await;
    }

    /// Probe a token's orderbook liveness, consulting the cache first.
    pub async fn probe(&mut self, token_id: &str) -> ReadinessResult {
        let now = self.monotonic_ts();
        if let Some(hit) = self.cache.get(token_id, now) {
            return hit;
        }

        let url = format!("{}/midpoint?token_id={token_id}", self.base_url);
        let empty = Value::Object(Default::default());
        let mut http_code: Option<u16> = None;
        let mut attempt = 0u32;

        let (status, reason, meta) = loop {
            match self
                .transport
                .get(&url, self.bearer.as_deref(), self.timeout)
                .await
            {
                Ok(response) => {
                    let code = response.status;
                    http_code = Some(code);

                    if code == 200 {
                        break match response.json().and_then(|d| d.get("mid").cloned()) {
                            Some(mid) => (
                                ReadinessStatus::Ready,
                                ReasonCode::Ok,
                                json!({ "mid": mid }),
                            ),
                            None => (
                                ReadinessStatus::NotReady,
                                ReasonCode::ClobInvalidPayload,
                                empty.clone(),
                            ),
                        };
                    } else if code == 404 {
                        let message = response
                            .json()
                            .and_then(|d| {
                                d.get("error")
                                    .or_else(|| d.get("message"))
                                    .and_then(|v| v.as_str())
                                    .map(str::to_string)
                            })
                            .unwrap_or_else(|| response.body.clone());
                        break if message.contains("No orderbook exists") {
                            (
                                ReadinessStatus::NotReady,
                                ReasonCode::ClobNoOrderbook,
                                empty.clone(),
                            )
                        } else {
                            (
                                ReadinessStatus::NotReady,
                                ReasonCode::NotFoundUnknown,
                                empty.clone(),
                            )
                        };
                    } else if code == 400 {
                        break (
                            ReadinessStatus::NotReady,
                            ReasonCode::InvalidTokenId,
                            empty.clone(),
                        );
                    } else if code == 429 || (500..600).contains(&code) {
                        if attempt < MAX_RETRIES {
                            self.backoff(attempt).await;
                            attempt += 1;
                            continue;
                        }
                        break (
                            ReadinessStatus::RetryableError,
                            if code == 429 {
                                ReasonCode::ClobRateLimited
                            } else {
                                ReasonCode::Clob5xx
                            },
                            empty.clone(),
                        );
                    } else {
                        break (
                            ReadinessStatus::RetryableError,
                            ReasonCode::ClobUnknownError,
                            empty.clone(),
                        );
                    }
                }
                Err(_) => {
                    http_code = None;
                    if attempt < MAX_RETRIES {
                        self.backoff(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    break (
                        ReadinessStatus::RetryableError,
                        ReasonCode::ClobTimeout,
                        empty.clone(),
                    );
                }
            }
        };

        let code_label = http_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "ERR".to_string());
        info!(
            token = %token_suffix(token_id),
            code = %code_label,
            status = status.as_str(),
            reason = reason.as_str(),
            "clob probe"
        );

        let result = ReadinessResult {
            status,
            reason,
            meta,
        };
        let now = self.monotonic_ts();
        self.cache.put(token_id, result.clone(), now);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_result() -> ReadinessResult {
        ReadinessResult {
            status: ReadinessStatus::Ready,
            reason: ReasonCode::Ok,
            meta: json!({"mid": "0.5"}),
        }
    }

    #[test]
    fn ttl_table() {
        assert_eq!(cache_ttl_for(ReadinessStatus::Ready, ReasonCode::Ok), 1800);
        assert_eq!(
            cache_ttl_for(ReadinessStatus::RetryableError, ReasonCode::ClobRateLimited),
            30
        );
        assert_eq!(
            cache_ttl_for(ReadinessStatus::NotReady, ReasonCode::ClobNoOrderbook),
            300
        );
        assert_eq!(
            cache_ttl_for(ReadinessStatus::NotReady, ReasonCode::InvalidTokenId),
            300
        );
        assert_eq!(
            cache_ttl_for(ReadinessStatus::PermError, ReasonCode::ClobUnknownError),
            3600
        );
    }

    #[test]
    fn cache_expires_lazily() {
        let mut cache = ReadinessCache::new();
        cache.put("token", ready_result(), 100.0);
        assert!(cache.get("token", 100.0 + 1799.0).is_some());
        assert!(cache.get("token", 100.0 + 1801.0).is_none());
        // Expired entry was evicted, not just hidden.
        assert!(cache.is_empty());
    }

    #[test]
    fn token_suffix_is_bounded() {
        assert_eq!(token_suffix("1234567890"), "567890");
        assert_eq!(token_suffix("12345"), "12345");
        assert_eq!(token_suffix(""), "");
    }
}
