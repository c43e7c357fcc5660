//! Gamma market discovery and candidate selection.
//!
//! Discover up to 100 active markets, admit the ones whose metadata and
//! expiry window pass, rank by `(liquidity, 24h volume)` descending, then
//! probe YES tokens in rank order until one is READY or the probe budget is
//! exhausted.

use super::readiness::{ReadinessProber, ReadinessStatus};
use crate::reasons::ReasonCode;
use crate::transport::HttpTransport;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_GAMMA_BASE: &str = "https://gamma-api.polymarket.com";
pub const MIN_HOURS_TO_EXPIRY: i64 = 24;
pub const DEFAULT_MAX_PROBES: usize = 20;
const DISCOVERY_LIMIT: usize = 100;

fn truthy(value: Option<&Value>) -> bool {
    value.and_then(|v| v.as_bool()).unwrap_or(false)
}

/// Admission check for one discovered market.
pub fn market_eligibility(market: &Value, now: DateTime<Utc>) -> Result<(), ReasonCode> {
    if !truthy(market.get("enableOrderBook")) {
        return Err(ReasonCode::OrderbookDisabled);
    }
    if !truthy(market.get("acceptingOrders")) {
        return Err(ReasonCode::NotAcceptingOrders);
    }
    if truthy(market.get("closed")) {
        return Err(ReasonCode::MarketFilteredOut);
    }
    if truthy(market.get("restricted")) {
        return Err(ReasonCode::Restricted);
    }

    let end_date = match market.get("endDateIso").and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => s,
        _ => return Err(ReasonCode::NoEndDate),
    };

    let end = DateTime::parse_from_rfc3339(end_date)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ReasonCode::BadDateFormat)?;

    if end < now + ChronoDuration::hours(MIN_HOURS_TO_EXPIRY) {
        return Err(ReasonCode::ExpiringSoon);
    }

    Ok(())
}

fn decode_list_field(raw: Option<&Value>) -> Result<Option<Value>, ReasonCode> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            serde_json::from_str::<Value>(s)
                .map(Some)
                .map_err(|_| ReasonCode::GammaParseError)
        }
        Some(other) => Ok(Some(other.clone())),
    }
}

fn token_to_string(token: &Value) -> Result<String, ReasonCode> {
    match token {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        _ => Err(ReasonCode::InvalidTokenId),
    }
}

/// Extract the YES and NO token ids from a gamma market object.
///
/// `outcomes` and `clobTokenIds` each arrive either as a JSON string or a
/// native list. Requirements: both lists, equal length, exactly two
/// outcomes, case-insensitive membership of both "yes" and "no", and
/// string-or-int token ids. Any violation fails with the specific reason.
pub fn parse_yes_no_tokens(market: &Value) -> Result<(String, String), ReasonCode> {
    let outcomes = decode_list_field(market.get("outcomes"))?;
    let token_ids = decode_list_field(market.get("clobTokenIds"))?;

    let Some(outcomes) = outcomes else {
        return Err(ReasonCode::GammaParseError);
    };
    let Some(outcomes) = outcomes.as_array() else {
        return Err(ReasonCode::GammaParseError);
    };

    let Some(token_ids) = token_ids else {
        return Err(ReasonCode::MissingClobTokenIds);
    };
    let Some(token_ids) = token_ids.as_array() else {
        return Err(ReasonCode::GammaParseError);
    };

    if outcomes.is_empty() {
        return Err(ReasonCode::UnsupportedOutcomesShape);
    }
    if token_ids.is_empty() {
        return Err(ReasonCode::MissingClobTokenIds);
    }
    if outcomes.len() != token_ids.len() {
        return Err(ReasonCode::OutcomeTokenLengthMismatch);
    }
    if outcomes.len() != 2 {
        return Err(ReasonCode::UnsupportedOutcomesShape);
    }

    let mut yes_idx = None;
    let mut no_idx = None;
    for (idx, outcome) in outcomes.iter().enumerate() {
        let Some(label) = outcome.as_str() else {
            return Err(ReasonCode::UnsupportedOutcomesShape);
        };
        match label.trim().to_lowercase().as_str() {
            "yes" => yes_idx = Some(idx),
            "no" => no_idx = Some(idx),
            _ => {}
        }
    }

    let (Some(yes_idx), Some(no_idx)) = (yes_idx, no_idx) else {
        return Err(ReasonCode::UnsupportedOutcomesShape);
    };

    let yes_token = token_to_string(&token_ids[yes_idx])?;
    let no_token = token_to_string(&token_ids[no_idx])?;
    Ok((yes_token, no_token))
}

fn rank_key(market: &Value) -> (f64, f64) {
    let number = |key: &str| -> f64 {
        match market.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    };
    (number("liquidityNum"), number("volume24hr"))
}

fn value_to_id(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Outcome of one selection pass.
#[derive(Debug, Clone)]
pub struct Selection {
    pub market_id: Option<String>,
    pub token_id: Option<String>,
    pub no_token_id: Option<String>,
    pub question: Option<String>,
    pub slug: Option<String>,
    pub status: ReadinessStatus,
    pub reason: ReasonCode,
    pub probes_attempted: usize,
    pub skipped: usize,
}

impl Selection {
    fn not_ready(reason: ReasonCode) -> Self {
        Self {
            market_id: None,
            token_id: None,
            no_token_id: None,
            question: None,
            slug: None,
            status: ReadinessStatus::NotReady,
            reason,
            probes_attempted: 0,
            skipped: 0,
        }
    }
}

pub struct CandidateSelector {
    transport: Arc<dyn HttpTransport>,
    gamma_url: String,
    max_probes: usize,
    timeout: Duration,
}

impl CandidateSelector {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            gamma_url: DEFAULT_GAMMA_BASE.to_string(),
            max_probes: DEFAULT_MAX_PROBES,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_gamma_url(mut self, gamma_url: impl Into<String>) -> Self {
        self.gamma_url = gamma_url.into();
        self
    }

    pub fn with_max_probes(mut self, max_probes: usize) -> Self {
        self.max_probes = max_probes;
        self
    }

    /// Fetch active markets. Failures degrade to an empty list.
    pub async fn discover(&self) -> Vec<Value> {
        let url = format!(
            "{}/markets?active=true&closed=false&limit={}&offset=0",
            self.gamma_url.trim_end_matches('/'),
            DISCOVERY_LIMIT
        );

        match self.transport.get(&url, None, self.timeout).await {
            Ok(response) if response.is_success() => response
                .json()
                .and_then(|v| v.as_array().cloned())
                .unwrap_or_default(),
            Ok(response) => {
                warn!(status = response.status, "gamma discovery rejected");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "gamma discovery failed");
                Vec::new()
            }
        }
    }

    /// Discover, filter, rank, and probe until a READY candidate is found.
    pub async fn select(&self, prober: &mut ReadinessProber) -> Selection {
        let candidates = self.discover().await;
        let mut selection = Selection::not_ready(ReasonCode::ExhaustedProbesOrCandidates);
        if candidates.is_empty() {
            return selection;
        }

        let now = Utc::now();
        let mut filtered: Vec<Value> = Vec::new();
        for market in candidates {
            match market_eligibility(&market, now) {
                Ok(()) => filtered.push(market),
                Err(_) => selection.skipped += 1,
            }
        }

        if filtered.is_empty() {
            selection.reason = ReasonCode::MarketFilteredOut;
            return selection;
        }

        filtered.sort_by(|a, b| {
            rank_key(b)
                .partial_cmp(&rank_key(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut probes_left = self.max_probes;
        for market in &filtered {
            if probes_left == 0 {
                break;
            }
            probes_left -= 1;
            selection.probes_attempted += 1;

            let (yes_token, no_token) = match parse_yes_no_tokens(market) {
                Ok(tokens) => tokens,
                Err(_) => continue,
            };

            let result = prober.probe(&yes_token).await;
            if result.status == ReadinessStatus::Ready {
                selection.market_id = value_to_id(market.get("id"));
                selection.token_id = Some(yes_token);
                selection.no_token_id = Some(no_token);
                selection.question = market
                    .get("question")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                selection.slug = market
                    .get("slug")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                selection.status = ReadinessStatus::Ready;
                selection.reason = ReasonCode::Ok;
                info!(
                    market = selection.market_id.as_deref().unwrap_or(""),
                    probes = selection.probes_attempted,
                    "candidate selected"
                );
                return selection;
            }
        }

        selection.reason = ReasonCode::NoReadyCandidates;
        selection
    }
}
