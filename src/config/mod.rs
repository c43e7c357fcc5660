//! Configuration management for ShadowBot
//!
//! All knobs come from environment variables (loaded through `.env` via
//! dotenvy by the binary). Config-file loading belongs to the out-of-scope
//! orchestration layer, so nothing here touches the filesystem.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

/// Risk knobs for the stale-edge strategy.
///
/// This is the rich rule set; the historical minimal variant is deprecated
/// and not implemented. Every field can be overridden with a `STALE_EDGE_*`
/// environment variable.
#[derive(Debug, Clone)]
pub struct RiskRules {
    pub max_exposure_total: f64,
    pub max_exposure_per_market: f64,
    pub min_trade_usd: f64,
    pub max_trade_usd: f64,
    pub max_orders_per_min: usize,
    pub max_cancel_replace_per_min: usize,
    pub time_to_end_cutoff_sec: i64,
    pub official_stale_sec: i64,
    pub book_stale_sec: i64,
    pub feed_stale_abort_sec: i64,
    pub spread_max: f64,
    pub fees_est: f64,
    pub spread_buffer: f64,
    pub model_error_tax: f64,
    pub model_horizon_sec: i64,
    pub model_warmup_samples: usize,
    pub shadow_min_days: i64,
    pub thin_book_threshold_depth_usd: f64,
    pub thin_book_threshold_qty: f64,
    pub taker_fee_bps: f64,
    pub maker_fee_bps: f64,
    pub slippage_bps: f64,
    pub cooldown_sec: i64,
}

impl Default for RiskRules {
    fn default() -> Self {
        Self {
            max_exposure_total: 20.0,
            max_exposure_per_market: 20.0,
            min_trade_usd: 1.0,
            max_trade_usd: 5.0,
            max_orders_per_min: 6,
            max_cancel_replace_per_min: 6,
            time_to_end_cutoff_sec: 900,
            official_stale_sec: 10,
            book_stale_sec: 5,
            feed_stale_abort_sec: 30,
            spread_max: 0.05,
            fees_est: 0.01,
            spread_buffer: 0.01,
            model_error_tax: 0.02,
            model_horizon_sec: 300,
            model_warmup_samples: 5,
            shadow_min_days: 1,
            thin_book_threshold_depth_usd: 20.0,
            thin_book_threshold_qty: 5.0,
            taker_fee_bps: 0.0,
            maker_fee_bps: 0.0,
            slippage_bps: 0.0,
            cooldown_sec: 0,
        }
    }
}

impl RiskRules {
    /// Load rules from `STALE_EDGE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            max_exposure_total: env_f64("STALE_EDGE_MAX_EXPOSURE_TOTAL", d.max_exposure_total)?,
            max_exposure_per_market: env_f64(
                "STALE_EDGE_MAX_EXPOSURE_PER_MARKET",
                d.max_exposure_per_market,
            )?,
            min_trade_usd: env_f64("STALE_EDGE_MIN_TRADE_USD", d.min_trade_usd)?,
            max_trade_usd: env_f64("STALE_EDGE_MAX_TRADE_USD", d.max_trade_usd)?,
            max_orders_per_min: env_usize("STALE_EDGE_MAX_ORDERS_PER_MIN", d.max_orders_per_min)?,
            max_cancel_replace_per_min: env_usize(
                "STALE_EDGE_MAX_CANCEL_REPLACE_PER_MIN",
                d.max_cancel_replace_per_min,
            )?,
            time_to_end_cutoff_sec: env_i64(
                "STALE_EDGE_TIME_TO_END_CUTOFF_SEC",
                d.time_to_end_cutoff_sec,
            )?,
            official_stale_sec: env_i64("STALE_EDGE_OFFICIAL_STALE_SEC", d.official_stale_sec)?,
            book_stale_sec: env_i64("STALE_EDGE_BOOK_STALE_SEC", d.book_stale_sec)?,
            feed_stale_abort_sec: env_i64(
                "STALE_EDGE_FEED_STALE_ABORT_SEC",
                d.feed_stale_abort_sec,
            )?,
            spread_max: env_f64("STALE_EDGE_SPREAD_MAX", d.spread_max)?,
            fees_est: env_f64("STALE_EDGE_FEES_EST", d.fees_est)?,
            spread_buffer: env_f64("STALE_EDGE_SPREAD_BUFFER", d.spread_buffer)?,
            model_error_tax: env_f64("STALE_EDGE_MODEL_ERROR_TAX", d.model_error_tax)?,
            model_horizon_sec: env_i64("STALE_EDGE_MODEL_HORIZON_SEC", d.model_horizon_sec)?,
            model_warmup_samples: env_usize(
                "STALE_EDGE_MODEL_WARMUP_SAMPLES",
                d.model_warmup_samples,
            )?,
            shadow_min_days: env_i64("STALE_EDGE_SHADOW_MIN_DAYS", d.shadow_min_days)?,
            thin_book_threshold_depth_usd: env_f64(
                "STALE_EDGE_THIN_BOOK_THRESHOLD_DEPTH_USD",
                d.thin_book_threshold_depth_usd,
            )?,
            thin_book_threshold_qty: env_f64(
                "STALE_EDGE_THIN_BOOK_THRESHOLD_QTY",
                d.thin_book_threshold_qty,
            )?,
            taker_fee_bps: env_f64("STALE_EDGE_TAKER_FEE_BPS", d.taker_fee_bps)?,
            maker_fee_bps: env_f64("STALE_EDGE_MAKER_FEE_BPS", d.maker_fee_bps)?,
            slippage_bps: env_f64("STALE_EDGE_SLIPPAGE_BPS", d.slippage_bps)?,
            cooldown_sec: env_i64("STALE_EDGE_COOLDOWN_SEC", d.cooldown_sec)?,
        })
    }

    /// Minimum edge a side must clear before a hypothetical order is placed.
    pub fn edge_min(&self) -> f64 {
        self.fees_est + self.spread_buffer + self.model_error_tax
    }
}

/// Venue-book admission thresholds.
#[derive(Debug, Clone)]
pub struct BookThresholds {
    /// Polymarket: minimum total quantity across both sides
    pub pm_depth_qty_min: f64,
    /// Polymarket: maximum best-ask minus best-bid
    pub pm_spread_max: f64,
    /// Kalshi: minimum total notional (USD) across both sides
    pub kalshi_depth_notional_min: f64,
    /// Kalshi: maximum spread after normalization to [0,1]
    pub kalshi_spread_max: f64,
}

impl Default for BookThresholds {
    fn default() -> Self {
        Self {
            pm_depth_qty_min: 100.0,
            pm_spread_max: 0.05,
            kalshi_depth_notional_min: 100.0,
            kalshi_spread_max: 0.05,
        }
    }
}

impl BookThresholds {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            pm_depth_qty_min: nonneg_f64_value(
                "PM_DEPTH_QTY_MIN",
                env_raw("PM_DEPTH_QTY_MIN"),
                d.pm_depth_qty_min,
            )?,
            pm_spread_max: nonneg_f64_value(
                "PM_SPREAD_MAX",
                env_raw("PM_SPREAD_MAX"),
                d.pm_spread_max,
            )?,
            kalshi_depth_notional_min: nonneg_f64_alias(
                "KALSHI_DEPTH_NOTIONAL_MIN",
                env_raw("KALSHI_DEPTH_NOTIONAL_MIN"),
                "K_DEPTH_NOTIONAL_MIN",
                env_raw("K_DEPTH_NOTIONAL_MIN"),
                d.kalshi_depth_notional_min,
            )?,
            kalshi_spread_max: nonneg_f64_alias(
                "KALSHI_SPREAD_MAX",
                env_raw("KALSHI_SPREAD_MAX"),
                "K_SPREAD_MAX",
                env_raw("K_SPREAD_MAX"),
                d.kalshi_spread_max,
            )?,
        })
    }
}

/// Artifact destination and bounds.
#[derive(Debug, Clone)]
pub struct ArtifactsConfig {
    pub dir: PathBuf,
    pub max_rows: usize,
}

pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts/shadow";
pub const DEFAULT_JOURNAL_MAX_ROWS: usize = 500;

impl ArtifactsConfig {
    /// Resolve from `SHADOW_ARTIFACTS_DIR` / `SHADOW_JOURNAL_MAX_ROWS`,
    /// with an optional directory override taking priority.
    pub fn from_env(dir_override: Option<&str>) -> Self {
        let dir = dir_override
            .map(PathBuf::from)
            .or_else(|| env_raw("SHADOW_ARTIFACTS_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_DIR));
        let max_rows = env_raw("SHADOW_JOURNAL_MAX_ROWS")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_JOURNAL_MAX_ROWS);
        Self { dir, max_rows }
    }
}

/// Kalshi API base, overridable for test/staging endpoints.
pub fn kalshi_api_base() -> String {
    env_raw("KALSHI_API_BASE").unwrap_or_else(|| "https://trading-api.kalshi.com".to_string())
}

/// True when any non-empty truthy value is set ("1", "true", "yes").
pub fn env_flag(name: &str) -> bool {
    match env_raw(name) {
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
        None => false,
    }
}

fn env_raw(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn env_f64(name: &str, default: f64) -> Result<f64> {
    match env_raw(name) {
        Some(v) => v
            .trim()
            .parse::<f64>()
            .with_context(|| format!("{name} must be a float")),
        None => Ok(default),
    }
}

fn env_i64(name: &str, default: i64) -> Result<i64> {
    match env_raw(name) {
        Some(v) => v
            .trim()
            .parse::<i64>()
            .with_context(|| format!("{name} must be an integer")),
        None => Ok(default),
    }
}

fn env_usize(name: &str, default: usize) -> Result<usize> {
    match env_raw(name) {
        Some(v) => v
            .trim()
            .parse::<usize>()
            .with_context(|| format!("{name} must be a non-negative integer")),
        None => Ok(default),
    }
}

fn nonneg_f64_value(name: &str, raw: Option<String>, default: f64) -> Result<f64> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{name} must be a non-negative float"))?;
    if !value.is_finite() || value < 0.0 {
        bail!("{name} must be a non-negative float");
    }
    Ok(value)
}

/// Resolve a threshold that historically shipped under two env names.
/// Both set and disagreeing is a startup error.
fn nonneg_f64_alias(
    primary: &str,
    primary_raw: Option<String>,
    alias: &str,
    alias_raw: Option<String>,
    default: f64,
) -> Result<f64> {
    if let (Some(p), Some(a)) = (&primary_raw, &alias_raw) {
        if p != a {
            bail!("{primary} conflicts with {alias}");
        }
    }
    nonneg_f64_value(primary, primary_raw.or(alias_raw), default)
}
