//! Stale-edge strategy: fair value from a rolling-returns model versus the
//! implied odds on the venue book, behind a fixed chain of staleness, time,
//! and thin-book gates. The first failing gate decides the cycle.

use crate::config::RiskRules;
use crate::reasons::{ReasonCode, ThinBookReason};
use crate::types::{Side, TradeAction};
use crate::venues::VenueBook;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

/// Top-of-book snapshot the strategy evaluates.
#[derive(Debug, Clone, Default)]
pub struct BookTop {
    pub yes_bid: Option<f64>,
    pub yes_ask: Option<f64>,
    pub no_bid: Option<f64>,
    pub no_ask: Option<f64>,
    pub ts_ms: i64,
    pub yes_bid_qty: Option<f64>,
    pub yes_ask_qty: Option<f64>,
    pub no_bid_qty: Option<f64>,
    pub no_ask_qty: Option<f64>,
}

impl BookTop {
    /// Build a top from a canonical YES-side venue book, deriving the NO side
    /// as the complement. Returns `None` unless the book is OK.
    pub fn from_venue_book(book: &VenueBook, now_ms: i64) -> Option<Self> {
        let (yes_bid, yes_ask) = match (book.best_bid, book.best_ask) {
            (Some(bid), Some(ask)) => (bid, ask),
            _ => return None,
        };
        Some(Self {
            yes_bid: Some(yes_bid),
            yes_ask: Some(yes_ask),
            no_bid: Some(1.0 - yes_ask),
            no_ask: Some(1.0 - yes_bid),
            ts_ms: now_ms,
            yes_bid_qty: book.best_bid_qty,
            yes_ask_qty: book.best_ask_qty,
            no_bid_qty: book.best_ask_qty,
            no_ask_qty: book.best_bid_qty,
        })
    }

    fn depth_total(&self) -> f64 {
        [
            self.yes_bid_qty,
            self.yes_ask_qty,
            self.no_bid_qty,
            self.no_ask_qty,
        ]
        .iter()
        .flatten()
        .sum()
    }
}

/// Sliding-window up-probability estimator.
///
/// Each update records the return over `horizon` against the most recent
/// sample at least one horizon old. Prices older than two horizons are
/// discarded; at most `max_returns` returns are retained.
#[derive(Debug)]
pub struct RollingReturnModel {
    horizon_ms: i64,
    warmup_samples: usize,
    max_returns: usize,
    prices: VecDeque<(i64, f64)>,
    returns: VecDeque<f64>,
}

pub const DEFAULT_MAX_RETURNS: usize = 1000;

impl RollingReturnModel {
    pub fn new(horizon_sec: i64, warmup_samples: usize) -> Self {
        Self {
            horizon_ms: horizon_sec * 1000,
            warmup_samples,
            max_returns: DEFAULT_MAX_RETURNS,
            prices: VecDeque::new(),
            returns: VecDeque::new(),
        }
    }

    pub fn update(&mut self, ts_ms: i64, price: f64) {
        self.prices.push_back((ts_ms, price));
        let cutoff = ts_ms - self.horizon_ms * 2;
        while matches!(self.prices.front(), Some((t, _)) if *t < cutoff) {
            self.prices.pop_front();
        }

        let target_ts = ts_ms - self.horizon_ms;
        let ref_price = self
            .prices
            .iter()
            .rev()
            .find(|(t, _)| *t <= target_ts)
            .map(|(_, p)| *p);

        if let Some(ref_price) = ref_price {
            if ref_price > 0.0 {
                self.returns.push_back((price - ref_price) / ref_price);
                while self.returns.len() > self.max_returns {
                    self.returns.pop_front();
                }
            }
        }
    }

    pub fn fair_up_prob(&self) -> Option<f64> {
        if self.returns.len() < self.warmup_samples || self.returns.is_empty() {
            return None;
        }
        let up = self.returns.iter().filter(|r| **r > 0.0).count();
        Some(up as f64 / self.returns.len() as f64)
    }

    pub fn sample_count(&self) -> usize {
        self.returns.len()
    }
}

/// Which gate families run. The historical stub strategy is the disabled
/// configuration; model warmup and the edge threshold always apply.
#[derive(Debug, Clone, Copy)]
pub struct GateConfig {
    pub time_gates: bool,
    pub staleness_gates: bool,
    pub thin_book_gates: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            time_gates: true,
            staleness_gates: true,
            thin_book_gates: true,
        }
    }
}

impl GateConfig {
    pub fn disabled() -> Self {
        Self {
            time_gates: false,
            staleness_gates: false,
            thin_book_gates: false,
        }
    }
}

/// One cycle's shadow decision. Never mutated after return.
#[derive(Debug, Clone)]
pub struct Decision {
    pub action: TradeAction,
    pub reason: ReasonCode,
    pub side: Option<Side>,
    pub price: Option<f64>,
    pub size: Option<f64>,
    pub implied_yes: Option<f64>,
    pub implied_no: Option<f64>,
    pub fair_up_prob: Option<f64>,
    pub edge_yes: Option<f64>,
    pub edge_no: Option<f64>,
    pub edge_gross_bps: Option<f64>,
    pub edge_net_bps: Option<f64>,
    pub spread_bps: Option<f64>,
    pub depth_total: Option<f64>,
    pub regime: String,
    pub filter_reason: String,
    pub microstructure_flags: Vec<String>,
    pub params_hash: String,
    pub cancel_all: bool,
}

impl Decision {
    pub fn no_trade(reason: ReasonCode) -> Self {
        Self {
            action: TradeAction::NoTrade,
            reason,
            side: None,
            price: None,
            size: None,
            implied_yes: None,
            implied_no: None,
            fair_up_prob: None,
            edge_yes: None,
            edge_no: None,
            edge_gross_bps: None,
            edge_net_bps: None,
            spread_bps: None,
            depth_total: None,
            regime: String::new(),
            filter_reason: String::new(),
            microstructure_flags: Vec::new(),
            params_hash: String::new(),
            cancel_all: false,
        }
    }

    fn thin_book(sub: ThinBookReason, depth_total: f64, spread_bps: Option<f64>) -> Self {
        Self {
            filter_reason: sub.as_str().to_string(),
            depth_total: Some(depth_total),
            spread_bps,
            ..Self::no_trade(ReasonCode::ThinBook)
        }
    }
}

pub struct StaleEdgeStrategy {
    rules: RiskRules,
    gates: GateConfig,
    pub model: RollingReturnModel,
}

impl StaleEdgeStrategy {
    pub fn new(rules: RiskRules) -> Self {
        Self::with_gates(rules, GateConfig::default())
    }

    pub fn with_gates(rules: RiskRules, gates: GateConfig) -> Self {
        let model = RollingReturnModel::new(rules.model_horizon_sec, rules.model_warmup_samples);
        Self {
            rules,
            gates,
            model,
        }
    }

    pub fn rules(&self) -> &RiskRules {
        &self.rules
    }

    pub fn evaluate(
        &mut self,
        market_id: &str,
        official_mid: Option<f64>,
        official_ts_ms: Option<i64>,
        book: &BookTop,
        market_end_ts_ms: i64,
        now_ms: i64,
    ) -> Decision {
        if self.gates.time_gates {
            if now_ms >= market_end_ts_ms {
                return Decision {
                    action: TradeAction::CancelReplace,
                    cancel_all: true,
                    ..Decision::no_trade(ReasonCode::EndTimeAnomaly)
                };
            }

            if market_end_ts_ms - now_ms < self.rules.time_to_end_cutoff_sec * 1000 {
                return Decision::no_trade(ReasonCode::TimeToEndCutoff);
            }
        }

        let (Some(official_mid), Some(official_ts_ms)) = (official_mid, official_ts_ms) else {
            return Decision::no_trade(ReasonCode::OfficialFeedMissing);
        };

        if self.gates.staleness_gates {
            if now_ms - official_ts_ms > self.rules.official_stale_sec * 1000 {
                return Decision::no_trade(ReasonCode::StaleFeed);
            }
            if now_ms - book.ts_ms > self.rules.book_stale_sec * 1000 {
                return Decision::no_trade(ReasonCode::StaleBook);
            }
        }

        if self.gates.thin_book_gates {
            if let Some(decision) = self.thin_book_gate(book) {
                return decision;
            }
        }

        self.model.update(official_ts_ms, official_mid);
        let Some(fair_up_prob) = self.model.fair_up_prob() else {
            return Decision::no_trade(ReasonCode::ModelWarmup);
        };

        let implied_yes = entry_implied(book.yes_bid, book.yes_ask);
        let implied_no = entry_implied(book.no_bid, book.no_ask);
        let (Some(implied_yes), Some(implied_no)) = (implied_yes, implied_no) else {
            return Decision::no_trade(ReasonCode::BookIncomplete);
        };

        let edge_yes = fair_up_prob - implied_yes;
        let edge_no = (1.0 - fair_up_prob) - implied_no;
        let edge_min = self.rules.edge_min();

        let yes_spread = spread(book.yes_bid, book.yes_ask);
        let no_spread = spread(book.no_bid, book.no_ask);

        let mut chosen: Option<(Side, f64, f64, Option<f64>)> = None;
        if edge_yes >= edge_no && edge_yes > edge_min {
            chosen = Some((Side::Yes, book.yes_ask.unwrap_or(implied_yes), edge_yes, yes_spread));
        } else if edge_no > edge_min {
            chosen = Some((Side::No, book.no_ask.unwrap_or(implied_no), edge_no, no_spread));
        }

        let spread_ok = match &chosen {
            Some((_, _, _, side_spread)) => {
                side_spread.map_or(false, |s| s <= self.rules.spread_max)
            }
            None => false,
        };

        let depth_total = book.depth_total();

        let Some((side, price, edge, side_spread)) = chosen.filter(|_| spread_ok) else {
            let best_edge = edge_yes.max(edge_no);
            return Decision {
                implied_yes: Some(implied_yes),
                implied_no: Some(implied_no),
                fair_up_prob: Some(fair_up_prob),
                edge_yes: Some(edge_yes),
                edge_no: Some(edge_no),
                edge_gross_bps: Some(best_edge * 10_000.0),
                edge_net_bps: Some((best_edge - edge_min) * 10_000.0),
                spread_bps: match (yes_spread, no_spread) {
                    (None, None) => None,
                    (a, b) => Some(a.unwrap_or(0.0).max(b.unwrap_or(0.0)) * 10_000.0),
                },
                depth_total: Some(depth_total),
                ..Decision::no_trade(ReasonCode::EdgeTooSmall)
            };
        };

        let size = self.rules.min_trade_usd;
        Decision {
            action: TradeAction::PlaceOrder,
            reason: ReasonCode::EdgeOk,
            side: Some(side),
            price: Some(price),
            size: Some(size),
            implied_yes: Some(implied_yes),
            implied_no: Some(implied_no),
            fair_up_prob: Some(fair_up_prob),
            edge_yes: Some(edge_yes),
            edge_no: Some(edge_no),
            edge_gross_bps: Some(edge * 10_000.0),
            edge_net_bps: Some((edge - edge_min) * 10_000.0),
            spread_bps: side_spread.map(|s| s * 10_000.0),
            depth_total: Some(depth_total),
            params_hash: params_hash(market_id, side, price, size),
            ..Decision::no_trade(ReasonCode::EdgeOk)
        }
    }

    /// Thin-book checks in fixed order: NO_BBO, ONE_SIDED,
    /// DEPTH_BELOW_THRESHOLD, SPREAD_WIDE.
    fn thin_book_gate(&self, book: &BookTop) -> Option<Decision> {
        let depth_total = book.depth_total();

        if book.yes_bid.is_none()
            && book.yes_ask.is_none()
            && book.no_bid.is_none()
            && book.no_ask.is_none()
        {
            return Some(Decision::thin_book(ThinBookReason::NoBbo, depth_total, None));
        }

        if book.yes_bid.is_none()
            || book.yes_ask.is_none()
            || book.no_bid.is_none()
            || book.no_ask.is_none()
        {
            return Some(Decision::thin_book(
                ThinBookReason::OneSided,
                depth_total,
                None,
            ));
        }

        let min_usd = self.rules.thin_book_threshold_depth_usd;
        let min_qty = self.rules.thin_book_threshold_qty;
        let bad_depth = |price: Option<f64>, qty: Option<f64>| -> bool {
            let Some(price) = price else { return false };
            let qty = qty.unwrap_or(0.0);
            qty < min_qty || price * qty < min_usd
        };

        if bad_depth(book.yes_bid, book.yes_bid_qty)
            || bad_depth(book.yes_ask, book.yes_ask_qty)
            || bad_depth(book.no_bid, book.no_bid_qty)
            || bad_depth(book.no_ask, book.no_ask_qty)
        {
            return Some(Decision::thin_book(
                ThinBookReason::DepthBelowThreshold,
                depth_total,
                None,
            ));
        }

        let yes_spread = spread(book.yes_bid, book.yes_ask);
        let no_spread = spread(book.no_bid, book.no_ask);
        let widest = yes_spread.unwrap_or(0.0).max(no_spread.unwrap_or(0.0));

        let too_wide = |s: Option<f64>| s.map_or(false, |s| s > self.rules.spread_max);
        if too_wide(yes_spread) || too_wide(no_spread) {
            return Some(Decision::thin_book(
                ThinBookReason::SpreadWide,
                depth_total,
                Some(widest * 10_000.0),
            ));
        }

        None
    }
}

fn entry_implied(bid: Option<f64>, ask: Option<f64>) -> Option<f64> {
    ask.or(bid)
}

fn spread(bid: Option<f64>, ask: Option<f64>) -> Option<f64> {
    match (bid, ask) {
        (Some(bid), Some(ask)) => Some((ask - bid).max(0.0)),
        _ => None,
    }
}

/// Stable fingerprint of the would-be order parameters.
pub fn params_hash(market_id: &str, side: Side, price: f64, size: f64) -> String {
    let raw = format!("{market_id}:{side}:{price:.6}:{size:.4}");
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(digest)
}
