//! Risk controls applied after the strategy decides: sliding-window rate
//! limiters, a virtual exposure tracker, and the cooldown gate. A violation
//! rewrites the decision to NO_TRADE with the risk reason while preserving
//! the edge fields already computed.

use crate::config::RiskRules;
use crate::eligibility::CooldownGate;
use crate::reasons::ReasonCode;
use crate::strategy::Decision;
use crate::types::TradeAction;
use std::collections::HashMap;
use std::collections::VecDeque;

const WINDOW_MS: i64 = 60_000;

/// Sliding 60-second window limiter.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_min: usize,
    timestamps: VecDeque<i64>,
}

impl RateLimiter {
    pub fn new(max_per_min: usize) -> Self {
        Self {
            max_per_min,
            timestamps: VecDeque::new(),
        }
    }

    /// Record the event and return whether it is admitted.
    pub fn allow(&mut self, now_ms: i64) -> bool {
        while matches!(self.timestamps.front(), Some(t) if now_ms - t > WINDOW_MS) {
            self.timestamps.pop_front();
        }
        if self.timestamps.len() >= self.max_per_min {
            return false;
        }
        self.timestamps.push_back(now_ms);
        true
    }
}

/// Virtual exposure accounting with per-market and total caps.
#[derive(Debug, Default)]
pub struct ExposureTracker {
    total: f64,
    per_market: HashMap<String, f64>,
}

impl ExposureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_add(&self, market_id: &str, notional: f64, rules: &RiskRules) -> bool {
        if self.total + notional > rules.max_exposure_total {
            return false;
        }
        let market = self.per_market.get(market_id).copied().unwrap_or(0.0);
        market + notional <= rules.max_exposure_per_market
    }

    pub fn add(&mut self, market_id: &str, notional: f64) {
        self.total += notional;
        *self.per_market.entry(market_id.to_string()).or_insert(0.0) += notional;
    }

    pub fn reset_market(&mut self, market_id: &str) {
        if let Some(notional) = self.per_market.get_mut(market_id) {
            self.total -= *notional;
            *notional = 0.0;
        }
    }

    pub fn total_exposure(&self) -> f64 {
        self.total
    }

    pub fn open_markets(&self) -> usize {
        self.per_market.values().filter(|v| **v > 0.0).count()
    }
}

/// Rewrite to NO_TRADE with a risk reason, keeping prior edge fields so the
/// journal still shows what the strategy saw.
fn rewrite(decision: &Decision, reason: ReasonCode) -> Decision {
    Decision {
        implied_yes: decision.implied_yes,
        implied_no: decision.implied_no,
        fair_up_prob: decision.fair_up_prob,
        edge_yes: decision.edge_yes,
        edge_no: decision.edge_no,
        edge_gross_bps: decision.edge_gross_bps,
        edge_net_bps: decision.edge_net_bps,
        spread_bps: decision.spread_bps,
        depth_total: decision.depth_total,
        regime: decision.regime.clone(),
        filter_reason: reason.as_str().to_string(),
        microstructure_flags: decision.microstructure_flags.clone(),
        ..Decision::no_trade(reason)
    }
}

pub fn apply_rate_limits(
    decision: Decision,
    now_ms: i64,
    order_limiter: &mut RateLimiter,
    cancel_limiter: &mut RateLimiter,
) -> Decision {
    if decision.action == TradeAction::PlaceOrder && !order_limiter.allow(now_ms) {
        return rewrite(&decision, ReasonCode::RateLimit);
    }
    if decision.cancel_all && !cancel_limiter.allow(now_ms) {
        return rewrite(&decision, ReasonCode::CancelRateLimit);
    }
    decision
}

pub fn apply_exposure_cap(
    decision: Decision,
    market_id: &str,
    exposure: &mut ExposureTracker,
    rules: &RiskRules,
) -> Decision {
    if decision.action != TradeAction::PlaceOrder {
        return decision;
    }
    let Some(size) = decision.size else {
        return decision;
    };
    if !exposure.can_add(market_id, size, rules) {
        return rewrite(&decision, ReasonCode::ExposureCap);
    }
    exposure.add(market_id, size);
    decision
}

/// Suppress a market still cooling down from its last marked trade; a
/// surviving order marks the market.
pub fn apply_cooldown(
    decision: Decision,
    market_id: &str,
    now_ms: i64,
    gate: &mut CooldownGate,
) -> Decision {
    if decision.action != TradeAction::PlaceOrder {
        return decision;
    }
    if !gate.is_eligible(market_id, now_ms) {
        return rewrite(&decision, ReasonCode::RateLimit);
    }
    gate.mark_trade(market_id, now_ms);
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn place_order() -> Decision {
        Decision {
            action: TradeAction::PlaceOrder,
            reason: ReasonCode::EdgeOk,
            side: Some(Side::Yes),
            price: Some(0.52),
            size: Some(1.0),
            edge_yes: Some(0.06),
            edge_no: Some(-0.02),
            fair_up_prob: Some(0.58),
            ..Decision::no_trade(ReasonCode::EdgeOk)
        }
    }

    #[test]
    fn limiter_enforces_window() {
        let mut limiter = RateLimiter::new(2);
        assert!(limiter.allow(0));
        assert!(limiter.allow(1_000));
        assert!(!limiter.allow(2_000));
        // The first event leaves the 60s window.
        assert!(limiter.allow(61_000));
    }

    #[test]
    fn rate_limit_rewrite_preserves_edges() {
        let mut orders = RateLimiter::new(0);
        let mut cancels = RateLimiter::new(10);
        let rewritten = apply_rate_limits(place_order(), 0, &mut orders, &mut cancels);
        assert_eq!(rewritten.action, TradeAction::NoTrade);
        assert_eq!(rewritten.reason, ReasonCode::RateLimit);
        assert_eq!(rewritten.edge_yes, Some(0.06));
        assert_eq!(rewritten.fair_up_prob, Some(0.58));
        assert!(rewritten.params_hash.is_empty());
    }

    #[test]
    fn cancel_limiter_rewrites_cancel_all() {
        let mut orders = RateLimiter::new(10);
        let mut cancels = RateLimiter::new(0);
        let decision = Decision {
            action: TradeAction::CancelReplace,
            cancel_all: true,
            ..Decision::no_trade(ReasonCode::EndTimeAnomaly)
        };
        let rewritten = apply_rate_limits(decision, 0, &mut orders, &mut cancels);
        assert_eq!(rewritten.reason, ReasonCode::CancelRateLimit);
    }

    #[test]
    fn exposure_caps_per_market_and_total() {
        let rules = RiskRules {
            max_exposure_total: 2.0,
            max_exposure_per_market: 1.0,
            ..RiskRules::default()
        };
        let mut exposure = ExposureTracker::new();

        let first = apply_exposure_cap(place_order(), "m1", &mut exposure, &rules);
        assert_eq!(first.action, TradeAction::PlaceOrder);

        // Market cap hit on the same market.
        let second = apply_exposure_cap(place_order(), "m1", &mut exposure, &rules);
        assert_eq!(second.reason, ReasonCode::ExposureCap);

        let third = apply_exposure_cap(place_order(), "m2", &mut exposure, &rules);
        assert_eq!(third.action, TradeAction::PlaceOrder);

        // Total cap hit on a fresh market.
        let fourth = apply_exposure_cap(place_order(), "m3", &mut exposure, &rules);
        assert_eq!(fourth.reason, ReasonCode::ExposureCap);

        exposure.reset_market("m1");
        assert!((exposure.total_exposure() - 1.0).abs() < 1e-12);
        assert_eq!(exposure.open_markets(), 1);
    }

    #[test]
    fn cooldown_suppresses_follow_up_orders() {
        let mut gate = CooldownGate::new(10);
        let first = apply_cooldown(place_order(), "m1", 1_000, &mut gate);
        assert_eq!(first.action, TradeAction::PlaceOrder);

        let second = apply_cooldown(place_order(), "m1", 5_000, &mut gate);
        assert_eq!(second.reason, ReasonCode::RateLimit);

        let third = apply_cooldown(place_order(), "m1", 12_000, &mut gate);
        assert_eq!(third.action, TradeAction::PlaceOrder);
    }
}
