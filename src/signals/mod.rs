//! Auxiliary read-only book signals feeding the journal's signal block.
//!
//! Signals never gate or abort a cycle; they annotate it. When disabled the
//! journal's signal columns stay empty.

use crate::strategy::BookTop;

#[derive(Debug, Clone)]
pub struct SignalResult {
    pub name: &'static str,
    pub reason: String,
    pub edge_gross_bps: f64,
    pub confidence: f64,
}

impl SignalResult {
    fn flat(name: &'static str, reason: &str) -> Self {
        Self {
            name,
            reason: reason.to_string(),
            edge_gross_bps: 0.0,
            confidence: 0.0,
        }
    }
}

/// Both signal outputs for one cycle plus arbitrage-specific extras.
#[derive(Debug, Clone)]
pub struct SignalOutputs {
    pub arbitrage: SignalResult,
    pub staleness: SignalResult,
    pub arb_cost_cents: Option<f64>,
    pub arb_edge_cents: Option<f64>,
}

/// Buying both sides below a combined price of 1.0 locks in the difference.
fn book_arbitrage(book: &BookTop) -> (SignalResult, Option<f64>, Option<f64>) {
    let (Some(yes_ask), Some(no_ask)) = (book.yes_ask, book.no_ask) else {
        return (SignalResult::flat("book_arbitrage", "NO_BBO"), None, None);
    };

    let cost = yes_ask + no_ask;
    let cost_cents = cost * 100.0;
    if cost < 1.0 {
        let edge = 1.0 - cost;
        let edge_bps = edge * 10_000.0;
        let result = SignalResult {
            name: "book_arbitrage",
            reason: "ARBITRAGE_EDGE".to_string(),
            edge_gross_bps: edge_bps,
            confidence: (edge_bps / 100.0).min(1.0),
        };
        (result, Some(cost_cents), Some(edge * 100.0))
    } else {
        (
            SignalResult::flat("book_arbitrage", "NO_ARB"),
            Some(cost_cents),
            None,
        )
    }
}

fn book_staleness(book: &BookTop, now_ms: i64, stale_after_ms: i64) -> SignalResult {
    let age_ms = now_ms - book.ts_ms;
    if stale_after_ms > 0 && age_ms > stale_after_ms {
        SignalResult {
            name: "book_staleness",
            reason: "BOOK_STALE".to_string(),
            edge_gross_bps: 0.0,
            confidence: (age_ms as f64 / (stale_after_ms as f64 * 2.0)).min(1.0),
        }
    } else {
        SignalResult::flat("book_staleness", "FRESH")
    }
}

pub fn run_signals(book: &BookTop, now_ms: i64, stale_after_ms: i64) -> SignalOutputs {
    let (arbitrage, arb_cost_cents, arb_edge_cents) = book_arbitrage(book);
    let staleness = book_staleness(book, now_ms, stale_after_ms);
    SignalOutputs {
        arbitrage,
        staleness,
        arb_cost_cents,
        arb_edge_cents,
    }
}
