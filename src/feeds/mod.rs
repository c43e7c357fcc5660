//! Official spot-price feeds and the priority router.
//!
//! Three stateless adapters (coinbase, gemini, binance) each return a mid
//! price with venue and local timestamps, or nothing. The router resolves a
//! normalized `BASE/QUOTE` pair to each adapter's native symbol and returns
//! the first success in priority order. Adapters never escalate errors.

pub mod binance;
pub mod coinbase;
pub mod gemini;

use crate::transport::HttpTransport;
use crate::types::FeedVenue;
use std::time::Duration;

/// A successful official-feed sample.
#[derive(Debug, Clone)]
pub struct OfficialPrice {
    pub mid: f64,
    pub venue_ts_ms: i64,
    pub local_ts_ms: i64,
    pub venue: FeedVenue,
}

struct VenueSymbols {
    coinbase: &'static str,
    gemini: &'static str,
    binance: &'static str,
}

fn venue_symbols(symbol_pair: &str) -> Option<VenueSymbols> {
    match symbol_pair {
        "BTC/USD" | "BTC/USDT" => Some(VenueSymbols {
            coinbase: "BTC-USD",
            gemini: "btcusd",
            binance: "BTCUSDT",
        }),
        "ETH/USD" | "ETH/USDT" => Some(VenueSymbols {
            coinbase: "ETH-USD",
            gemini: "ethusd",
            binance: "ETHUSDT",
        }),
        _ => None,
    }
}

/// Query feeds in the order coinbase -> gemini -> binance and return the
/// first success along with its venue tag.
pub async fn get_official_price(
    transport: &dyn HttpTransport,
    symbol_pair: &str,
    timeout: Duration,
) -> Option<OfficialPrice> {
    let symbols = venue_symbols(symbol_pair)?;

    if let Some((mid, venue_ts_ms, local_ts_ms)) =
        coinbase::mid_price(transport, symbols.coinbase, timeout).await
    {
        return Some(OfficialPrice {
            mid,
            venue_ts_ms,
            local_ts_ms,
            venue: FeedVenue::Coinbase,
        });
    }

    if let Some((mid, venue_ts_ms, local_ts_ms)) =
        gemini::mid_price(transport, symbols.gemini, timeout).await
    {
        return Some(OfficialPrice {
            mid,
            venue_ts_ms,
            local_ts_ms,
            venue: FeedVenue::Gemini,
        });
    }

    if let Some((mid, venue_ts_ms, local_ts_ms)) =
        binance::mid_price(transport, symbols.binance, timeout).await
    {
        return Some(OfficialPrice {
            mid,
            venue_ts_ms,
            local_ts_ms,
            venue: FeedVenue::Binance,
        });
    }

    None
}
