//! Resolution-source resolver.
//!
//! Market rules text names the venue whose spot price settles the contract,
//! e.g. "Resolved by the Coinbase BTC/USD spot price". The resolver extracts
//! the venue and normalized `BASE/QUOTE` symbol, along with the fallback
//! feeds the router may consult. First match wins; anything unrecognized
//! resolves to `unknown` and the pipeline fails closed.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionVenue {
    Coinbase,
    Gemini,
    Binance,
    Unknown,
}

impl ResolutionVenue {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionVenue::Coinbase => "coinbase",
            ResolutionVenue::Gemini => "gemini",
            ResolutionVenue::Binance => "binance",
            ResolutionVenue::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ResolutionVenue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Spot,
    Unknown,
}

impl EndpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::Spot => "spot",
            EndpointKind::Unknown => "unknown",
        }
    }
}

/// Where a market's official price comes from. Frozen after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionSource {
    pub venue: ResolutionVenue,
    pub symbol: String,
    pub endpoint_kind: EndpointKind,
    pub fallbacks: Vec<ResolutionVenue>,
}

impl ResolutionSource {
    pub fn unknown() -> Self {
        Self {
            venue: ResolutionVenue::Unknown,
            symbol: String::new(),
            endpoint_kind: EndpointKind::Unknown,
            fallbacks: Vec::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.venue == ResolutionVenue::Unknown
    }
}

fn coinbase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bCoinbase\s+([A-Z0-9]{2,10})\s*[/-]?\s*([A-Z0-9]{2,10})\b")
            .expect("coinbase rules pattern")
    })
}

fn gemini_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bGemini\s+([A-Z0-9]{2,10})\s*[/-]?\s*([A-Z0-9]{2,10})\b")
            .expect("gemini rules pattern")
    })
}

fn binance_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bBinance\s+([A-Z0-9]{2,10})\s*/\s*([A-Z0-9]{2,10})\b")
            .expect("binance rules pattern")
    })
}

fn normalize_symbol(base: &str, quote: &str) -> String {
    format!("{}/{}", base.to_uppercase(), quote.to_uppercase())
}

/// Parse free-text market rules into a [`ResolutionSource`].
pub fn parse_rules_text(rules_text: &str) -> ResolutionSource {
    if let Some(caps) = coinbase_re().captures(rules_text) {
        return ResolutionSource {
            venue: ResolutionVenue::Coinbase,
            symbol: normalize_symbol(&caps[1], &caps[2]),
            endpoint_kind: EndpointKind::Spot,
            fallbacks: vec![ResolutionVenue::Gemini, ResolutionVenue::Binance],
        };
    }

    if let Some(caps) = gemini_re().captures(rules_text) {
        return ResolutionSource {
            venue: ResolutionVenue::Gemini,
            symbol: normalize_symbol(&caps[1], &caps[2]),
            endpoint_kind: EndpointKind::Spot,
            fallbacks: vec![ResolutionVenue::Coinbase, ResolutionVenue::Binance],
        };
    }

    if let Some(caps) = binance_re().captures(rules_text) {
        return ResolutionSource {
            venue: ResolutionVenue::Binance,
            symbol: normalize_symbol(&caps[1], &caps[2]),
            endpoint_kind: EndpointKind::Spot,
            fallbacks: vec![],
        };
    }

    ResolutionSource::unknown()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binance_rules_resolve_without_fallbacks() {
        let source = parse_rules_text("Resolved by Binance BTC/USDT spot price");
        assert_eq!(source.venue, ResolutionVenue::Binance);
        assert_eq!(source.symbol, "BTC/USDT");
        assert_eq!(source.endpoint_kind, EndpointKind::Spot);
        assert!(source.fallbacks.is_empty());
    }

    #[test]
    fn coinbase_rules_allow_gemini_then_binance() {
        let source = parse_rules_text("Resolved by the Coinbase BTC/USD spot price");
        assert_eq!(source.venue, ResolutionVenue::Coinbase);
        assert_eq!(source.symbol, "BTC/USD");
        assert_eq!(
            source.fallbacks,
            vec![ResolutionVenue::Gemini, ResolutionVenue::Binance]
        );
    }

    #[test]
    fn first_match_wins() {
        let source = parse_rules_text("Gemini ETH/USD unless Binance ETH/USDT differs");
        assert_eq!(source.venue, ResolutionVenue::Gemini);
        assert_eq!(source.symbol, "ETH/USD");
    }

    #[test]
    fn unrecognized_rules_are_unknown() {
        assert!(parse_rules_text("Settled by committee vote").is_unknown());
        assert!(parse_rules_text("").is_unknown());
    }

    #[test]
    fn dash_separator_is_accepted() {
        let source = parse_rules_text("per Coinbase BTC-USD close");
        assert_eq!(source.venue, ResolutionVenue::Coinbase);
        assert_eq!(source.symbol, "BTC/USD");
    }
}
