//! Canonical reason catalog for shadow decisions.
//!
//! Every journal row, summary, and probe log emits the stable string name of
//! one of these codes. The enum is closed: adding a code is additive, renaming
//! or removing one is forbidden within a schema version.

use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonCode {
    // Success
    EdgeOk,
    Ok,

    // Staleness / data issues
    StaleFeed,
    StaleBook,
    OfficialFeedMissing,
    FeedStaleAbort,
    BookDataMissing,

    // Strategy filters
    EdgeTooSmall,
    BookIncomplete,
    ModelWarmup,
    ThinBook,

    // Safety / risk
    RateLimit,
    CancelRateLimit,
    ExposureCap,
    EndTimeAnomaly,
    TimeToEndCutoff,

    // Admission
    ResolutionSourceUnknown,
    FeedRoutingUnknown,
    MarketClosed,
    MarketFilteredOut,
    OrderbookDisabled,
    NotAcceptingOrders,
    Restricted,
    NoEndDate,
    ExpiringSoon,
    BadDateFormat,
    MissingCloseTime,

    // CLOB probe outcomes
    ClobNoOrderbook,
    ClobRateLimited,
    ClobTimeout,
    Clob5xx,
    ClobInvalidPayload,
    ClobUnknownError,
    InvalidTokenId,
    NotFoundUnknown,

    // Gamma parsing
    GammaParseError,
    MissingClobTokenIds,
    UnsupportedOutcomesShape,
    OutcomeTokenLengthMismatch,

    // Pipeline
    NoReadyCandidates,
    ExhaustedProbesOrCandidates,

    // Internal
    StrategyError,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::EdgeOk => "EDGE_OK",
            ReasonCode::Ok => "OK",
            ReasonCode::StaleFeed => "STALE_FEED",
            ReasonCode::StaleBook => "STALE_BOOK",
            ReasonCode::OfficialFeedMissing => "OFFICIAL_FEED_MISSING",
            ReasonCode::FeedStaleAbort => "FEED_STALE_ABORT",
            ReasonCode::BookDataMissing => "BOOK_DATA_MISSING",
            ReasonCode::EdgeTooSmall => "EDGE_TOO_SMALL",
            ReasonCode::BookIncomplete => "BOOK_INCOMPLETE",
            ReasonCode::ModelWarmup => "MODEL_WARMUP",
            ReasonCode::ThinBook => "THIN_BOOK",
            ReasonCode::RateLimit => "RATE_LIMIT",
            ReasonCode::CancelRateLimit => "CANCEL_RATE_LIMIT",
            ReasonCode::ExposureCap => "EXPOSURE_CAP",
            ReasonCode::EndTimeAnomaly => "END_TIME_ANOMALY",
            ReasonCode::TimeToEndCutoff => "TIME_TO_END_CUTOFF",
            ReasonCode::ResolutionSourceUnknown => "RESOLUTION_SOURCE_UNKNOWN",
            ReasonCode::FeedRoutingUnknown => "FEED_ROUTING_UNKNOWN",
            ReasonCode::MarketClosed => "MARKET_CLOSED",
            ReasonCode::MarketFilteredOut => "MARKET_FILTERED_OUT",
            ReasonCode::OrderbookDisabled => "ORDERBOOK_DISABLED",
            ReasonCode::NotAcceptingOrders => "NOT_ACCEPTING_ORDERS",
            ReasonCode::Restricted => "RESTRICTED",
            ReasonCode::NoEndDate => "NO_END_DATE",
            ReasonCode::ExpiringSoon => "EXPIRING_SOON",
            ReasonCode::BadDateFormat => "BAD_DATE_FORMAT",
            ReasonCode::MissingCloseTime => "MISSING_CLOSE_TIME",
            ReasonCode::ClobNoOrderbook => "CLOB_NO_ORDERBOOK",
            ReasonCode::ClobRateLimited => "CLOB_RATE_LIMITED",
            ReasonCode::ClobTimeout => "CLOB_TIMEOUT",
            ReasonCode::Clob5xx => "CLOB_5XX",
            ReasonCode::ClobInvalidPayload => "CLOB_INVALID_PAYLOAD",
            ReasonCode::ClobUnknownError => "CLOB_UNKNOWN_ERROR",
            ReasonCode::InvalidTokenId => "INVALID_TOKEN_ID",
            ReasonCode::NotFoundUnknown => "NOT_FOUND_UNKNOWN",
            ReasonCode::GammaParseError => "GAMMA_PARSE_ERROR",
            ReasonCode::MissingClobTokenIds => "MISSING_CLOB_TOKEN_IDS",
            ReasonCode::UnsupportedOutcomesShape => "UNSUPPORTED_OUTCOMES_SHAPE",
            ReasonCode::OutcomeTokenLengthMismatch => "OUTCOME_TOKEN_LENGTH_MISMATCH",
            ReasonCode::NoReadyCandidates => "NO_READY_CANDIDATES",
            ReasonCode::ExhaustedProbesOrCandidates => "EXHAUSTED_PROBES_OR_CANDIDATES",
            ReasonCode::StrategyError => "STRATEGY_ERROR",
        }
    }

    /// Every code in the catalog, for coverage assertions.
    pub const ALL: &'static [ReasonCode] = &[
        ReasonCode::EdgeOk,
        ReasonCode::Ok,
        ReasonCode::StaleFeed,
        ReasonCode::StaleBook,
        ReasonCode::OfficialFeedMissing,
        ReasonCode::FeedStaleAbort,
        ReasonCode::BookDataMissing,
        ReasonCode::EdgeTooSmall,
        ReasonCode::BookIncomplete,
        ReasonCode::ModelWarmup,
        ReasonCode::ThinBook,
        ReasonCode::RateLimit,
        ReasonCode::CancelRateLimit,
        ReasonCode::ExposureCap,
        ReasonCode::EndTimeAnomaly,
        ReasonCode::TimeToEndCutoff,
        ReasonCode::ResolutionSourceUnknown,
        ReasonCode::FeedRoutingUnknown,
        ReasonCode::MarketClosed,
        ReasonCode::MarketFilteredOut,
        ReasonCode::OrderbookDisabled,
        ReasonCode::NotAcceptingOrders,
        ReasonCode::Restricted,
        ReasonCode::NoEndDate,
        ReasonCode::ExpiringSoon,
        ReasonCode::BadDateFormat,
        ReasonCode::MissingCloseTime,
        ReasonCode::ClobNoOrderbook,
        ReasonCode::ClobRateLimited,
        ReasonCode::ClobTimeout,
        ReasonCode::Clob5xx,
        ReasonCode::ClobInvalidPayload,
        ReasonCode::ClobUnknownError,
        ReasonCode::InvalidTokenId,
        ReasonCode::NotFoundUnknown,
        ReasonCode::GammaParseError,
        ReasonCode::MissingClobTokenIds,
        ReasonCode::UnsupportedOutcomesShape,
        ReasonCode::OutcomeTokenLengthMismatch,
        ReasonCode::NoReadyCandidates,
        ReasonCode::ExhaustedProbesOrCandidates,
        ReasonCode::StrategyError,
    ];

    pub fn parse(s: &str) -> Option<ReasonCode> {
        Self::ALL.iter().copied().find(|code| code.as_str() == s)
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ReasonCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Sub-reason attached to `THIN_BOOK` refusals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinBookReason {
    NoBbo,
    OneSided,
    DepthBelowThreshold,
    SpreadWide,
}

impl ThinBookReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThinBookReason::NoBbo => "NO_BBO",
            ThinBookReason::OneSided => "ONE_SIDED",
            ThinBookReason::DepthBelowThreshold => "DEPTH_BELOW_THRESHOLD",
            ThinBookReason::SpreadWide => "SPREAD_WIDE",
        }
    }
}

impl fmt::Display for ThinBookReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
