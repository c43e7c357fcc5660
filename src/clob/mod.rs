//! Polymarket CLOB plumbing: orderbook-liveness probing with a typed cache,
//! and gamma-based candidate discovery and selection.

pub mod discovery;
pub mod readiness;

pub use discovery::{CandidateSelector, Selection};
pub use readiness::{ReadinessCache, ReadinessProber, ReadinessResult, ReadinessStatus};
