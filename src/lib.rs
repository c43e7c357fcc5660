//! ShadowBot Library
//!
//! Read-only shadow decision engine for Kalshi and Polymarket binary markets

pub mod clob;
pub mod config;
pub mod eligibility;
pub mod feeds;
pub mod reasons;
pub mod recorder;
pub mod resolution;
pub mod risk;
pub mod runner;
pub mod signals;
pub mod strategy;
pub mod transport;
pub mod types;
pub mod venues;
