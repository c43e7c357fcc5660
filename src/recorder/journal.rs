//! Canonical journal schema and the append-only decision journal.
//!
//! `JOURNAL_COLUMNS` is the single source of truth for the CSV layout.
//! Stability contract: new columns may only be appended at the end; existing
//! columns are never renamed, removed, or reordered within `journal_v1`.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

pub const SCHEMA_VERSION: &str = "journal_v1";

pub const JOURNAL_COLUMNS: &[&str] = &[
    // Core timing
    "ts",
    "market_id",
    "now",
    "market_end_ts",
    // Venue/symbol
    "venue",
    "symbol",
    // Official price source
    "official_required_venue",
    "official_used_venue",
    "official_used_endpoint",
    "official_mid",
    "official_ok",
    "official_err",
    "official_age_ms",
    // PM orderbook
    "pm_yes_bid",
    "pm_yes_ask",
    "pm_no_bid",
    "pm_no_ask",
    "book_ok",
    "book_err",
    "pm_book_age_ms",
    // Strategy outputs
    "implied_yes",
    "implied_no",
    "fair_up_prob",
    "edge_yes",
    "edge_no",
    "edge_gross_bps",
    "edge_net_bps",
    "spread_bps",
    "depth_total",
    // Market metadata
    "market_class",
    "required_symbol",
    "rules_end_ts",
    "end_ts_source",
    // Decision
    "regime",
    "action",
    "reason",
    "filter_reason",
    "microstructure_flags",
    // PnL state
    "daily_pnl",
    "daily_loss",
    "total_loss",
    "open_markets",
    "kill_switch",
    "params_hash",
    // Signal columns (static, empty when not computed)
    "signal_book_arbitrage_edge_bps",
    "signal_book_arbitrage_reason",
    "signal_book_arbitrage_confidence",
    "signal_book_staleness_edge_bps",
    "signal_book_staleness_reason",
    "signal_book_staleness_confidence",
    // Arbitrage-specific
    "arb_cost_cents",
    "arb_edge_cents",
];

pub type JournalRow = HashMap<String, String>;

/// Project a row onto the given column order, missing values as empty.
pub fn normalize_row(row: &JournalRow, columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|col| row.get(col).cloned().unwrap_or_default())
        .collect()
}

/// Append-only CSV journal with a stable header, fsynced per row.
pub struct TradeJournal {
    path: PathBuf,
}

impl TradeJournal {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating journal dir {}", parent.display()))?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_decision(&self, row: &JournalRow) -> Result<()> {
        let write_header = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening journal {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if write_header {
            writer.write_record(JOURNAL_COLUMNS)?;
        }
        let columns: Vec<String> = JOURNAL_COLUMNS.iter().map(|c| c.to_string()).collect();
        writer.write_record(normalize_row(row, &columns))?;
        writer.flush()?;

        let file = writer
            .into_inner()
            .map_err(|e| anyhow!("finishing journal write: {e}"))?;
        file.sync_all().context("syncing journal")?;
        Ok(())
    }
}
