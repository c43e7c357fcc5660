//! Artifact writer tests: schema stability, sanitization, atomicity,
//! bounded journal, and schema-mismatch handling.

use shadowbot::recorder::{
    atomic_write_csv_bounded, atomic_write_json, sanitize_text, write_shadow_artifacts,
    ArtifactError, BuildInfo, JournalRow, ShadowHealth, ShadowSummary, HEALTH_FILE, JOURNAL_COLUMNS,
    JOURNAL_FILE, MAX_TEXT_LENGTH, SUMMARY_FILE,
};
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

fn summary() -> ShadowSummary {
    ShadowSummary {
        schema_version: "shadow_summary_v1".to_string(),
        mode: "SHADOW".to_string(),
        last_refresh: "2026-08-01T00:00:00Z".to_string(),
        strategy: "stale_edge".to_string(),
        run_id: "20260801_000000".to_string(),
        market: "mkt-1".to_string(),
        decision: "NO_TRADE".to_string(),
        reason: "EDGE_TOO_SMALL".to_string(),
        subreason: String::new(),
        edge_bps: Some(12.5),
        pm_yes_mid: Some(0.51),
        fair_yes_prob: Some(0.55),
        notes: String::new(),
        last_error: String::new(),
    }
}

fn health() -> ShadowHealth {
    ShadowHealth {
        schema_version: "shadow_health_v1".to_string(),
        mode: "SHADOW".to_string(),
        last_run_at: "2026-08-01T00:00:00Z".to_string(),
        last_success_at: None,
        last_error_at: None,
        last_error: String::new(),
        last_latency_ms: 42,
        artifacts_written: true,
        journal_rows: 1,
        build: BuildInfo::default(),
        uptime_sec: 10,
        schema_mismatch: false,
    }
}

fn row(ts: i64) -> JournalRow {
    let mut row = HashMap::new();
    row.insert("ts".to_string(), ts.to_string());
    row.insert("market_id".to_string(), "mkt-1".to_string());
    row.insert("action".to_string(), "NO_TRADE".to_string());
    row.insert("reason".to_string(), "EDGE_TOO_SMALL".to_string());
    row
}

// ---------------------------------------------------------------------------
// Schema stability
// ---------------------------------------------------------------------------

#[test]
fn journal_v1_columns_are_locked() {
    let expected = [
        "ts",
        "market_id",
        "now",
        "market_end_ts",
        "venue",
        "symbol",
        "official_required_venue",
        "official_used_venue",
        "official_used_endpoint",
        "official_mid",
        "official_ok",
        "official_err",
        "official_age_ms",
        "pm_yes_bid",
        "pm_yes_ask",
        "pm_no_bid",
        "pm_no_ask",
        "book_ok",
        "book_err",
        "pm_book_age_ms",
        "implied_yes",
        "implied_no",
        "fair_up_prob",
        "edge_yes",
        "edge_no",
        "edge_gross_bps",
        "edge_net_bps",
        "spread_bps",
        "depth_total",
        "market_class",
        "required_symbol",
        "rules_end_ts",
        "end_ts_source",
        "regime",
        "action",
        "reason",
        "filter_reason",
        "microstructure_flags",
        "daily_pnl",
        "daily_loss",
        "total_loss",
        "open_markets",
        "kill_switch",
        "params_hash",
        "signal_book_arbitrage_edge_bps",
        "signal_book_arbitrage_reason",
        "signal_book_arbitrage_confidence",
        "signal_book_staleness_edge_bps",
        "signal_book_staleness_reason",
        "signal_book_staleness_confidence",
        "arb_cost_cents",
        "arb_edge_cents",
    ];
    assert_eq!(JOURNAL_COLUMNS.len(), expected.len());
    assert_eq!(JOURNAL_COLUMNS, &expected);
}

// ---------------------------------------------------------------------------
// Sanitizer
// ---------------------------------------------------------------------------

#[test]
fn secrets_are_redacted() {
    let input = "api_key=sk-live-abc Bearer eyJhbGciOiJIUzI1NiJ9";
    let output = sanitize_text(input);
    assert!(output.contains("[REDACTED]"));
    assert!(!output.contains("sk-live-abc"));
    assert!(!output.contains("eyJhbGciOiJIUzI1NiJ9"));
    assert!(output.chars().count() <= MAX_TEXT_LENGTH);
}

#[test]
fn bearer_value_after_another_secret_is_redacted() {
    // Two keyword occurrences back to back: the first redaction must stop
    // before "Bearer" so the JWT behind it gets its own redaction.
    let output = sanitize_text("api_key=sk-live-abc Bearer eyJhbGciOiJIUzI1NiJ9");
    assert_eq!(output, "[REDACTED] [REDACTED]");
}

#[test]
fn sanitizer_is_idempotent() {
    let inputs = [
        "password: hunter2 extra",
        "Authorization: Bearer abc.def.ghi",
        "private-key 0xdeadbeef",
        "plain message with no secrets",
        "",
    ];
    for input in inputs {
        let once = sanitize_text(input);
        assert_eq!(once, sanitize_text(&once), "input: {input}");
    }
}

#[test]
fn long_text_is_ellipsized() {
    let out = sanitize_text(&"a".repeat(500));
    assert_eq!(out.chars().count(), MAX_TEXT_LENGTH);
    assert!(out.ends_with("..."));
}

// ---------------------------------------------------------------------------
// JSON artifacts
// ---------------------------------------------------------------------------

#[test]
fn oversized_json_is_rejected_and_prior_content_kept() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(SUMMARY_FILE);

    atomic_write_json(&path, &summary()).unwrap();
    let before = fs::read_to_string(&path).unwrap();

    let huge = ShadowSummary {
        notes: "n".repeat(20_000),
        ..summary()
    };
    let err = atomic_write_json(&path, &huge).unwrap_err();
    assert!(matches!(err, ArtifactError::TooLarge(_)));

    // Target untouched, no temp debris.
    assert_eq!(fs::read_to_string(&path).unwrap(), before);
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn wrong_schema_version_is_rejected() {
    let dir = TempDir::new().unwrap();
    let bad = ShadowSummary {
        schema_version: "shadow_summary_v2".to_string(),
        ..summary()
    };
    let err = write_shadow_artifacts(&bad, &[], &health(), dir.path(), 500).unwrap_err();
    assert!(matches!(err, ArtifactError::Schema(_)));
}

// ---------------------------------------------------------------------------
// Bounded journal
// ---------------------------------------------------------------------------

#[test]
fn journal_keeps_newest_rows_in_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(JOURNAL_FILE);

    let rows: Vec<JournalRow> = (1..=12).map(row).collect();
    let ok = atomic_write_csv_bounded(&path, JOURNAL_COLUMNS, &rows, 5).unwrap();
    assert!(ok);

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let ts_idx = JOURNAL_COLUMNS.iter().position(|c| *c == "ts").unwrap();
    let kept: Vec<String> = reader
        .records()
        .map(|r| r.unwrap().get(ts_idx).unwrap().to_string())
        .collect();
    assert_eq!(kept, vec!["8", "9", "10", "11", "12"]);
}

#[test]
fn schema_mismatch_preserves_existing_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(JOURNAL_FILE);

    fs::write(&path, "ts,legacy_col\n1,x\n").unwrap();

    let ok = atomic_write_csv_bounded(&path, JOURNAL_COLUMNS, &[row(2)], 500).unwrap();
    assert!(!ok);

    let content = fs::read_to_string(&path).unwrap();
    let header = content.lines().next().unwrap();
    assert_eq!(header, "ts,legacy_col");
    // Row normalized onto the on-disk columns.
    assert!(content.lines().nth(1).unwrap().starts_with("2,"));
}

// ---------------------------------------------------------------------------
// Full artifact set
// ---------------------------------------------------------------------------

#[test]
fn writes_all_three_artifacts() {
    let dir = TempDir::new().unwrap();

    let ok = write_shadow_artifacts(&summary(), &[row(1)], &health(), dir.path(), 500).unwrap();
    assert!(ok);

    let summary_json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap()).unwrap();
    assert_eq!(summary_json["schema_version"], "shadow_summary_v1");
    assert_eq!(summary_json["mode"], "SHADOW");

    let health_json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join(HEALTH_FILE)).unwrap()).unwrap();
    assert_eq!(health_json["schema_version"], "shadow_health_v1");
    assert_eq!(health_json["schema_mismatch"], false);

    assert!(dir.path().join(JOURNAL_FILE).exists());
}

#[test]
fn mismatch_is_flagged_in_health_and_return_value() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(JOURNAL_FILE), "ts,legacy_col\n1,x\n").unwrap();

    let ok = write_shadow_artifacts(&summary(), &[row(2)], &health(), dir.path(), 500).unwrap();
    assert!(!ok);

    let health_json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join(HEALTH_FILE)).unwrap()).unwrap();
    assert_eq!(health_json["schema_mismatch"], true);
}

#[test]
fn summary_last_error_is_sanitized_on_disk() {
    let dir = TempDir::new().unwrap();
    let dirty = ShadowSummary {
        last_error: "request failed: api_key=sk-live-abc Bearer eyJtoken".to_string(),
        ..summary()
    };

    write_shadow_artifacts(&dirty, &[], &health(), dir.path(), 500).unwrap();

    let content = fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap();
    assert!(!content.contains("sk-live-abc"));
    assert!(!content.contains("eyJtoken"));
    assert!(content.contains("[REDACTED]"));
}
