//! Shadow artifact writer.
//!
//! Guarantees, per cycle:
//! - atomic writes (sibling temp file + fsync + rename, temp removed on error)
//! - no secrets in output (keyword-scan sanitizer, applied to all text fields)
//! - bounded journal (newest N rows) and bounded JSON payloads (10 KiB)
//! - stable paths and schemas; an on-disk header that disagrees with
//!   `journal_v1` is preserved and reported instead of clobbered

pub mod journal;

pub use journal::{JournalRow, TradeJournal, JOURNAL_COLUMNS};

use regex::Regex;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

pub const SUMMARY_FILE: &str = "latest_summary.json";
pub const JOURNAL_FILE: &str = "latest_journal.csv";
pub const HEALTH_FILE: &str = "health.json";

pub const SUMMARY_SCHEMA_VERSION: &str = "shadow_summary_v1";
pub const HEALTH_SCHEMA_VERSION: &str = "shadow_health_v1";
pub const SHADOW_MODE: &str = "SHADOW";

pub const MAX_TEXT_LENGTH: usize = 200;
pub const MAX_JSON_BYTES: usize = 10 * 1024;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("JSON artifact exceeds {MAX_JSON_BYTES} bytes: {0} bytes")]
    TooLarge(usize),
    #[error("artifact schema violation: {0}")]
    Schema(String),
}

fn secret_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)api[_-]?key|secret|token|authorization|bearer|private[_-]?key|password")
            .expect("secret keyword pattern")
    })
}

fn advance_while(text: &str, from: usize, limit: usize, pred: impl Fn(char) -> bool) -> usize {
    let mut end = from;
    for (idx, c) in text[from..limit].char_indices() {
        if !pred(c) {
            break;
        }
        end = from + idx + c.len_utf8();
    }
    end
}

/// Replace every secret keyword occurrence together with its `=`/`:`/space
/// separator and up to two following whitespace-delimited tokens.
/// Consumption stops before the next keyword occurrence, so adjacent
/// secrets (`api_key=... Bearer ...`) are each redacted independently.
fn redact_secrets(text: &str) -> String {
    let matches: Vec<(usize, usize)> = secret_keyword()
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();
    if matches.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;

    for (i, &(start, kw_end)) in matches.iter().enumerate() {
        if start < cursor {
            continue;
        }
        out.push_str(&text[cursor..start]);

        let limit = matches.get(i + 1).map(|&(s, _)| s).unwrap_or(text.len());
        let mut end = advance_while(text, kw_end, limit, |c| {
            c == '=' || c == ':' || c.is_whitespace()
        });
        end = advance_while(text, end, limit, |c| !c.is_whitespace());
        let gap = advance_while(text, end, limit, |c| c.is_whitespace());
        if gap > end {
            let second = advance_while(text, gap, limit, |c| !c.is_whitespace());
            if second > gap {
                end = second;
            }
        }

        out.push_str("[REDACTED]");
        cursor = end;
    }

    out.push_str(&text[cursor..]);
    out
}

/// Redact secret-shaped substrings, collapse newlines, and cap at
/// [`MAX_TEXT_LENGTH`] characters (ellipsized). Idempotent.
pub fn sanitize_text(text: &str) -> String {
    let redacted = redact_secrets(text);
    let flattened: String = redacted
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();

    if flattened.chars().count() > MAX_TEXT_LENGTH {
        let mut capped: String = flattened.chars().take(MAX_TEXT_LENGTH - 3).collect();
        capped.push_str("...");
        capped
    } else {
        flattened
    }
}

/// Per-cycle summary snapshot (`shadow_summary_v1`).
#[derive(Debug, Clone, Serialize)]
pub struct ShadowSummary {
    pub schema_version: String,
    pub mode: String,
    pub last_refresh: String,
    pub strategy: String,
    pub run_id: String,
    pub market: String,
    pub decision: String,
    pub reason: String,
    pub subreason: String,
    pub edge_bps: Option<f64>,
    pub pm_yes_mid: Option<f64>,
    pub fair_yes_prob: Option<f64>,
    pub notes: String,
    pub last_error: String,
}

impl ShadowSummary {
    fn validate(&self) -> Result<(), ArtifactError> {
        if self.schema_version != SUMMARY_SCHEMA_VERSION {
            return Err(ArtifactError::Schema(format!(
                "summary schema_version must be {SUMMARY_SCHEMA_VERSION}, got {}",
                self.schema_version
            )));
        }
        if self.mode != SHADOW_MODE {
            return Err(ArtifactError::Schema(format!(
                "summary mode must be {SHADOW_MODE}, got {}",
                self.mode
            )));
        }
        Ok(())
    }

    fn sanitized(&self) -> Self {
        Self {
            reason: sanitize_text(&self.reason),
            subreason: sanitize_text(&self.subreason),
            notes: sanitize_text(&self.notes),
            last_error: sanitize_text(&self.last_error),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildInfo {
    pub git_sha: Option<String>,
    pub version: Option<String>,
}

/// Liveness snapshot (`shadow_health_v1`).
#[derive(Debug, Clone, Serialize)]
pub struct ShadowHealth {
    pub schema_version: String,
    pub mode: String,
    pub last_run_at: String,
    pub last_success_at: Option<String>,
    pub last_error_at: Option<String>,
    pub last_error: String,
    pub last_latency_ms: i64,
    pub artifacts_written: bool,
    pub journal_rows: usize,
    pub build: BuildInfo,
    pub uptime_sec: i64,
    pub schema_mismatch: bool,
}

impl ShadowHealth {
    fn validate(&self) -> Result<(), ArtifactError> {
        if self.schema_version != HEALTH_SCHEMA_VERSION {
            return Err(ArtifactError::Schema(format!(
                "health schema_version must be {HEALTH_SCHEMA_VERSION}, got {}",
                self.schema_version
            )));
        }
        if self.mode != SHADOW_MODE {
            return Err(ArtifactError::Schema(format!(
                "health mode must be {SHADOW_MODE}, got {}",
                self.mode
            )));
        }
        Ok(())
    }

    fn sanitized(&self) -> Self {
        Self {
            last_error: sanitize_text(&self.last_error),
            ..self.clone()
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ArtifactError::Schema("artifact path has no file name".to_string()))?;
    let tmp = parent.join(format!(".{file_name}.{:08x}.tmp", rand::random::<u32>()));

    let outcome = (|| -> Result<(), ArtifactError> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if outcome.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    outcome
}

/// Serialize and atomically write a JSON artifact, enforcing the size bound.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let content = serde_json::to_string_pretty(value)?;
    let bytes = content.as_bytes();
    if bytes.len() > MAX_JSON_BYTES {
        return Err(ArtifactError::TooLarge(bytes.len()));
    }
    write_atomic(path, bytes)
}

fn existing_header(path: &Path) -> Option<Vec<String>> {
    let mut reader = csv::Reader::from_path(path).ok()?;
    let headers: Vec<String> = reader.headers().ok()?.iter().map(str::to_string).collect();
    if headers.is_empty() {
        return None;
    }
    Some(headers)
}

/// Atomically write a bounded CSV, keeping the newest `max_rows` rows.
///
/// If the file already exists with a different header, the on-disk header is
/// preserved (rows are normalized to its columns) and `false` is returned so
/// the caller can alert.
pub fn atomic_write_csv_bounded(
    path: &Path,
    header: &[&str],
    rows: &[JournalRow],
    max_rows: usize,
) -> Result<bool, ArtifactError> {
    if header.is_empty() {
        return Err(ArtifactError::Schema("CSV header cannot be empty".to_string()));
    }

    let expected: Vec<String> = header.iter().map(|c| c.to_string()).collect();
    let (columns, schema_ok) = match existing_header(path) {
        Some(on_disk) if on_disk != expected => (on_disk, false),
        _ => (expected, true),
    };

    let bounded = if rows.len() > max_rows {
        &rows[rows.len() - max_rows..]
    } else {
        rows
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&columns)?;
    for row in bounded {
        writer.write_record(journal::normalize_row(row, &columns))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ArtifactError::Schema(format!("finishing CSV buffer: {e}")))?;

    write_atomic(path, &bytes)?;
    Ok(schema_ok)
}

/// Write all three shadow artifacts. Returns `true` when every write
/// succeeded and the journal schema matched the file on disk.
pub fn write_shadow_artifacts(
    summary: &ShadowSummary,
    rows: &[JournalRow],
    health: &ShadowHealth,
    artifacts_dir: &Path,
    max_rows: usize,
) -> Result<bool, ArtifactError> {
    summary.validate()?;

    let journal_path = artifacts_dir.join(JOURNAL_FILE);
    let schema_ok = atomic_write_csv_bounded(&journal_path, JOURNAL_COLUMNS, rows, max_rows)?;

    let mut health = health.clone();
    health.schema_mismatch = !schema_ok;
    health.validate()?;

    atomic_write_json(&artifacts_dir.join(SUMMARY_FILE), &summary.sanitized())?;
    atomic_write_json(&artifacts_dir.join(HEALTH_FILE), &health.sanitized())?;

    Ok(schema_ok)
}
