//! Shadow runner: one decision cycle at a time, no cross-cycle overlap.
//!
//! Each cycle follows the fixed order: candidate/market resolution, official
//! price, venue book, strategy, risk post-processing, artifacts. The runner
//! owns every piece of mutable state (model window, probe cache, limiters,
//! exposure) and is the only writer of its artifact directory.

use crate::clob::{CandidateSelector, ReadinessProber, ReadinessStatus};
use crate::config::{kalshi_api_base, ArtifactsConfig, BookThresholds, RiskRules};
use crate::eligibility::{
    check_kalshi_eligibility, close_ts_from_metadata, is_market_open, CooldownGate, Eligibility,
    DEFAULT_CLOSE_BUFFER_SEC,
};
use crate::feeds::{self, OfficialPrice};
use crate::reasons::ReasonCode;
use crate::recorder::{
    self, BuildInfo, JournalRow, ShadowHealth, ShadowSummary, TradeJournal,
};
use crate::resolution::{parse_rules_text, ResolutionSource};
use crate::risk::{
    apply_cooldown, apply_exposure_cap, apply_rate_limits, ExposureTracker, RateLimiter,
};
use crate::signals::{run_signals, SignalOutputs};
use crate::strategy::{BookTop, Decision, StaleEdgeStrategy};
use crate::transport::HttpTransport;
use crate::types::{now_ms, MarketVenue, TradeAction};
use crate::venues::{kalshi, polymarket, BookStatus};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const FEED_TIMEOUT: Duration = Duration::from_secs(5);
const BOOK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub venue: MarketVenue,
    /// Ticker (kalshi) or market/token id (polymarket). When absent on the
    /// CLOB venue, the candidate selector picks one at startup.
    pub market_id: Option<String>,
    pub rules_text: String,
    /// Market end, epoch seconds; 0 means "one hour from now".
    pub market_end_ts: i64,
    pub minutes: u64,
    pub loop_interval: Duration,
    pub once: bool,
    pub output: PathBuf,
    pub signals: bool,
    /// Budget for one cycle's fetch-and-decide path; overrun records
    /// STRATEGY_ERROR and the loop continues.
    pub cycle_budget: Duration,
}

#[derive(Debug, Default)]
struct RunStats {
    decisions: u64,
    would_trade: u64,
    edge_sum: f64,
    edge_count: u64,
    staleness_refusals: u64,
    end_time_anomalies: u64,
}

struct CycleOutcome {
    decision: Decision,
    official: Option<OfficialPrice>,
    official_err: &'static str,
    book_top: Option<BookTop>,
    book_err: String,
    signals: Option<SignalOutputs>,
}

impl CycleOutcome {
    fn strategy_error() -> Self {
        Self {
            decision: Decision {
                filter_reason: ReasonCode::StrategyError.as_str().to_string(),
                ..Decision::no_trade(ReasonCode::StrategyError)
            },
            official: None,
            official_err: "",
            book_top: None,
            book_err: String::new(),
            signals: None,
        }
    }
}

pub struct ShadowRunner {
    cfg: RunnerConfig,
    rules: RiskRules,
    thresholds: BookThresholds,
    artifacts: ArtifactsConfig,
    transport: Arc<dyn HttpTransport>,
    strategy: StaleEdgeStrategy,
    order_limiter: RateLimiter,
    cancel_limiter: RateLimiter,
    exposure: ExposureTracker,
    cooldown: CooldownGate,
    prober: ReadinessProber,
    journal: TradeJournal,
    run_id: String,

    market_id: String,
    source: ResolutionSource,
    market_close_ts: Option<f64>,
    market_end_ts_ms: i64,
    start_ms: i64,
    last_official_ok_ms: Option<i64>,
    artifact_rows: VecDeque<JournalRow>,
    last_error: Option<String>,
    last_error_at: Option<String>,
    last_success_at: Option<String>,
    stats: RunStats,
}

impl ShadowRunner {
    pub fn new(
        cfg: RunnerConfig,
        rules: RiskRules,
        thresholds: BookThresholds,
        artifacts: ArtifactsConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        let journal = TradeJournal::new(cfg.output.clone())?;
        let strategy = StaleEdgeStrategy::new(rules.clone());
        let order_limiter = RateLimiter::new(rules.max_orders_per_min);
        let cancel_limiter = RateLimiter::new(rules.max_cancel_replace_per_min);
        let cooldown = CooldownGate::new(rules.cooldown_sec);
        let prober = ReadinessProber::new(transport.clone())
            .with_bearer(std::env::var("CLOB_BEARER_TOKEN").ok().filter(|v| !v.is_empty()));
        let run_id = Utc::now().format("%Y%m%d_%H%M%S").to_string();

        Ok(Self {
            cfg,
            rules,
            thresholds,
            artifacts,
            transport,
            strategy,
            order_limiter,
            cancel_limiter,
            exposure: ExposureTracker::new(),
            cooldown,
            prober,
            journal,
            run_id,
            market_id: String::new(),
            source: ResolutionSource::unknown(),
            market_close_ts: None,
            market_end_ts_ms: 0,
            start_ms: 0,
            last_official_ok_ms: None,
            artifact_rows: VecDeque::new(),
            last_error: None,
            last_error_at: None,
            last_success_at: None,
            stats: RunStats::default(),
        })
    }

    /// Resolve the market and source, then run the shadow loop.
    pub async fn run(&mut self) -> Result<()> {
        self.resolve_market().await?;

        self.start_ms = now_ms();
        self.market_end_ts_ms = if self.cfg.market_end_ts > 0 {
            self.cfg.market_end_ts * 1000
        } else {
            self.start_ms + 60 * 60 * 1000
        };

        let duration = Duration::from_secs(self.cfg.minutes * 60);
        let started = Instant::now();
        let mut interrupted = false;

        info!(
            run_id = %self.run_id,
            venue = %self.cfg.venue,
            market = %self.market_id,
            minutes = self.cfg.minutes,
            "starting shadow run"
        );

        loop {
            let cycle_started = Instant::now();
            let now = now_ms();

            let outcome = match tokio::time::timeout(self.cfg.cycle_budget, self.cycle(now)).await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!(budget_ms = self.cfg.cycle_budget.as_millis() as u64, "cycle overran its budget");
                    CycleOutcome::strategy_error()
                }
            };

            let latency_ms = cycle_started.elapsed().as_millis() as i64;
            self.record_cycle(now, &outcome, latency_ms);

            if self.cfg.once {
                info!("completed single iteration (--once)");
                break;
            }
            if started.elapsed() >= duration {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.cfg.loop_interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, finishing run");
                    interrupted = true;
                }
            }
            if interrupted {
                break;
            }
        }

        self.finish();
        Ok(())
    }

    async fn resolve_market(&mut self) -> Result<()> {
        match self.cfg.venue {
            MarketVenue::Kalshi => {
                let ticker = self
                    .cfg
                    .market_id
                    .clone()
                    .context("a market ticker is required for the kalshi venue")?;
                let base = kalshi_api_base();
                let meta = kalshi::fetch_market(
                    self.transport.as_ref(),
                    &base,
                    &ticker,
                    None,
                    BOOK_TIMEOUT,
                )
                .await
                .with_context(|| format!("fetching market metadata for {ticker}"))?;

                let now_ts = now_ms() as f64 / 1000.0;
                let (eligibility, source) =
                    check_kalshi_eligibility(&meta, now_ts, DEFAULT_CLOSE_BUFFER_SEC);
                if eligibility != Eligibility::Eligible {
                    bail!(
                        "market {ticker} not eligible: {}",
                        eligibility.reason().as_str()
                    );
                }
                self.source = source.unwrap_or_else(ResolutionSource::unknown);
                self.market_close_ts = close_ts_from_metadata(&meta);
                self.market_id = ticker;
            }
            MarketVenue::Polymarket => {
                self.source = parse_rules_text(&self.cfg.rules_text);
                if self.source.is_unknown() {
                    error!("resolution source unknown for rules text");
                }

                if let Some(id) = self.cfg.market_id.clone() {
                    self.market_id = id;
                } else {
                    let selector = CandidateSelector::new(self.transport.clone());
                    let selection = selector.select(&mut self.prober).await;
                    if selection.status != ReadinessStatus::Ready {
                        bail!("no ready candidate: {}", selection.reason.as_str());
                    }
                    info!(
                        market = selection.market_id.as_deref().unwrap_or(""),
                        slug = selection.slug.as_deref().unwrap_or(""),
                        "selected CLOB candidate"
                    );
                    self.market_id = selection
                        .token_id
                        .context("selection returned no token id")?;
                }
            }
        }
        Ok(())
    }

    async fn cycle(&mut self, now: i64) -> CycleOutcome {
        let mut official = None;
        let mut official_err = "";
        if !self.source.is_unknown() {
            match feeds::get_official_price(
                self.transport.as_ref(),
                &self.source.symbol,
                FEED_TIMEOUT,
            )
            .await
            {
                Some(price) => {
                    self.last_official_ok_ms = Some(now);
                    official = Some(price);
                }
                None => {
                    official_err = "FEED_UNAVAILABLE";
                    warn!(symbol = %self.source.symbol, "official feed unavailable");
                }
            }
        }

        let feed_abort = match self.last_official_ok_ms {
            Some(ok_ms) => now - ok_ms > self.rules.feed_stale_abort_sec * 1000,
            None => now - self.start_ms > self.rules.feed_stale_abort_sec * 1000,
        };

        let (book_top, book_err) = self.fetch_book(now).await;

        let decision = if self.source.is_unknown() {
            Decision::no_trade(ReasonCode::ResolutionSourceUnknown)
        } else if feed_abort {
            Decision::no_trade(ReasonCode::FeedStaleAbort)
        } else if let Some(book) = &book_top {
            self.strategy.evaluate(
                &self.market_id,
                official.as_ref().map(|p| p.mid),
                official.as_ref().map(|p| p.venue_ts_ms),
                book,
                self.market_end_ts_ms,
                now,
            )
        } else {
            Decision {
                filter_reason: book_err.clone(),
                ..Decision::no_trade(ReasonCode::BookDataMissing)
            }
        };

        let decision = apply_rate_limits(
            decision,
            now,
            &mut self.order_limiter,
            &mut self.cancel_limiter,
        );
        let decision = apply_exposure_cap(decision, &self.market_id, &mut self.exposure, &self.rules);
        let decision = apply_cooldown(decision, &self.market_id, now, &mut self.cooldown);

        if decision.cancel_all {
            self.exposure.reset_market(&self.market_id);
        }

        // Shadow boundary: hypothetical orders are journaled as WOULD_ENTER.
        let decision = if decision.action == TradeAction::PlaceOrder {
            Decision {
                action: TradeAction::WouldEnter,
                ..decision
            }
        } else {
            decision
        };

        let signals = if self.cfg.signals {
            book_top
                .as_ref()
                .map(|book| run_signals(book, now, self.rules.book_stale_sec * 1000))
        } else {
            None
        };

        CycleOutcome {
            decision,
            official,
            official_err,
            book_top,
            book_err,
            signals,
        }
    }

    async fn fetch_book(&mut self, now: i64) -> (Option<BookTop>, String) {
        match self.cfg.venue {
            MarketVenue::Kalshi => {
                if let Some(close_ts) = self.market_close_ts {
                    if !is_market_open(now as f64 / 1000.0, close_ts, 0.0) {
                        return (None, ReasonCode::MarketClosed.as_str().to_string());
                    }
                }
                let base = kalshi_api_base();
                let vbook = kalshi::fetch_venuebook(
                    self.transport.as_ref(),
                    &base,
                    &self.market_id,
                    None,
                    &self.thresholds,
                    BOOK_TIMEOUT,
                )
                .await;
                if vbook.status == BookStatus::Ok {
                    (BookTop::from_venue_book(&vbook, now), String::new())
                } else {
                    let reason = vbook
                        .fail_reason
                        .map(|r| r.as_str().to_string())
                        .unwrap_or_default();
                    error!(reason = %reason, "kalshi book fetch failed");
                    (None, reason)
                }
            }
            MarketVenue::Polymarket => {
                let vbook = polymarket::fetch_venuebook(
                    self.transport.as_ref(),
                    &self.market_id,
                    &self.thresholds,
                    BOOK_TIMEOUT,
                )
                .await;
                if vbook.status == BookStatus::Ok {
                    (BookTop::from_venue_book(&vbook, now), String::new())
                } else {
                    let reason = vbook
                        .fail_reason
                        .map(|r| r.as_str().to_string())
                        .unwrap_or_default();
                    error!(reason = %reason, "polymarket book fetch failed");
                    (None, reason)
                }
            }
        }
    }

    fn record_cycle(&mut self, now: i64, outcome: &CycleOutcome, latency_ms: i64) {
        let decision = &outcome.decision;

        self.stats.decisions += 1;
        if matches!(
            decision.action,
            TradeAction::WouldEnter | TradeAction::WouldExit
        ) {
            self.stats.would_trade += 1;
            if let Some(edge) = decision.edge_net_bps {
                self.stats.edge_sum += edge;
                self.stats.edge_count += 1;
            }
        }
        if matches!(
            decision.reason,
            ReasonCode::StaleFeed
                | ReasonCode::StaleBook
                | ReasonCode::OfficialFeedMissing
                | ReasonCode::FeedStaleAbort
        ) {
            self.stats.staleness_refusals += 1;
        }
        if decision.reason == ReasonCode::EndTimeAnomaly {
            self.stats.end_time_anomalies += 1;
        }

        let row = self.build_row(now, outcome);

        if let Err(e) = self.journal.record_decision(&row) {
            warn!(error = %e, "journal append failed");
            self.note_error(format!("journal append failed: {e}"));
        }

        self.artifact_rows.push_back(row);
        while self.artifact_rows.len() > self.artifacts.max_rows {
            self.artifact_rows.pop_front();
        }

        self.write_artifacts(outcome, latency_ms, now);
    }

    fn write_artifacts(&mut self, outcome: &CycleOutcome, latency_ms: i64, now: i64) {
        let decision = &outcome.decision;
        let pm_yes_mid = outcome.book_top.as_ref().and_then(|b| {
            match (b.yes_bid, b.yes_ask) {
                (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
                _ => None,
            }
        });

        let summary = ShadowSummary {
            schema_version: recorder::SUMMARY_SCHEMA_VERSION.to_string(),
            mode: recorder::SHADOW_MODE.to_string(),
            last_refresh: Utc::now().to_rfc3339(),
            strategy: "stale_edge".to_string(),
            run_id: self.run_id.clone(),
            market: self.market_id.clone(),
            decision: decision.action.as_str().to_string(),
            reason: decision.reason.as_str().to_string(),
            subreason: decision.filter_reason.clone(),
            edge_bps: decision.edge_net_bps,
            pm_yes_mid,
            fair_yes_prob: decision.fair_up_prob,
            notes: String::new(),
            last_error: self.last_error.clone().unwrap_or_default(),
        };

        let health = ShadowHealth {
            schema_version: recorder::HEALTH_SCHEMA_VERSION.to_string(),
            mode: recorder::SHADOW_MODE.to_string(),
            last_run_at: Utc::now().to_rfc3339(),
            last_success_at: self.last_success_at.clone(),
            last_error_at: self.last_error_at.clone(),
            last_error: self.last_error.clone().unwrap_or_default(),
            last_latency_ms: latency_ms,
            artifacts_written: true,
            journal_rows: self.artifact_rows.len(),
            build: BuildInfo {
                git_sha: None,
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
            uptime_sec: (now - self.start_ms) / 1000,
            schema_mismatch: false,
        };

        let rows: Vec<JournalRow> = self.artifact_rows.iter().cloned().collect();
        match recorder::write_shadow_artifacts(
            &summary,
            &rows,
            &health,
            &self.artifacts.dir,
            self.artifacts.max_rows,
        ) {
            Ok(true) => {
                self.last_success_at = Some(Utc::now().to_rfc3339());
            }
            Ok(false) => {
                warn!("journal schema mismatch; on-disk header preserved");
                self.last_success_at = Some(Utc::now().to_rfc3339());
            }
            Err(e) => {
                warn!(error = %e, "artifact write failed");
                self.note_error(format!("artifact write failed: {e}"));
            }
        }
    }

    fn note_error(&mut self, message: String) {
        self.last_error = Some(message);
        self.last_error_at = Some(Utc::now().to_rfc3339());
    }

    fn build_row(&self, now: i64, outcome: &CycleOutcome) -> JournalRow {
        let decision = &outcome.decision;
        let mut row = JournalRow::new();
        let mut set = |key: &str, value: String| {
            row.insert(key.to_string(), value);
        };

        set("ts", now.to_string());
        set("market_id", self.market_id.clone());
        set("now", now.to_string());
        set("market_end_ts", self.market_end_ts_ms.to_string());
        set("venue", self.cfg.venue.journal_tag().to_string());
        set("symbol", self.market_id.clone());

        set(
            "official_required_venue",
            self.source.venue.as_str().to_string(),
        );
        set(
            "official_used_venue",
            outcome
                .official
                .as_ref()
                .map(|p| p.venue.as_str().to_string())
                .unwrap_or_default(),
        );
        set(
            "official_used_endpoint",
            if outcome.official.is_some() {
                self.source.endpoint_kind.as_str().to_string()
            } else {
                String::new()
            },
        );
        set(
            "official_mid",
            outcome
                .official
                .as_ref()
                .map(|p| p.mid.to_string())
                .unwrap_or_default(),
        );
        set("official_ok", outcome.official.is_some().to_string());
        set("official_err", outcome.official_err.to_string());
        set(
            "official_age_ms",
            outcome
                .official
                .as_ref()
                .map(|p| (now - p.venue_ts_ms).to_string())
                .unwrap_or_default(),
        );

        let book = outcome.book_top.as_ref();
        set("pm_yes_bid", fmt_opt(book.and_then(|b| b.yes_bid)));
        set("pm_yes_ask", fmt_opt(book.and_then(|b| b.yes_ask)));
        set("pm_no_bid", fmt_opt(book.and_then(|b| b.no_bid)));
        set("pm_no_ask", fmt_opt(book.and_then(|b| b.no_ask)));
        set("book_ok", book.is_some().to_string());
        set("book_err", outcome.book_err.clone());
        set(
            "pm_book_age_ms",
            book.map(|b| (now - b.ts_ms).to_string()).unwrap_or_default(),
        );

        set("implied_yes", fmt_opt(decision.implied_yes));
        set("implied_no", fmt_opt(decision.implied_no));
        set("fair_up_prob", fmt_opt(decision.fair_up_prob));
        set("edge_yes", fmt_opt(decision.edge_yes));
        set("edge_no", fmt_opt(decision.edge_no));
        set("edge_gross_bps", fmt_opt(decision.edge_gross_bps));
        set("edge_net_bps", fmt_opt(decision.edge_net_bps));
        set("spread_bps", fmt_opt(decision.spread_bps));
        set("depth_total", fmt_opt(decision.depth_total));

        set(
            "market_class",
            match self.cfg.venue {
                MarketVenue::Kalshi => "KALSHI_PREDICTION".to_string(),
                MarketVenue::Polymarket => "POLYMARKET_BINARY".to_string(),
            },
        );
        set("required_symbol", self.source.symbol.clone());
        set(
            "rules_end_ts",
            self.market_close_ts
                .map(|ts| ts.to_string())
                .unwrap_or_default(),
        );
        set(
            "end_ts_source",
            if self.cfg.market_end_ts > 0 {
                "CLI".to_string()
            } else if self.market_close_ts.is_some() {
                "VENUE".to_string()
            } else {
                "DEFAULT".to_string()
            },
        );

        set("regime", decision.regime.clone());
        set("action", decision.action.as_str().to_string());
        set("reason", decision.reason.as_str().to_string());
        set("filter_reason", decision.filter_reason.clone());
        set(
            "microstructure_flags",
            serde_json::to_string(&decision.microstructure_flags).unwrap_or_else(|_| "[]".into()),
        );

        set("daily_pnl", "0".to_string());
        set("daily_loss", "0".to_string());
        set("total_loss", "0".to_string());
        set("open_markets", self.exposure.open_markets().to_string());
        set("kill_switch", "false".to_string());
        set("params_hash", decision.params_hash.clone());

        if let Some(signals) = &outcome.signals {
            set(
                "signal_book_arbitrage_edge_bps",
                signals.arbitrage.edge_gross_bps.to_string(),
            );
            set(
                "signal_book_arbitrage_reason",
                signals.arbitrage.reason.clone(),
            );
            set(
                "signal_book_arbitrage_confidence",
                signals.arbitrage.confidence.to_string(),
            );
            set(
                "signal_book_staleness_edge_bps",
                signals.staleness.edge_gross_bps.to_string(),
            );
            set(
                "signal_book_staleness_reason",
                signals.staleness.reason.clone(),
            );
            set(
                "signal_book_staleness_confidence",
                signals.staleness.confidence.to_string(),
            );
            set("arb_cost_cents", fmt_opt(signals.arb_cost_cents));
            set("arb_edge_cents", fmt_opt(signals.arb_edge_cents));
        }

        row
    }

    fn finish(&self) {
        let avg_edge = if self.stats.edge_count > 0 {
            self.stats.edge_sum / self.stats.edge_count as f64
        } else {
            0.0
        };
        info!(
            decisions = self.stats.decisions,
            would_trades = self.stats.would_trade,
            avg_edge_bps = %format!("{avg_edge:.1}"),
            staleness_refusals = self.stats.staleness_refusals,
            end_time_anomalies = self.stats.end_time_anomalies,
            "shadow run complete"
        );
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
