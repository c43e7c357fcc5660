//! Shadow runner entrypoint.
//!
//! Evaluates one market in a loop and journals every hypothetical decision.
//! Never transmits orders.

use clap::Parser;
use shadowbot::config::{env_flag, ArtifactsConfig, BookThresholds, RiskRules};
use shadowbot::runner::{RunnerConfig, ShadowRunner};
use shadowbot::transport::{fixture_transport, HttpTransport, ReqwestTransport};
use shadowbot::types::MarketVenue;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

const DEFAULT_OUTPUT: &str = "data/flight_recorder/stale_edge_decisions.csv";
const CYCLE_BUDGET: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(
    name = "shadowbot",
    version,
    about = "Read-only shadow decision engine for binary prediction markets"
)]
struct Args {
    /// Run duration in minutes
    #[arg(long, default_value_t = 1)]
    minutes: u64,

    /// Seconds to sleep between cycles
    #[arg(long = "loop-interval-sec", default_value_t = 1.0)]
    loop_interval_sec: f64,

    /// Venue to evaluate (kalshi or polymarket)
    #[arg(long, default_value = "polymarket")]
    venue: String,

    /// Market ticker (kalshi)
    #[arg(long)]
    ticker: Option<String>,

    /// Market or YES-token id (polymarket); selector picks one when absent
    #[arg(long = "market-id")]
    market_id: Option<String>,

    /// Market rules text, parsed for the official price source
    #[arg(
        long = "rules-text",
        default_value = "Resolved by Binance BTC/USDT spot price"
    )]
    rules_text: String,

    /// Market end, epoch seconds (0 = one hour from now)
    #[arg(long = "market-end-ts", default_value_t = 0)]
    market_end_ts: i64,

    /// Override taker fee in basis points
    #[arg(long = "taker-fee-bps")]
    taker_fee_bps: Option<f64>,

    /// Override maker fee in basis points
    #[arg(long = "maker-fee-bps")]
    maker_fee_bps: Option<f64>,

    /// Apply simulated fee and slippage costs
    #[arg(long = "sim-costs")]
    sim_costs: bool,

    /// Decision journal CSV path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Enable book signal analysis
    #[arg(long)]
    signals: bool,

    /// Run a single cycle and exit (wins over SHADOW_ONCE)
    #[arg(long)]
    once: bool,
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let Some(venue) = MarketVenue::parse(&args.venue) else {
        eprintln!("error: --venue must be one of: kalshi, polymarket");
        return ExitCode::from(2);
    };

    let market_id = args
        .ticker
        .clone()
        .or_else(|| args.market_id.clone())
        .or_else(|| env_value("SHADOW_RUNNER_TICKER"));
    if venue == MarketVenue::Kalshi && market_id.is_none() {
        eprintln!("error: --ticker required for kalshi");
        return ExitCode::from(2);
    }

    let output = args
        .output
        .clone()
        .or_else(|| env_value("SHADOW_RUNNER_OUTPUT").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    let once = args.once || env_flag("SHADOW_ONCE");

    let mut rules = match RiskRules::from_env() {
        Ok(rules) => rules,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(bps) = args.taker_fee_bps {
        rules.taker_fee_bps = bps;
    }
    if let Some(bps) = args.maker_fee_bps {
        rules.maker_fee_bps = bps;
    }
    if !args.sim_costs {
        rules.taker_fee_bps = 0.0;
        rules.maker_fee_bps = 0.0;
        rules.slippage_bps = 0.0;
    }

    let thresholds = match BookThresholds::from_env() {
        Ok(thresholds) => thresholds,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let artifacts = ArtifactsConfig::from_env(None);

    let transport: Arc<dyn HttpTransport> = if env_flag("POLYMARKET_FIXTURE_MODE") {
        Arc::new(fixture_transport())
    } else {
        match ReqwestTransport::new() {
            Ok(transport) => Arc::new(transport),
            Err(e) => {
                eprintln!("error: {e:#}");
                return ExitCode::FAILURE;
            }
        }
    };

    let cfg = RunnerConfig {
        venue,
        market_id,
        rules_text: args.rules_text.clone(),
        market_end_ts: args.market_end_ts,
        minutes: args.minutes,
        loop_interval: Duration::from_secs_f64(args.loop_interval_sec.max(0.0)),
        once,
        output,
        signals: args.signals,
        cycle_budget: CYCLE_BUDGET,
    };

    let mut runner = match ShadowRunner::new(cfg, rules, thresholds, artifacts, transport) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match runner.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "shadow run failed");
            ExitCode::FAILURE
        }
    }
}
