//! barflow CLI
//!
//! Runs one backtest from the command line: a source database, a results
//! database, a universe, a date range, and a built-in strategy with
//! parameter overrides.

use anyhow::{anyhow, Context, Result};
use barflow::broker::SimBrokerConfig;
use barflow::engine::events::BarPeriod;
use barflow::engine::time::parse_timestamp;
use barflow::orchestrator::{Orchestrator, RunConfig, StrategyDef};
use barflow::strategies;
use barflow::strategy::StrategyConfig;
use clap::Parser;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "barflow")]
#[command(about = "Deterministic bar-replay backtests over an event bus")]
struct Args {
    /// Path to the source OHLCV database
    #[arg(long, env = "BARFLOW_SOURCE_DB")]
    source_db: String,

    /// Path to the run-results database (created if missing)
    #[arg(long, env = "BARFLOW_RESULTS_DB", default_value = "runs.db")]
    results_db: String,

    /// Symbols to replay (repeatable)
    #[arg(long = "symbol", required = true)]
    symbols: Vec<String>,

    /// Bar period: second, minute, hour, day, week
    #[arg(long, default_value = "minute")]
    period: String,

    /// Replay range start (RFC 3339, inclusive)
    #[arg(long)]
    start: String,

    /// Replay range end (RFC 3339, exclusive)
    #[arg(long)]
    end: String,

    /// Built-in strategy to run
    #[arg(long, default_value = "sma_cross")]
    strategy: String,

    /// Strategy parameter override NAME=VALUE (repeatable)
    #[arg(long = "param")]
    params: Vec<String>,

    /// Commission charged per unit of quantity
    #[arg(long, default_value_t = 0.005)]
    commission_per_unit: f64,

    /// Floor commission per order
    #[arg(long, default_value_t = 1.0)]
    min_commission: f64,

    /// Exchange identifier stamped on fills
    #[arg(long, default_value = "SIM")]
    exchange: String,

    /// Optional run name; defaults to the strategy name
    #[arg(long)]
    name: Option<String>,
}

fn parse_period(s: &str) -> Result<BarPeriod> {
    match s.to_lowercase().as_str() {
        "second" => Ok(BarPeriod::Second),
        "minute" => Ok(BarPeriod::Minute),
        "hour" => Ok(BarPeriod::Hour),
        "day" => Ok(BarPeriod::Day),
        "week" => Ok(BarPeriod::Week),
        other => Err(anyhow!("unknown bar period '{other}'")),
    }
}

fn parse_overrides(raw: &[String]) -> Result<BTreeMap<String, String>> {
    let mut overrides = BTreeMap::new();
    for pair in raw {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("parameter override '{pair}' is not NAME=VALUE"))?;
        overrides.insert(name.to_string(), value.to_string());
    }
    Ok(overrides)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("barflow=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let period = parse_period(&args.period)?;
    let start = parse_timestamp(&args.start)
        .ok_or_else(|| anyhow!("--start '{}' is not RFC 3339", args.start))?;
    let end = parse_timestamp(&args.end)
        .ok_or_else(|| anyhow!("--end '{}' is not RFC 3339", args.end))?;
    if end <= start {
        return Err(anyhow!("--end must be after --start"));
    }
    let overrides = parse_overrides(&args.params)?;

    let (param_specs, logic) = strategies::builtin(&args.strategy)?;
    let symbols: Vec<&str> = args.symbols.iter().map(String::as_str).collect();
    let strategy_config =
        StrategyConfig::new(&args.strategy, &symbols, period).with_params(param_specs);

    let run = RunConfig {
        name: args.name.unwrap_or_else(|| args.strategy.clone()),
        source_db: args.source_db,
        results_db: args.results_db,
        symbols: args.symbols.clone(),
        period,
        start,
        end,
        broker: SimBrokerConfig {
            commission_per_unit: args.commission_per_unit,
            min_commission: args.min_commission,
            exchange: args.exchange,
            time_in_force: None,
        },
        metadata: serde_json::json!({ "invoked": "cli" }),
    };

    let orchestrator = Orchestrator::new(
        run,
        vec![StrategyDef {
            config: strategy_config,
            overrides,
            logic,
        }],
    );
    let summary = orchestrator.run().context("run failed")?;
    info!(
        run_id = %summary.run_id,
        bars = summary.bars_published,
        status = summary.status.as_str(),
        "backtest finished"
    );
    println!("{} {}", summary.run_id, summary.status.as_str());
    Ok(())
}
