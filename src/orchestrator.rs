//! Run Orchestrator
//!
//! Assembles one run, executes it to completion, and tears it down. The
//! construction order matters: the recorder subscribes before anything
//! else exists so it observes every event later components emit, and it is
//! shut down last so the tail of the trace (and the final `runs` status)
//! is durable.

use crate::broker::{SimBroker, SimBrokerConfig};
use crate::engine::bus::EventBus;
use crate::engine::events::BarPeriod;
use crate::engine::subscriber::Subscriber;
use crate::engine::time::{now_ns, Nanos};
use crate::recorder::{RunRecord, RunRecorder, RunStatus, RunStore};
use crate::source::{ReplaySource, SourceStore};
use crate::strategy::{Strategy, StrategyConfig, StrategyRunner};
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Everything a run needs besides the strategies themselves.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub name: String,
    pub source_db: String,
    pub results_db: String,
    pub symbols: Vec<String>,
    pub period: BarPeriod,
    pub start: Nanos,
    pub end: Nanos,
    pub broker: SimBrokerConfig,
    pub metadata: serde_json::Value,
}

/// One strategy to mount on the run.
pub struct StrategyDef {
    pub config: StrategyConfig,
    pub overrides: BTreeMap<String, String>,
    pub logic: Box<dyn Strategy>,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub bars_published: u64,
    pub status: RunStatus,
}

pub struct Orchestrator {
    config: RunConfig,
    strategies: Vec<StrategyDef>,
    stop: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(config: RunConfig, strategies: Vec<StrategyDef>) -> Self {
        Self {
            config,
            strategies,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle an external holder can use to end the run between timestamp
    /// groups; the in-flight group always completes.
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn build_run_id(&self) -> String {
        let names: Vec<&str> = self
            .strategies
            .iter()
            .map(|s| s.config.name.as_str())
            .collect();
        format!(
            "{}_{}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S"),
            names.join("-")
        )
    }

    fn run_config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.config.name,
            "source_db": self.config.source_db,
            "symbols": self.config.symbols,
            "period": self.config.period.as_str(),
            "start": self.config.start,
            "end": self.config.end,
            "broker": {
                "commission_per_unit": self.config.broker.commission_per_unit,
                "min_commission": self.config.broker.min_commission,
                "exchange": self.config.broker.exchange,
                "time_in_force": self.config.broker.time_in_force,
            },
            "strategies": self
                .strategies
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "name": s.config.name,
                        "symbols": s.config.symbols,
                        "period": s.config.period.as_str(),
                        "params": s.config.params,
                        "overrides": s.overrides,
                    })
                })
                .collect::<Vec<_>>(),
        })
    }

    /// Execute the run to completion. Construction order, replay, and the
    /// reverse-order teardown all live here.
    pub fn run(self) -> Result<RunSummary> {
        if self.strategies.is_empty() {
            return Err(anyhow!("a run needs at least one strategy"));
        }
        let run_id = self.build_run_id();
        let config_json = self.run_config_json();
        info!(run_id = %run_id, "assembling run");

        // Bus first, then the recorder before anything that can emit.
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(
            RunStore::open(&self.config.results_db).context("opening run results store")?,
        );
        let recorder = Subscriber::spawn(Box::new(RunRecorder::new(Arc::clone(&store), &run_id)));
        bus.subscribe_all(&RunRecorder::subscriptions(), &recorder);

        // Matching engine. Subscribed to bars before any strategy: publish
        // enqueues in subscription order, so the broker holds each bar
        // before a strategy can react to it, which is what keeps a MARKET
        // order off its own submission bar.
        let broker = Subscriber::spawn(Box::new(SimBroker::new(
            self.config.broker.clone(),
            Arc::clone(&bus),
        )));
        bus.subscribe_all(&SimBroker::subscriptions(), &broker);

        // Strategies.
        let mut strategy_subs = Vec::new();
        for def in self.strategies {
            let runner =
                StrategyRunner::new(def.config, &def.overrides, def.logic, Arc::clone(&bus))
                    .context("constructing strategy")?;
            let sub = Subscriber::spawn(Box::new(runner));
            bus.subscribe_all(&StrategyRunner::subscriptions(), &sub);
            strategy_subs.push(sub);
        }

        // Data source: resolve the universe up front so a bad symbol fails
        // the run before anything is recorded.
        let setup = || -> Result<Vec<crate::engine::events::BarReceived>> {
            let source =
                SourceStore::open(&self.config.source_db).context("opening source store")?;
            let bars = source
                .load_bars(
                    &self.config.symbols,
                    self.config.period,
                    self.config.start,
                    self.config.end,
                )
                .context("loading source bars")?;
            store.insert_run(&RunRecord {
                run_id: run_id.clone(),
                name: self.config.name.clone(),
                ts_start: now_ns(),
                ts_end: None,
                status: RunStatus::Running,
                config: config_json,
                metadata: self.config.metadata.clone(),
            })?;
            Ok(bars)
        };
        let bars = match setup() {
            Ok(bars) => bars,
            Err(err) => {
                // Nothing replayed; tear the workers down before surfacing.
                broker.shutdown();
                for sub in &strategy_subs {
                    sub.shutdown();
                }
                recorder.shutdown();
                return Err(err);
            }
        };

        // Replay on the source's own thread.
        let replay = ReplaySource::new(Arc::clone(&bus), bars, Arc::clone(&self.stop));
        let replay_thread = std::thread::Builder::new()
            .name("replay_source".into())
            .spawn(move || replay.run())
            .context("spawning replay thread")?;

        let replay_result = replay_thread.join();
        bus.wait_until_system_idle();

        let (bars_published, status) = match replay_result {
            Ok(published) => {
                let status = if self.stop.load(Ordering::Acquire) {
                    RunStatus::Cancelled
                } else {
                    RunStatus::Completed
                };
                (published, status)
            }
            Err(_) => {
                error!(run_id = %run_id, "replay thread panicked");
                (0, RunStatus::Failed)
            }
        };
        let status_write = store.update_run_status(&run_id, status, Some(now_ns()));

        // Teardown in reverse dependency order; the recorder goes last so
        // it observes every tail event before its final flush.
        broker.shutdown();
        for sub in &strategy_subs {
            sub.shutdown();
        }
        recorder.shutdown();
        status_write?;

        info!(
            run_id = %run_id,
            bars = bars_published,
            status = status.as_str(),
            "run finished"
        );
        Ok(RunSummary {
            run_id,
            bars_published,
            status,
        })
    }
}
