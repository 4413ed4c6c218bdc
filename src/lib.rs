//! barflow
//!
//! Core of an event-driven algorithmic-trading engine: an in-process
//! exact-kind event bus with one worker thread per subscriber, a
//! deterministic bar replay protocol, a simulated matching engine, a
//! strategy runtime with an indicator framework, and a durable SQLite run
//! recorder.
//!
//! The central contract: the same `Strategy` implementation runs
//! identically in backtest and live modes. Only the data source and the
//! order-matching subscriber are swapped; the event vocabulary, ordering
//! guarantees, and position semantics stay fixed.

pub mod broker;
pub mod engine;
pub mod indicators;
pub mod orchestrator;
pub mod recorder;
pub mod source;
pub mod strategies;
pub mod strategy;

pub use engine::{Event, EventBus, EventHandler, EventKind, Nanos, Subscriber};
pub use orchestrator::{Orchestrator, RunConfig, RunSummary, StrategyDef};
