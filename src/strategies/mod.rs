//! Built-in Strategies
//!
//! Strategies shipped with the engine, constructible by name from run
//! configuration. External code plugs in by implementing
//! `strategy::Strategy` directly.

pub mod sma_cross;

pub use sma_cross::SmaCross;

use crate::strategy::{ParamSpec, Strategy};
use anyhow::{anyhow, Result};

/// Parameter schema and a fresh instance for a built-in strategy name.
pub fn builtin(name: &str) -> Result<(Vec<ParamSpec>, Box<dyn Strategy>)> {
    match name {
        "sma_cross" => Ok((SmaCross::param_specs(), Box::new(SmaCross::new()))),
        other => Err(anyhow!(
            "unknown strategy '{other}' (available: {})",
            builtin_names().join(", ")
        )),
    }
}

/// Names accepted by `builtin`.
pub fn builtin_names() -> Vec<&'static str> {
    vec!["sma_cross"]
}
