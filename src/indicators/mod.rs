//! Indicator Framework
//!
//! Transforms each incoming bar into one scalar per indicator and keeps a
//! bounded per-symbol history of the results. Reads are random-access with
//! negative indexing and a NAN sentinel outside the populated range.
//!
//! The framework guards only the history buffers; an indicator's internal
//! state (rolling windows, running averages) belongs to the strategy thread
//! that drives `update` and needs no locking.

pub mod bollinger;
pub mod plot;
pub mod price;
pub mod registry;
pub mod rsi;
pub mod sma;

pub use bollinger::{BollingerLower, BollingerUpper};
pub use plot::{encode_key, PlotColor, PlotSpec, PlotStyle, HIDDEN_PANEL, PRICE_PANEL};
pub use price::PriceIdentity;
pub use registry::{create, register, registered_names};
pub use rsi::RelativeStrengthIndex;
pub use sma::SimpleMovingAverage;

use crate::engine::events::BarReceived;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Capacity of each per-symbol history buffer.
pub const HISTORY_CAPACITY: usize = 2048;

/// Which bar field an indicator reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl BarField {
    pub fn value(&self, bar: &BarReceived) -> f64 {
        match self {
            BarField::Open => bar.open,
            BarField::High => bar.high,
            BarField::Low => bar.low,
            BarField::Close => bar.close,
            BarField::Volume => bar.volume as f64,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BarField::Open => "OPEN",
            BarField::High => "HIGH",
            BarField::Low => "LOW",
            BarField::Close => "CLOSE",
            BarField::Volume => "VOLUME",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OPEN" => Some(BarField::Open),
            "HIGH" => Some(BarField::High),
            "LOW" => Some(BarField::Low),
            "CLOSE" => Some(BarField::Close),
            "VOLUME" => Some(BarField::Volume),
            _ => None,
        }
    }
}

/// A concrete indicator: one scalar per bar.
///
/// `compute` is invoked once per accepted bar, always from the owning
/// strategy's worker thread, with bars for any of the strategy's symbols;
/// per-symbol window state keyed by `bar.symbol` is the implementation's
/// concern.
pub trait Indicator: Send {
    /// Canonical identifier encoding type and configuration,
    /// e.g. "SMA_20_CLOSE".
    fn name(&self) -> &str;

    /// Produce the scalar for this bar.
    fn compute(&mut self, bar: &BarReceived) -> f64;

    /// Rendering hints; never affects computation.
    fn plot(&self) -> PlotSpec {
        PlotSpec::default()
    }
}

/// Append-only bounded FIFO of indicator outputs for one symbol.
#[derive(Debug)]
pub struct SeriesBuffer {
    values: VecDeque<f64>,
    capacity: usize,
}

impl SeriesBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Most recently appended value; NAN if empty.
    pub fn latest(&self) -> f64 {
        self.values.back().copied().unwrap_or(f64::NAN)
    }

    /// Negative-indexed read: -1 is the latest, -2 the one before.
    /// Anything outside the populated range (including non-negative
    /// indices) is NAN, never a panic.
    pub fn get(&self, index: i64) -> f64 {
        if index >= 0 {
            return f64::NAN;
        }
        let len = self.values.len() as i64;
        let offset = len + index;
        if offset < 0 {
            return f64::NAN;
        }
        self.values
            .get(offset as usize)
            .copied()
            .unwrap_or(f64::NAN)
    }
}

/// An indicator plus its per-symbol histories. The mutex guards only the
/// buffers: `compute` runs outside it, and concurrent readers (charting,
/// diagnostics) only ever touch the history.
pub struct IndicatorSlot {
    imp: Box<dyn Indicator>,
    name: String,
    plot: PlotSpec,
    histories: Mutex<HashMap<String, SeriesBuffer>>,
}

impl IndicatorSlot {
    pub fn new(imp: Box<dyn Indicator>) -> Self {
        let name = imp.name().to_string();
        let plot = imp.plot();
        Self {
            imp,
            name,
            plot,
            histories: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plot(&self) -> &PlotSpec {
        &self.plot
    }

    /// Key under which this indicator appears in `BarProcessed.indicators`,
    /// or None when it is hidden.
    pub fn encoded_key(&self) -> Option<String> {
        if self.plot.is_hidden() {
            None
        } else {
            Some(encode_key(&self.plot, &self.name))
        }
    }

    /// Compute the scalar for `bar` and append it to the symbol's history.
    /// Returns the computed value.
    pub fn update(&mut self, bar: &BarReceived) -> f64 {
        let value = self.imp.compute(bar);
        let mut histories = self.histories.lock();
        histories
            .entry(bar.symbol.clone())
            .or_insert_with(|| SeriesBuffer::new(HISTORY_CAPACITY))
            .push(value);
        value
    }

    /// Latest value for `symbol`; NAN if nothing recorded yet.
    pub fn latest(&self, symbol: &str) -> f64 {
        let histories = self.histories.lock();
        histories.get(symbol).map(|h| h.latest()).unwrap_or(f64::NAN)
    }

    /// Negative-indexed read for `symbol`; NAN outside the populated range.
    pub fn get(&self, symbol: &str, index: i64) -> f64 {
        let histories = self.histories.lock();
        histories.get(symbol).map(|h| h.get(index)).unwrap_or(f64::NAN)
    }

    /// Populated history length for `symbol`.
    pub fn len(&self, symbol: &str) -> usize {
        let histories = self.histories.lock();
        histories.get(symbol).map(|h| h.len()).unwrap_or(0)
    }
}
