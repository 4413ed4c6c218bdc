//! Relative Strength Index (Wilder)

use crate::engine::events::BarReceived;
use crate::indicators::plot::{PlotColor, PlotSpec, PlotStyle};
use crate::indicators::{BarField, Indicator};
use std::collections::HashMap;

#[derive(Debug, Default)]
struct WilderState {
    prev: Option<f64>,
    avg_gain: f64,
    avg_loss: f64,
}

/// RSI over a configurable period using Wilder's smoothing:
/// `avg_new = (avg_prev * (N - 1) + change) / N` per bar. The first bar of
/// a symbol has no prior value and emits NAN; when the average loss is zero
/// the indicator emits 100.
pub struct RelativeStrengthIndex {
    name: String,
    period: usize,
    field: BarField,
    states: HashMap<String, WilderState>,
    plot: PlotSpec,
}

impl RelativeStrengthIndex {
    pub fn new(period: usize) -> Self {
        Self::with_field(period, BarField::Close)
    }

    pub fn with_field(period: usize, field: BarField) -> Self {
        assert!(period > 0, "RSI period must be positive");
        let name = match field {
            BarField::Close => format!("RSI_{}", period),
            other => format!("RSI_{}_{}", period, other.as_str()),
        };
        Self {
            name,
            period,
            field,
            states: HashMap::new(),
            plot: PlotSpec::new(1, PlotStyle::Line, PlotColor::Purple),
        }
    }

    pub fn with_plot(mut self, plot: PlotSpec) -> Self {
        self.plot = plot;
        self
    }
}

impl Indicator for RelativeStrengthIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&mut self, bar: &BarReceived) -> f64 {
        let value = self.field.value(bar);
        let state = self.states.entry(bar.symbol.clone()).or_default();

        let prev = match state.prev.replace(value) {
            Some(prev) => prev,
            None => return f64::NAN,
        };

        let change = value - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        let n = self.period as f64;
        state.avg_gain = (state.avg_gain * (n - 1.0) + gain) / n;
        state.avg_loss = (state.avg_loss * (n - 1.0) + loss) / n;

        if state.avg_loss == 0.0 {
            return 100.0;
        }
        100.0 - 100.0 / (1.0 + state.avg_gain / state.avg_loss)
    }

    fn plot(&self) -> PlotSpec {
        self.plot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::tests::bar;

    #[test]
    fn test_first_bar_is_nan() {
        let mut rsi = RelativeStrengthIndex::new(14);
        assert!(rsi.compute(&bar("AAA", 100.0, 1)).is_nan());
    }

    #[test]
    fn test_all_equal_inputs_emit_100() {
        let mut rsi = RelativeStrengthIndex::new(14);
        rsi.compute(&bar("AAA", 100.0, 1));
        for ts in 2..10 {
            assert_eq!(rsi.compute(&bar("AAA", 100.0, ts)), 100.0);
        }
    }

    #[test]
    fn test_pure_uptrend_is_100_and_downtick_pulls_below() {
        let mut rsi = RelativeStrengthIndex::new(14);
        rsi.compute(&bar("AAA", 100.0, 1));
        for ts in 2..6 {
            assert_eq!(rsi.compute(&bar("AAA", 100.0 + ts as f64, ts)), 100.0);
        }
        let after_loss = rsi.compute(&bar("AAA", 90.0, 6));
        assert!(after_loss < 100.0);
        assert!(after_loss > 0.0);
    }

    #[test]
    fn test_pure_downtrend_is_zero() {
        let mut rsi = RelativeStrengthIndex::new(14);
        rsi.compute(&bar("AAA", 100.0, 1));
        let mut last = f64::NAN;
        for ts in 2..8 {
            last = rsi.compute(&bar("AAA", 100.0 - ts as f64, ts));
        }
        assert_eq!(last, 0.0);
    }

    #[test]
    fn test_state_is_per_symbol() {
        let mut rsi = RelativeStrengthIndex::new(14);
        rsi.compute(&bar("AAA", 100.0, 1));
        rsi.compute(&bar("AAA", 110.0, 2));
        // A fresh symbol starts from NAN again.
        assert!(rsi.compute(&bar("BBB", 50.0, 2)).is_nan());
    }

    #[test]
    fn test_wilder_recurrence_value() {
        let mut rsi = RelativeStrengthIndex::new(2);
        rsi.compute(&bar("AAA", 10.0, 1));
        // gain 2: avg_gain = 1, avg_loss = 0 -> 100
        assert_eq!(rsi.compute(&bar("AAA", 12.0, 2)), 100.0);
        // loss 1: avg_gain = 0.5, avg_loss = 0.5 -> RSI 50
        let v = rsi.compute(&bar("AAA", 11.0, 3));
        assert!((v - 50.0).abs() < 1e-9);
    }
}
