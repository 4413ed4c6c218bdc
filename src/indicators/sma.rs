//! Simple Moving Average

use crate::engine::events::BarReceived;
use crate::indicators::plot::{PlotColor, PlotSpec, PlotStyle, PRICE_PANEL};
use crate::indicators::{BarField, Indicator};
use std::collections::{HashMap, VecDeque};

/// Arithmetic mean of the last `period` values of a bar field. Before
/// `period` values have accumulated, emits the running mean of what exists.
pub struct SimpleMovingAverage {
    name: String,
    period: usize,
    field: BarField,
    windows: HashMap<String, VecDeque<f64>>,
    plot: PlotSpec,
}

impl SimpleMovingAverage {
    pub fn new(period: usize, field: BarField) -> Self {
        assert!(period > 0, "SMA period must be positive");
        Self {
            name: format!("SMA_{}_{}", period, field.as_str()),
            period,
            field,
            windows: HashMap::new(),
            plot: PlotSpec::new(PRICE_PANEL, PlotStyle::Line, PlotColor::Blue),
        }
    }

    pub fn with_plot(mut self, plot: PlotSpec) -> Self {
        self.plot = plot;
        self
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for SimpleMovingAverage {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&mut self, bar: &BarReceived) -> f64 {
        let window = self.windows.entry(bar.symbol.clone()).or_default();
        window.push_back(self.field.value(bar));
        if window.len() > self.period {
            window.pop_front();
        }
        window.iter().sum::<f64>() / window.len() as f64
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
    fn test_running_mean_before_period() {
        let mut sma = SimpleMovingAverage::new(3, BarField::Close);
        assert_eq!(sma.compute(&bar("AAA", 10.0, 1)), 10.0);
        assert_eq!(sma.compute(&bar("AAA", 20.0, 2)), 15.0);
        assert_eq!(sma.compute(&bar("AAA", 30.0, 3)), 20.0);
    }

    #[test]
    fn test_window_slides_at_period() {
        let mut sma = SimpleMovingAverage::new(3, BarField::Close);
        for (i, close) in [10.0, 20.0, 30.0, 40.0].iter().enumerate() {
            sma.compute(&bar("AAA", *close, i as i64));
        }
        // Window now holds 20, 30, 40.
        assert_eq!(sma.compute(&bar("AAA", 50.0, 5)), 40.0);
    }

    #[test]
    fn test_windows_are_per_symbol() {
        let mut sma = SimpleMovingAverage::new(2, BarField::Close);
        sma.compute(&bar("AAA", 10.0, 1));
        assert_eq!(sma.compute(&bar("BBB", 100.0, 1)), 100.0);
        assert_eq!(sma.compute(&bar("AAA", 20.0, 2)), 15.0);
    }

    #[test]
    fn test_name_encodes_configuration() {
        assert_eq!(
            SimpleMovingAverage::new(20, BarField::Close).name(),
            "SMA_20_CLOSE"
        );
        assert_eq!(
            SimpleMovingAverage::new(5, BarField::Volume).name(),
            "SMA_5_VOLUME"
        );
    }
}
