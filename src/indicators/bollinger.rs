//! Bollinger Bands
//!
//! Upper and lower bands are separate indicators sharing the same rolling
//! window semantics as the SMA: `mean ± k · population standard deviation`
//! over the last `period` field values.

use crate::engine::events::BarReceived;
use crate::indicators::plot::{PlotColor, PlotSpec, PlotStyle, PRICE_PANEL};
use crate::indicators::{BarField, Indicator};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Upper,
    Lower,
}

struct BollingerBand {
    name: String,
    period: usize,
    k: f64,
    field: BarField,
    band: Band,
    windows: HashMap<String, VecDeque<f64>>,
    plot: PlotSpec,
}

impl BollingerBand {
    fn new(period: usize, k: f64, field: BarField, band: Band) -> Self {
        assert!(period > 0, "Bollinger period must be positive");
        assert!(k >= 0.0, "Bollinger k must be non-negative");
        let tag = match band {
            Band::Upper => "BOLL_UPPER",
            Band::Lower => "BOLL_LOWER",
        };
        Self {
            name: format!("{}_{}_{}_{}", tag, period, k, field.as_str()),
            period,
            k,
            field,
            band,
            windows: HashMap::new(),
            plot: PlotSpec::new(PRICE_PANEL, PlotStyle::Dash1, PlotColor::Gray),
        }
    }

    fn band_value(&mut self, bar: &BarReceived) -> f64 {
        let window = self.windows.entry(bar.symbol.clone()).or_default();
        window.push_back(self.field.value(bar));
        if window.len() > self.period {
            window.pop_front();
        }
        let n = window.len() as f64;
        let mean = window.iter().sum::<f64>() / n;
        let variance = window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let sigma = variance.sqrt();
        match self.band {
            Band::Upper => mean + self.k * sigma,
            Band::Lower => mean - self.k * sigma,
        }
    }
}

/// `SMA + k·σ` over the rolling window.
pub struct BollingerUpper(BollingerBand);

impl BollingerUpper {
    pub fn new(period: usize, k: f64) -> Self {
        Self(BollingerBand::new(period, k, BarField::Close, Band::Upper))
    }

    pub fn with_field(period: usize, k: f64, field: BarField) -> Self {
        Self(BollingerBand::new(period, k, field, Band::Upper))
    }

    pub fn with_plot(mut self, plot: PlotSpec) -> Self {
        self.0.plot = plot;
        self
    }
}

impl Indicator for BollingerUpper {
    fn name(&self) -> &str {
        &self.0.name
    }

    fn compute(&mut self, bar: &BarReceived) -> f64 {
        self.0.band_value(bar)
    }

    fn plot(&self) -> PlotSpec {
        self.0.plot
    }
}

/// `SMA - k·σ` over the rolling window.
pub struct BollingerLower(BollingerBand);

impl BollingerLower {
    pub fn new(period: usize, k: f64) -> Self {
        Self(BollingerBand::new(period, k, BarField::Close, Band::Lower))
    }

    pub fn with_field(period: usize, k: f64, field: BarField) -> Self {
        Self(BollingerBand::new(period, k, field, Band::Lower))
    }

    pub fn with_plot(mut self, plot: PlotSpec) -> Self {
        self.0.plot = plot;
        self
    }
}

impl Indicator for BollingerLower {
    fn name(&self) -> &str {
        &self.0.name
    }

    fn compute(&mut self, bar: &BarReceived) -> f64 {
        self.0.band_value(bar)
    }

    fn plot(&self) -> PlotSpec {
        self.0.plot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::tests::bar;

    #[test]
    fn test_constant_inputs_collapse_to_mean() {
        let mut upper = BollingerUpper::new(3, 2.0);
        let mut lower = BollingerLower::new(3, 2.0);
        for ts in 0..5 {
            assert_eq!(upper.compute(&bar("AAA", 10.0, ts)), 10.0);
            assert_eq!(lower.compute(&bar("AAA", 10.0, ts)), 10.0);
        }
    }

    #[test]
    fn test_bands_bracket_the_mean() {
        let mut upper = BollingerUpper::new(3, 2.0);
        let mut lower = BollingerLower::new(3, 2.0);
        let closes = [10.0, 12.0, 14.0];
        let mut up = f64::NAN;
        let mut lo = f64::NAN;
        for (ts, close) in closes.iter().enumerate() {
            up = upper.compute(&bar("AAA", *close, ts as i64));
            lo = lower.compute(&bar("AAA", *close, ts as i64));
        }
        // mean 12, population sigma = sqrt(8/3)
        let sigma = (8.0f64 / 3.0).sqrt();
        assert!((up - (12.0 + 2.0 * sigma)).abs() < 1e-9);
        assert!((lo - (12.0 - 2.0 * sigma)).abs() < 1e-9);
    }

    #[test]
    fn test_name_encodes_configuration() {
        assert_eq!(BollingerUpper::new(20, 2.0).name(), "BOLL_UPPER_20_2_CLOSE");
        assert_eq!(
            BollingerLower::with_field(10, 1.5, BarField::High).name(),
            "BOLL_LOWER_10_1.5_HIGH"
        );
    }
}
