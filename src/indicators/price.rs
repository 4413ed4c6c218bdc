//! Identity Indicators
//!
//! Expose a raw bar field as an indicator series so the open/high/low/
//! close/volume history participates in the same read interface as every
//! derived series. Created on the hidden panel by default, so they never
//! appear in the `BarProcessed` mapping.

use crate::engine::events::BarReceived;
use crate::indicators::plot::PlotSpec;
use crate::indicators::{BarField, Indicator};

pub struct PriceIdentity {
    field: BarField,
    plot: PlotSpec,
}

impl PriceIdentity {
    pub fn new(field: BarField) -> Self {
        Self {
            field,
            plot: PlotSpec::hidden(),
        }
    }

    pub fn with_plot(field: BarField, plot: PlotSpec) -> Self {
        Self { field, plot }
    }

    pub fn open() -> Self {
        Self::new(BarField::Open)
    }

    pub fn high() -> Self {
        Self::new(BarField::High)
    }

    pub fn low() -> Self {
        Self::new(BarField::Low)
    }

    pub fn close() -> Self {
        Self::new(BarField::Close)
    }

    pub fn volume() -> Self {
        Self::new(BarField::Volume)
    }

    /// The five identity indicators every strategy gets at construction.
    pub fn ohlcv() -> Vec<Self> {
        vec![
            Self::open(),
            Self::high(),
            Self::low(),
            Self::close(),
            Self::volume(),
        ]
    }
}

impl Indicator for PriceIdentity {
    fn name(&self) -> &str {
        self.field.as_str()
    }

    fn compute(&mut self, bar: &BarReceived) -> f64 {
        self.field.value(bar)
    }

    fn plot(&self) -> PlotSpec {
        self.plot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::BarPeriod;

    #[test]
    fn test_identity_fields() {
        let bar = BarReceived {
            symbol: "AAA".into(),
            period: BarPeriod::Minute,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 42,
            ts_event: 0,
            ts_created: 0,
        };
        assert_eq!(PriceIdentity::open().compute(&bar), 1.0);
        assert_eq!(PriceIdentity::high().compute(&bar), 2.0);
        assert_eq!(PriceIdentity::low().compute(&bar), 0.5);
        assert_eq!(PriceIdentity::close().compute(&bar), 1.5);
        assert_eq!(PriceIdentity::volume().compute(&bar), 42.0);
        assert_eq!(PriceIdentity::close().name(), "CLOSE");
    }

    #[test]
    fn test_ohlcv_set() {
        let names: Vec<String> = PriceIdentity::ohlcv()
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        assert_eq!(names, ["OPEN", "HIGH", "LOW", "CLOSE", "VOLUME"]);
    }
}
