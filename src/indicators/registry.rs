//! Indicator Registry
//!
//! Global name -> factory table letting external configuration (the CLI,
//! run parameter files) construct indicators without compile-time knowledge
//! of the concrete types. The built-ins are pre-registered; additional
//! indicator crates call `register` at startup. Names prefixed with an
//! underscore are treated as private and skipped.

use crate::indicators::{
    BarField, BollingerLower, BollingerUpper, Indicator, PriceIdentity, RelativeStrengthIndex,
    SimpleMovingAverage,
};
use anyhow::{anyhow, bail, Context, Result};
use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// String-typed construction parameters, as they arrive from a CLI or a
/// stored run configuration.
pub type IndicatorParams = BTreeMap<String, String>;

pub type IndicatorFactory = fn(&IndicatorParams) -> Result<Box<dyn Indicator>>;

lazy_static! {
    static ref REGISTRY: RwLock<HashMap<String, IndicatorFactory>> = RwLock::new(builtins());
}

fn parse_period(params: &IndicatorParams) -> Result<usize> {
    let raw = params
        .get("period")
        .ok_or_else(|| anyhow!("missing 'period' parameter"))?;
    let period: usize = raw
        .parse()
        .with_context(|| format!("invalid period '{raw}'"))?;
    if period == 0 {
        bail!("period must be positive");
    }
    Ok(period)
}

fn parse_field(params: &IndicatorParams, default: BarField) -> Result<BarField> {
    match params.get("field") {
        None => Ok(default),
        Some(raw) => BarField::parse(raw).ok_or_else(|| anyhow!("unknown bar field '{raw}'")),
    }
}

fn parse_k(params: &IndicatorParams) -> Result<f64> {
    let raw = params.get("k").map(String::as_str).unwrap_or("2.0");
    let k: f64 = raw.parse().with_context(|| format!("invalid k '{raw}'"))?;
    if !(k >= 0.0) {
        bail!("k must be non-negative");
    }
    Ok(k)
}

fn builtins() -> HashMap<String, IndicatorFactory> {
    let mut map: HashMap<String, IndicatorFactory> = HashMap::new();
    map.insert("SMA".into(), |p| {
        Ok(Box::new(SimpleMovingAverage::new(
            parse_period(p)?,
            parse_field(p, BarField::Close)?,
        )))
    });
    map.insert("RSI".into(), |p| {
        Ok(Box::new(RelativeStrengthIndex::with_field(
            parse_period(p)?,
            parse_field(p, BarField::Close)?,
        )))
    });
    map.insert("BOLL_UPPER".into(), |p| {
        Ok(Box::new(BollingerUpper::with_field(
            parse_period(p)?,
            parse_k(p)?,
            parse_field(p, BarField::Close)?,
        )))
    });
    map.insert("BOLL_LOWER".into(), |p| {
        Ok(Box::new(BollingerLower::with_field(
            parse_period(p)?,
            parse_k(p)?,
            parse_field(p, BarField::Close)?,
        )))
    });
    map.insert("OPEN".into(), |_| Ok(Box::new(PriceIdentity::open())));
    map.insert("HIGH".into(), |_| Ok(Box::new(PriceIdentity::high())));
    map.insert("LOW".into(), |_| Ok(Box::new(PriceIdentity::low())));
    map.insert("CLOSE".into(), |_| Ok(Box::new(PriceIdentity::close())));
    map.insert("VOLUME".into(), |_| Ok(Box::new(PriceIdentity::volume())));
    map
}

/// Register a factory under `name`. Underscore-prefixed names are private
/// and silently skipped. Re-registering a name replaces the factory.
pub fn register(name: &str, factory: IndicatorFactory) {
    if name.starts_with('_') {
        return;
    }
    REGISTRY.write().insert(name.to_string(), factory);
}

/// Construct an indicator by registered name.
pub fn create(name: &str, params: &IndicatorParams) -> Result<Box<dyn Indicator>> {
    let factory = {
        let registry = REGISTRY.read();
        registry
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("unknown indicator '{name}'"))?
    };
    factory(params).with_context(|| format!("constructing indicator '{name}'"))
}

/// Names currently registered, sorted.
pub fn registered_names() -> Vec<String> {
    let mut names: Vec<String> = REGISTRY.read().keys().cloned().collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> IndicatorParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_create_builtins() {
        let sma = create("SMA", &params(&[("period", "20")])).unwrap();
        assert_eq!(sma.name(), "SMA_20_CLOSE");

        let rsi = create("RSI", &params(&[("period", "14")])).unwrap();
        assert_eq!(rsi.name(), "RSI_14");

        let upper = create("BOLL_UPPER", &params(&[("period", "20"), ("k", "2.0")])).unwrap();
        assert_eq!(upper.name(), "BOLL_UPPER_20_2_CLOSE");
    }

    #[test]
    fn test_create_rejects_bad_params() {
        assert!(create("SMA", &params(&[])).is_err());
        assert!(create("SMA", &params(&[("period", "0")])).is_err());
        assert!(create("SMA", &params(&[("period", "x")])).is_err());
        assert!(create("SMA", &params(&[("period", "5"), ("field", "NOPE")])).is_err());
        assert!(create("NO_SUCH", &params(&[])).is_err());
    }

    #[test]
    fn test_underscore_names_are_private() {
        register("_hidden", |_| Ok(Box::new(PriceIdentity::close())));
        assert!(create("_hidden", &IndicatorParams::new()).is_err());
        assert!(!registered_names().contains(&"_hidden".to_string()));
    }

    #[test]
    fn test_registered_names_include_builtins() {
        let names = registered_names();
        for expected in ["SMA", "RSI", "BOLL_UPPER", "BOLL_LOWER", "CLOSE"] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }
}
