//! Strategy Parameters
//!
//! A strategy publishes its parameter schema as data so external tooling
//! (run configuration UIs, the CLI) can introspect and override without
//! runtime attribute discovery. Resolution happens once at construction:
//! defaults overlaid with overrides, validated against the descriptors.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameter value kinds understood by the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    Float,
    Int,
    Bool,
    Text,
}

/// A resolved parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Bool(_) => ParamKind::Bool,
            ParamValue::Text(_) => ParamKind::Text,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// Descriptor for one strategy parameter, exposed for introspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub default: ParamValue,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub choices: Option<Vec<String>>,
}

impl ParamSpec {
    pub fn float(name: &str, default: f64) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Float,
            default: ParamValue::Float(default),
            min: None,
            max: None,
            step: None,
            choices: None,
        }
    }

    pub fn int(name: &str, default: i64) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Int,
            default: ParamValue::Int(default),
            min: None,
            max: None,
            step: None,
            choices: None,
        }
    }

    pub fn bool(name: &str, default: bool) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Bool,
            default: ParamValue::Bool(default),
            min: None,
            max: None,
            step: None,
            choices: None,
        }
    }

    pub fn text(name: &str, default: &str) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Text,
            default: ParamValue::Text(default.into()),
            min: None,
            max: None,
            step: None,
            choices: None,
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.choices = Some(choices.iter().map(|c| c.to_string()).collect());
        self
    }

    fn parse_override(&self, raw: &str) -> Result<ParamValue> {
        let value = match self.kind {
            ParamKind::Float => ParamValue::Float(
                raw.parse::<f64>()
                    .with_context(|| format!("parameter '{}': invalid float '{raw}'", self.name))?,
            ),
            ParamKind::Int => ParamValue::Int(
                raw.parse::<i64>()
                    .with_context(|| format!("parameter '{}': invalid int '{raw}'", self.name))?,
            ),
            ParamKind::Bool => ParamValue::Bool(
                raw.parse::<bool>()
                    .with_context(|| format!("parameter '{}': invalid bool '{raw}'", self.name))?,
            ),
            ParamKind::Text => ParamValue::Text(raw.to_string()),
        };
        self.validate(&value)?;
        Ok(value)
    }

    fn validate(&self, value: &ParamValue) -> Result<()> {
        if let Some(v) = value.as_f64() {
            if let Some(min) = self.min {
                if v < min {
                    bail!("parameter '{}': {v} below minimum {min}", self.name);
                }
            }
            if let Some(max) = self.max {
                if v > max {
                    bail!("parameter '{}': {v} above maximum {max}", self.name);
                }
            }
        }
        if let (Some(choices), Some(text)) = (&self.choices, value.as_str()) {
            if !choices.iter().any(|c| c == text) {
                bail!(
                    "parameter '{}': '{text}' not one of {choices:?}",
                    self.name
                );
            }
        }
        Ok(())
    }
}

/// Resolved parameter values for one strategy instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyParams {
    values: BTreeMap<String, ParamValue>,
}

impl StrategyParams {
    /// Defaults overlaid with overrides. Unknown override names and values
    /// that fail the descriptor's validation are construction errors.
    pub fn resolve(specs: &[ParamSpec], overrides: &BTreeMap<String, String>) -> Result<Self> {
        let mut values = BTreeMap::new();
        for spec in specs {
            spec.validate(&spec.default)
                .with_context(|| format!("default for parameter '{}'", spec.name))?;
            values.insert(spec.name.clone(), spec.default.clone());
        }
        for (name, raw) in overrides {
            let spec = specs
                .iter()
                .find(|s| &s.name == name)
                .ok_or_else(|| anyhow!("unknown parameter override '{name}'"))?;
            values.insert(name.clone(), spec.parse_override(raw)?);
        }
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(ParamValue::as_f64)
    }

    pub fn f64_or(&self, name: &str, default: f64) -> f64 {
        self.f64(name).unwrap_or(default)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(ParamValue::as_i64)
    }

    pub fn i64_or(&self, name: &str, default: i64) -> i64 {
        self.i64(name).unwrap_or(default)
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.values
            .get(name)
            .and_then(ParamValue::as_bool)
            .unwrap_or(default)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(ParamValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::int("fast", 10).with_range(1.0, 100.0),
            ParamSpec::int("slow", 30).with_range(1.0, 500.0),
            ParamSpec::float("size", 1.0),
            ParamSpec::text("mode", "long_only").with_choices(&["long_only", "both"]),
        ]
    }

    #[test]
    fn test_defaults() {
        let params = StrategyParams::resolve(&specs(), &BTreeMap::new()).unwrap();
        assert_eq!(params.i64("fast"), Some(10));
        assert_eq!(params.f64("size"), Some(1.0));
        assert_eq!(params.text("mode"), Some("long_only"));
    }

    #[test]
    fn test_overrides_applied_and_validated() {
        let params =
            StrategyParams::resolve(&specs(), &overrides(&[("fast", "5"), ("mode", "both")]))
                .unwrap();
        assert_eq!(params.i64("fast"), Some(5));
        assert_eq!(params.text("mode"), Some("both"));

        assert!(StrategyParams::resolve(&specs(), &overrides(&[("fast", "0")])).is_err());
        assert!(StrategyParams::resolve(&specs(), &overrides(&[("fast", "abc")])).is_err());
        assert!(StrategyParams::resolve(&specs(), &overrides(&[("mode", "short")])).is_err());
        assert!(StrategyParams::resolve(&specs(), &overrides(&[("nope", "1")])).is_err());
    }
}
