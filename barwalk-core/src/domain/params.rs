//! Strategy parameters: typed values, declared ranges, and binding.
//!
//! A `ParameterSet` is produced only by `ParamSchema::bind`, so every set a
//! strategy sees has a value for each declared parameter and every value is
//! inside its declared range.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl ParamValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Declared parameter: default plus inclusive numeric range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: ParamValue,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ParamSpec {
    pub fn int(name: &'static str, default: i64, min: i64, max: i64) -> Self {
        Self {
            name,
            default: ParamValue::Int(default),
            min: Some(min as f64),
            max: Some(max as f64),
        }
    }

    pub fn float(name: &'static str, default: f64, min: f64, max: f64) -> Self {
        Self {
            name,
            default: ParamValue::Float(default),
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn flag(name: &'static str, default: bool) -> Self {
        Self {
            name,
            default: ParamValue::Bool(default),
            min: None,
            max: None,
        }
    }

    /// Coerce and range-check a supplied value against this spec.
    fn accept(&self, value: ParamValue) -> Result<ParamValue, EngineError> {
        let coerced = match (self.default, value) {
            (ParamValue::Bool(_), ParamValue::Bool(_)) => value,
            (ParamValue::Int(_), ParamValue::Int(_)) => value,
            (ParamValue::Float(_), ParamValue::Float(_)) => value,
            (ParamValue::Float(_), ParamValue::Int(v)) => ParamValue::Float(v as f64),
            _ => {
                return Err(EngineError::invalid_parameter(
                    self.name,
                    format!("expected {}, got {}", self.default.kind(), value.kind()),
                ))
            }
        };
        if let Some(v) = coerced.as_f64() {
            if !v.is_finite() {
                return Err(EngineError::invalid_parameter(self.name, "not a finite number"));
            }
            if let Some(min) = self.min {
                if v < min {
                    return Err(EngineError::invalid_parameter(
                        self.name,
                        format!("{v} below minimum {min}"),
                    ));
                }
            }
            if let Some(max) = self.max {
                if v > max {
                    return Err(EngineError::invalid_parameter(
                        self.name,
                        format!("{v} above maximum {max}"),
                    ));
                }
            }
        }
        Ok(coerced)
    }
}

/// Ordered list of declared parameters for one strategy.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ParamSchema {
    pub specs: Vec<ParamSpec>,
}

impl ParamSchema {
    pub fn new(specs: Vec<ParamSpec>) -> Self {
        Self { specs }
    }

    pub fn spec(&self, name: &str) -> Option<&ParamSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn defaults(&self) -> ParameterSet {
        ParameterSet {
            values: self
                .specs
                .iter()
                .map(|s| (s.name.to_string(), s.default))
                .collect(),
        }
    }

    /// Overlay `overrides` onto the defaults.
    pub fn bind(&self, overrides: &BTreeMap<String, ParamValue>) -> Result<ParameterSet, EngineError> {
        let mut set = self.defaults();
        for (name, value) in overrides {
            let spec = self
                .spec(name)
                .ok_or_else(|| EngineError::invalid_parameter(name.clone(), "unknown parameter"))?;
            let accepted = spec.accept(*value)?;
            set.values.insert(name.clone(), accepted);
        }
        Ok(set)
    }
}

/// Bound, immutable parameter values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterSet {
    values: BTreeMap<String, ParamValue>,
}

impl ParameterSet {
    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.values.get(name).copied()
    }

    pub fn get_int(&self, name: &str) -> Result<i64, EngineError> {
        match self.get(name) {
            Some(ParamValue::Int(v)) => Ok(v),
            Some(other) => Err(EngineError::invalid_parameter(
                name,
                format!("expected int, got {}", other.kind()),
            )),
            None => Err(EngineError::invalid_parameter(name, "missing")),
        }
    }

    /// Integer parameter used as a period or count.
    pub fn get_usize(&self, name: &str) -> Result<usize, EngineError> {
        let v = self.get_int(name)?;
        usize::try_from(v).map_err(|_| EngineError::invalid_parameter(name, "must be non-negative"))
    }

    pub fn get_float(&self, name: &str) -> Result<f64, EngineError> {
        match self.get(name) {
            Some(v @ (ParamValue::Float(_) | ParamValue::Int(_))) => {
                v.as_f64().ok_or_else(|| EngineError::invalid_parameter(name, "not numeric"))
            }
            Some(other) => Err(EngineError::invalid_parameter(
                name,
                format!("expected float, got {}", other.kind()),
            )),
            None => Err(EngineError::invalid_parameter(name, "missing")),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, EngineError> {
        match self.get(name) {
            Some(ParamValue::Bool(v)) => Ok(v),
            Some(other) => Err(EngineError::invalid_parameter(
                name,
                format!("expected bool, got {}", other.kind()),
            )),
            None => Err(EngineError::invalid_parameter(name, "missing")),
        }
    }

    pub fn values(&self) -> &BTreeMap<String, ParamValue> {
        &self.values
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.values {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec::int("fast_period", 12, 2, 200),
            ParamSpec::float("stop_atr_mult", 2.0, 0.0, 10.0),
            ParamSpec::flag("allow_pyramid", true),
        ])
    }

    fn overrides(pairs: &[(&str, ParamValue)]) -> BTreeMap<String, ParamValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn bind_fills_defaults() {
        let set = schema().bind(&BTreeMap::new()).unwrap();
        assert_eq!(set.get_int("fast_period").unwrap(), 12);
        assert_eq!(set.get_float("stop_atr_mult").unwrap(), 2.0);
        assert!(set.get_bool("allow_pyramid").unwrap());
    }

    #[test]
    fn bind_rejects_out_of_range() {
        let err = schema()
            .bind(&overrides(&[("fast_period", ParamValue::Int(1))]))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter { ref name, .. } if name == "fast_period"));
    }

    #[test]
    fn bind_rejects_unknown_name() {
        let err = schema()
            .bind(&overrides(&[("slow", ParamValue::Int(5))]))
            .unwrap_err();
        assert_eq!(err.tag(), "invalid_parameter");
    }

    #[test]
    fn bind_rejects_wrong_kind() {
        assert!(schema()
            .bind(&overrides(&[("fast_period", ParamValue::Float(5.5))]))
            .is_err());
        assert!(schema()
            .bind(&overrides(&[("allow_pyramid", ParamValue::Int(1))]))
            .is_err());
    }

    #[test]
    fn float_accepts_integer_literal() {
        let set = schema()
            .bind(&overrides(&[("stop_atr_mult", ParamValue::Int(3))]))
            .unwrap();
        assert_eq!(set.get("stop_atr_mult"), Some(ParamValue::Float(3.0)));
    }

    #[test]
    fn display_is_sorted() {
        let set = schema().bind(&BTreeMap::new()).unwrap();
        assert_eq!(
            set.to_string(),
            "allow_pyramid=true, fast_period=12, stop_atr_mult=2"
        );
    }

    #[test]
    fn untagged_values_deserialize_from_toml_like_json() {
        let parsed: BTreeMap<String, ParamValue> =
            serde_json::from_str(r#"{"a": 3, "b": 1.5, "c": false}"#).unwrap();
        assert_eq!(parsed["a"], ParamValue::Int(3));
        assert_eq!(parsed["b"], ParamValue::Float(1.5));
        assert_eq!(parsed["c"], ParamValue::Bool(false));
    }

    #[test]
    fn schema_serializes_for_reports() {
        let json = serde_json::to_value(schema()).unwrap();
        assert_eq!(json["specs"][0]["name"], "fast_period");
        assert_eq!(json["specs"][0]["default"], 12);
        assert_eq!(json["specs"][2]["min"], serde_json::Value::Null);
    }
}
