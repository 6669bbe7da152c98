//! Typed parameter values and their constraints.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::strings::{format_double, parse_double};

/// Value type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Bool,
    Int,
    Double,
    String,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::Bool => "bool",
            ParamType::Int => "int",
            ParamType::Double => "double",
            ParamType::String => "string",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter class: free value, bounded range or enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamClass {
    Value,
    Range,
    Enum,
}

/// A parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i32),
    Double(f64),
    String(String),
}

impl ParamValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::Bool(_) => ParamType::Bool,
            ParamValue::Int(_) => ParamType::Int,
            ParamValue::Double(_) => ParamType::Double,
            ParamValue::String(_) => ParamType::String,
        }
    }

    /// Parse `text` as a value of type `ty` for the parameter `name`.
    ///
    /// Booleans accept exactly `TRUE`, `true`, `FALSE` and `false`. Numbers
    /// may be surrounded by blanks but must otherwise be complete.
    pub fn parse(ty: ParamType, text: &str, name: &str) -> Result<Self, ConfigError> {
        let mismatch = || ConfigError::TypeMismatch {
            name: name.to_string(),
            value: text.to_string(),
            expected: ty.as_str(),
        };
        match ty {
            ParamType::Bool => match text {
                "TRUE" | "true" => Ok(ParamValue::Bool(true)),
                "FALSE" | "false" => Ok(ParamValue::Bool(false)),
                _ => Err(mismatch()),
            },
            ParamType::Int => text
                .trim()
                .parse::<i32>()
                .map(ParamValue::Int)
                .map_err(|_| mismatch()),
            ParamType::Double => parse_double(text)
                .map(ParamValue::Double)
                .ok_or_else(mismatch),
            ParamType::String => Ok(ParamValue::String(text.to_string())),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            ParamValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view used for range checks
    fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(f64::from(*i)),
            ParamValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Equality used for enumeration membership: doubles compare within 1e-6.
    pub fn matches(&self, other: &ParamValue) -> bool {
        match (self, other) {
            (ParamValue::Double(a), ParamValue::Double(b)) => (a - b).abs() < 1e-6,
            (a, b) => a == b,
        }
    }

    /// JSON form used in parameter dumps and the script bridge protocol
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParamValue::Bool(b) => serde_json::Value::from(*b),
            ParamValue::Int(i) => serde_json::Value::from(*i),
            ParamValue::Double(d) => serde_json::Value::from(*d),
            ParamValue::String(s) => serde_json::Value::from(s.as_str()),
        }
    }

    /// Convert a JSON scalar to a value of type `ty`
    pub fn from_json(ty: ParamType, json: &serde_json::Value) -> Option<Self> {
        match ty {
            ParamType::Bool => json.as_bool().map(ParamValue::Bool),
            ParamType::Int => json
                .as_i64()
                .and_then(|i| i32::try_from(i).ok())
                .map(ParamValue::Int),
            ParamType::Double => json.as_f64().map(ParamValue::Double),
            ParamType::String => json.as_str().map(|s| ParamValue::String(s.to_string())),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(true) => f.write_str("TRUE"),
            ParamValue::Bool(false) => f.write_str("FALSE"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Double(d) => f.write_str(&format_double(*d)),
            ParamValue::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Double(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::String(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::String(v)
    }
}

/// Restriction on the values a parameter may take
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Value,
    Range { min: ParamValue, max: ParamValue },
    Enum(Vec<ParamValue>),
}

impl Constraint {
    pub fn class(&self) -> ParamClass {
        match self {
            Constraint::Value => ParamClass::Value,
            Constraint::Range { .. } => ParamClass::Range,
            Constraint::Enum(_) => ParamClass::Enum,
        }
    }

    /// Check `value` against the constraint of parameter `name`
    pub fn check(&self, name: &str, value: &ParamValue) -> Result<(), ConfigError> {
        match self {
            Constraint::Value => Ok(()),
            Constraint::Range { min, max } => {
                let (Some(v), Some(lo), Some(hi)) =
                    (value.as_number(), min.as_number(), max.as_number())
                else {
                    return Ok(());
                };
                if v < lo || v > hi {
                    return Err(ConfigError::RangeError {
                        name: name.to_string(),
                        kind: value.param_type().as_str(),
                        value: value.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                }
                Ok(())
            }
            Constraint::Enum(choices) => {
                if choices.iter().any(|c| c.matches(value)) {
                    Ok(())
                } else {
                    Err(ConfigError::EnumMismatch {
                        name: name.to_string(),
                        value: value.to_string(),
                        allowed: choices_text(choices),
                    })
                }
            }
        }
    }
}

/// `a | b | c` rendering of enumeration choices
pub fn choices_text(choices: &[ParamValue]) -> String {
    choices
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}
