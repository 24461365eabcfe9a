use std::fmt;
use std::str::FromStr;

use ledgerops_store::{Map, Value};
use serde::{Deserialize, Serialize};

/// Type requested for a resolved smart value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Keep the value as stored.
    #[default]
    Any,
    Int,
    Float,
    Str,
    Bool,
    Bytes,
    List,
    Map,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Any => "any",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Str => "str",
            ValueType::Bool => "bool",
            ValueType::Bytes => "bytes",
            ValueType::List => "list",
            ValueType::Map => "map",
        }
    }

    /// Convert `value`, never truncating. The error is a human readable reason.
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        match self {
            ValueType::Any => Ok(value),
            ValueType::Int => to_int(value),
            ValueType::Float => to_float(value),
            ValueType::Str => Ok(match value {
                Value::Str(s) => Value::Str(s),
                other => Value::Str(other.to_string()),
            }),
            ValueType::Bool => to_bool(value),
            ValueType::Bytes => to_bytes(value),
            ValueType::List => match value {
                Value::List(items) => Ok(Value::List(items)),
                Value::Map(m) => Ok(Value::List(m.into_keys().map(Value::Str).collect())),
                other => Err(format!("{} is not a list", other.kind())),
            },
            ValueType::Map => to_map(value),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(ValueType::Any),
            "int" => Ok(ValueType::Int),
            "float" => Ok(ValueType::Float),
            "str" => Ok(ValueType::Str),
            "bool" => Ok(ValueType::Bool),
            "bytes" => Ok(ValueType::Bytes),
            "list" => Ok(ValueType::List),
            "map" | "dict" => Ok(ValueType::Map),
            other => Err(format!("unknown value type `{other}`")),
        }
    }
}

fn to_int(value: Value) -> Result<Value, String> {
    match value {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Bool(b) => Ok(Value::Int(i128::from(b))),
        Value::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e38 => {
            Ok(Value::Int(f as i128))
        }
        Value::Float(f) => Err(format!(
            "{} is not a whole number",
            ledgerops_store::value::format_float(f)
        )),
        Value::Str(s) => s
            .trim()
            .replace('_', "")
            .parse::<i128>()
            .map(Value::Int)
            .map_err(|_| format!("'{s}' is not an integer")),
        other => Err(format!("{} cannot be an integer", other.kind())),
    }
}

fn to_float(value: Value) -> Result<Value, String> {
    match value {
        Value::Float(f) => Ok(Value::Float(f)),
        Value::Int(i) => Ok(Value::Float(i as f64)),
        Value::Bool(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("'{s}' is not a number")),
        other => Err(format!("{} cannot be a float", other.kind())),
    }
}

fn to_bool(value: Value) -> Result<Value, String> {
    match value {
        Value::Bool(b) => Ok(Value::Bool(b)),
        Value::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "" => Ok(Value::Bool(false)),
            _ => Err(format!("'{s}' is not a boolean")),
        },
        other @ (Value::Null | Value::Int(_) | Value::Float(_)) => Ok(Value::Bool(other.truthy())),
        other => Err(format!("{} cannot be a boolean", other.kind())),
    }
}

fn to_bytes(value: Value) -> Result<Value, String> {
    match value {
        Value::Bytes(b) => Ok(Value::Bytes(b)),
        Value::Str(s) => match s.strip_prefix("0x") {
            Some(digits) => hex::decode(digits)
                .map(Value::Bytes)
                .map_err(|e| format!("'{s}' is not valid hex: {e}")),
            None => Ok(Value::Bytes(s.into_bytes())),
        },
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::Int(i) => u8::try_from(*i).map_err(|_| format!("{i} is not a byte")),
                other => Err(format!("{} is not a byte", other.kind())),
            })
            .collect::<Result<Vec<u8>, String>>()
            .map(Value::Bytes),
        other => Err(format!("{} cannot be bytes", other.kind())),
    }
}

/// Maps pass through; lists of `[key, value]` pairs become maps.
fn to_map(value: Value) -> Result<Value, String> {
    match value {
        Value::Map(m) => Ok(Value::Map(m)),
        Value::List(items) => {
            let mut map = Map::new();
            for item in items {
                match item {
                    Value::List(pair) if pair.len() == 2 => {
                        let mut pair = pair.into_iter();
                        let (Some(k), Some(v)) = (pair.next(), pair.next()) else {
                            return Err("malformed pair".to_string());
                        };
                        let key = match k {
                            Value::Str(s) => s,
                            other => other.to_string(),
                        };
                        map.insert(key, v);
                    }
                    other => return Err(format!("{} is not a [key, value] pair", other.kind())),
                }
            }
            Ok(Value::Map(map))
        }
        other => Err(format!("{} is not a map", other.kind())),
    }
}
