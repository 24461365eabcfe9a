//! Document values.
//!
//! Everything a scenario persists, and everything a smart value resolves to,
//! is a [`Value`]: a pure tree of scalars, lists and insertion-ordered maps.
//!
//! Two conventions matter for compatibility with files written by earlier
//! runs:
//! - byte strings are persisted as `"bytes:<base64>"` and decoded on load;
//! - integers are 128-bit so token amounts (`10**24`) survive a round trip.
//!
//! The bytes convention is not reversible for every string: a `Str` that
//! happens to start with `bytes:` followed by valid base64 comes back as
//! `Bytes`. JSON has no NaN or infinity, so non-finite floats cannot be
//! serialized at all.
//!
//! `Display` renders values the way the formula language prints them
//! (`True`, `None`, `1.0`, `['a', 1]`). Splicing a value into surrounding text
//! always goes through `Display`.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use indexmap::IndexMap;
use serde::de::Deserializer;
use serde::ser::{Error as _, SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

/// Insertion-ordered string-keyed mapping.
pub type Map = IndexMap<String, Value>;

/// Prefix marking a persisted byte string. Any persisted string of the form
/// `bytes:<valid base64>` loads as [`Value::Bytes`], including one saved as
/// [`Value::Str`].
pub const BYTES_PREFIX: &str = "bytes:";

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(Map),
}

impl Value {
    pub fn empty_map() -> Self {
        Value::Map(Map::new())
    }

    /// Short lowercase name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Value::List(_) | Value::Map(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Python-style truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    /// Quoted rendering used for values nested inside containers.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => quote_str(s),
            other => other.to_string(),
        }
    }

    /// Convert a JSON tree, decoding `bytes:` strings and keeping integers exact.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                let text = n.to_string();
                match text.parse::<i128>() {
                    Ok(i) => Value::Int(i),
                    Err(_) => Value::Float(
                        n.as_f64()
                            .or_else(|| text.parse::<f64>().ok())
                            .unwrap_or(f64::NAN),
                    ),
                }
            }
            serde_json::Value::String(s) => decode_bytes(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => Value::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn decode_bytes(s: String) -> Value {
    if let Some(encoded) = s.strip_prefix(BYTES_PREFIX) {
        if let Ok(bytes) = BASE64_STANDARD.decode(encoded) {
            return Value::Bytes(bytes);
        }
    }
    Value::Str(s)
}

fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Render a float with the conventions of the formula language:
/// `1.0`, `0.5`, `1e+20`, `1e-05`, `inf`, `nan`.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = f.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{f:e}");
        if let Some((mantissa, exponent)) = formatted.split_once('e') {
            if let Ok(exponent) = exponent.parse::<i32>() {
                let sign = if exponent < 0 { '-' } else { '+' };
                return format!("{mantissa}e{sign}{:02}", exponent.abs());
            }
        }
        return formatted;
    }
    if f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Str(s) => f.write_str(s),
            Value::Bytes(bytes) => {
                f.write_str("b'")?;
                for b in bytes {
                    match b {
                        b'\\' => f.write_str("\\\\")?,
                        b'\'' => f.write_str("\\'")?,
                        0x20..=0x7e => write!(f, "{}", *b as char)?,
                        _ => write!(f, "\\x{b:02x}")?,
                    }
                }
                f.write_str("'")
            }
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&item.repr())?;
                }
                f.write_str("]")
            }
            Value::Map(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", quote_str(k), v.repr())?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => match i64::try_from(*i) {
                Ok(small) => serializer.serialize_i64(small),
                Err(_) => serializer.serialize_i128(*i),
            },
            Value::Float(x) if !x.is_finite() => Err(S::Error::custom(format!(
                "cannot persist non-finite float {}",
                format_float(*x)
            ))),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bytes(bytes) => serializer.serialize_str(&format!(
                "{BYTES_PREFIX}{}",
                BASE64_STANDARD.encode(bytes)
            )),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from_json)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i as i128)
    }
}

impl From<i128> for Value {
    fn from(i: i128) -> Self {
        Value::Int(i)
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        Value::Int(i as i128)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Value::Map(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_follows_formula_conventions() {
        assert_eq!(Value::Null.to_string(), "None");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(Value::Float(1e20).to_string(), "1e+20");
        assert_eq!(Value::Float(1e-5).to_string(), "1e-05");

        let list = Value::List(vec![Value::from("a"), Value::Int(1)]);
        assert_eq!(list.to_string(), "['a', 1]");

        let mut m = Map::new();
        m.insert("k".to_string(), Value::from("it's"));
        assert_eq!(Value::Map(m).to_string(), "{'k': \"it's\"}");
    }

    #[test]
    fn bytes_are_persisted_with_prefix() {
        let value = Value::Bytes(b"hello".to_vec());
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"bytes:aGVsbG8=\"");

        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn large_integers_survive_json() {
        let amount = Value::Int(10i128.pow(24));
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "1000000000000000000000000");

        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }

    #[test]
    fn floats_stay_floats() {
        let back: Value = serde_json::from_str("1.0").unwrap();
        assert_eq!(back, Value::Float(1.0));
    }

    #[test]
    fn maps_keep_insertion_order() {
        let back: Value = serde_json::from_str(r#"{"zeta": 1, "alpha": 2}"#).unwrap();
        let keys: Vec<&str> = back
            .as_map()
            .unwrap()
            .keys()
            .map(|k| k.as_str())
            .collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }
}
