//! Native argument / result values.
//!
//! The wire only knows JSON, so every number arrives as one JSON number type.
//! `Value` is the in-process form after the codec has restored the declared
//! width, and `ValueKind` is what the dispatcher compares against a task's
//! parameter list.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Runtime type of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F64,
    Str,
    Bool,
    Other,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::I8 => "int8",
            ValueKind::I16 => "int16",
            ValueKind::I32 => "int32",
            ValueKind::I64 => "int64",
            ValueKind::U8 => "uint8",
            ValueKind::U16 => "uint16",
            ValueKind::U32 => "uint32",
            ValueKind::U64 => "uint64",
            ValueKind::F64 => "float64",
            ValueKind::Str => "string",
            ValueKind::Bool => "bool",
            ValueKind::Other => "other",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded argument or a task return value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F64(f64),
    Str(String),
    Bool(bool),
    /// Anything the declared tag could not account for, kept as raw JSON.
    Other(serde_json::Value),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::I8(_) => ValueKind::I8,
            Value::I16(_) => ValueKind::I16,
            Value::I32(_) => ValueKind::I32,
            Value::I64(_) => ValueKind::I64,
            Value::U8(_) => ValueKind::U8,
            Value::U16(_) => ValueKind::U16,
            Value::U32(_) => ValueKind::U32,
            Value::U64(_) => ValueKind::U64,
            Value::F64(_) => ValueKind::F64,
            Value::Str(_) => ValueKind::Str,
            Value::Bool(_) => ValueKind::Bool,
            Value::Other(_) => ValueKind::Other,
        }
    }

    /// JSON form used on the wire. Non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::I8(v) => Json::from(*v),
            Value::I16(v) => Json::from(*v),
            Value::I32(v) => Json::from(*v),
            Value::I64(v) => Json::from(*v),
            Value::U8(v) => Json::from(*v),
            Value::U16(v) => Json::from(*v),
            Value::U32(v) => Json::from(*v),
            Value::U64(v) => Json::from(*v),
            Value::F64(v) => serde_json::Number::from_f64(*v)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Str(v) => Json::String(v.clone()),
            Value::Bool(v) => Json::Bool(*v),
            Value::Other(v) => v.clone(),
        }
    }

    /// Collapse to the canonical result form used for logging and storage.
    pub fn normalize(self) -> NormalizedValue {
        match self {
            Value::I8(v) => NormalizedValue::Int(v.into()),
            Value::I16(v) => NormalizedValue::Int(v.into()),
            Value::I32(v) => NormalizedValue::Int(v.into()),
            Value::I64(v) => NormalizedValue::Int(v),
            Value::U8(v) => NormalizedValue::Int(v.into()),
            Value::U16(v) => NormalizedValue::Int(v.into()),
            Value::U32(v) => NormalizedValue::Int(v.into()),
            // u64 above i64::MAX has no signed form; keep the exact number
            Value::U64(v) => match i64::try_from(v) {
                Ok(v) => NormalizedValue::Int(v),
                Err(_) => NormalizedValue::Opaque(serde_json::Value::from(v)),
            },
            Value::F64(v) => NormalizedValue::Float(v),
            Value::Bool(v) => NormalizedValue::Bool(v),
            Value::Str(v) => NormalizedValue::Opaque(serde_json::Value::String(v)),
            Value::Other(v) => NormalizedValue::Opaque(v),
        }
    }
}

/// Width-independent result value.
///
/// Serialized untagged, so a stored record reads `[5, 2.5, true, "x"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NormalizedValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Opaque(serde_json::Value),
}

impl fmt::Display for NormalizedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedValue::Int(v) => write!(f, "{v}"),
            NormalizedValue::Float(v) => write!(f, "{v}"),
            NormalizedValue::Bool(v) => write!(f, "{v}"),
            NormalizedValue::Opaque(v) => write!(f, "{v}"),
        }
    }
}
