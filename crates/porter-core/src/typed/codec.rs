//! Argument codec - wire `{value, type}` <-> native [`Value`]
//!
//! JSON has a single number type, so an `int8` that left the producer as `2`
//! may come back from the broker as `2.0`. Decoding narrows such numbers back
//! to the width named by the tag. A fractional number under an integer tag is
//! an upstream encoding bug and is rejected rather than truncated.
//!
//! The codec is pure: `decode(&encode(&decode(a)?))` equals `decode(a)`.

use serde_json::Value as Json;

use crate::domain::{Argument, TypeTag, Value, ValueKind};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("expected a number for `{tag}`, got {found}")]
    NotNumeric { tag: TypeTag, found: Json },

    #[error("fractional value {value} cannot be narrowed to `{tag}`")]
    Fractional { tag: TypeTag, value: f64 },

    #[error("value {value} is out of range for `{tag}`")]
    OutOfRange { tag: TypeTag, value: String },

    #[error("argument {position}: {source}")]
    Argument {
        position: usize,
        #[source]
        source: Box<CodecError>,
    },
}

/// Decode one wire argument into the native value its tag declares.
pub fn decode(arg: &Argument) -> Result<Value, CodecError> {
    let tag = arg.type_tag;
    if tag.is_integer() {
        return narrow(tag, &arg.value);
    }

    let value = match (tag, &arg.value) {
        (TypeTag::Float64, Json::Number(n)) => match n.as_f64() {
            Some(f) => Value::F64(f),
            None => Value::Other(arg.value.clone()),
        },
        (TypeTag::String, Json::String(s)) => Value::Str(s.clone()),
        (TypeTag::Bool, Json::Bool(b)) => Value::Bool(*b),
        // passes through; the dispatcher's kind check decides what to do with it
        _ => Value::Other(arg.value.clone()),
    };
    Ok(value)
}

/// Decode a whole argument list, stopping at the first bad position.
pub fn decode_all(args: &[Argument]) -> Result<Vec<Value>, CodecError> {
    args.iter()
        .enumerate()
        .map(|(position, arg)| {
            decode(arg).map_err(|source| CodecError::Argument {
                position,
                source: Box::new(source),
            })
        })
        .collect()
}

/// Wire form of a native value.
pub fn encode(value: &Value) -> Argument {
    Argument::new(value.to_json(), TypeTag::from(value.kind()))
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        encode(&value)
    }
}

fn narrow(tag: TypeTag, raw: &Json) -> Result<Value, CodecError> {
    let Json::Number(n) = raw else {
        return Err(CodecError::NotNumeric {
            tag,
            found: raw.clone(),
        });
    };

    let wide: i128 = if let Some(i) = n.as_i64() {
        i.into()
    } else if let Some(u) = n.as_u64() {
        u.into()
    } else {
        let f = n.as_f64().unwrap_or(f64::NAN);
        if !f.is_finite() || f.fract() != 0.0 {
            return Err(CodecError::Fractional { tag, value: f });
        }
        // anything this far out is beyond every tag anyway
        if f.abs() >= 2f64.powi(100) {
            return Err(CodecError::OutOfRange {
                tag,
                value: f.to_string(),
            });
        }
        f as i128
    };

    fit(tag, wide)
}

fn fit(tag: TypeTag, wide: i128) -> Result<Value, CodecError> {
    let out_of_range = || CodecError::OutOfRange {
        tag,
        value: wide.to_string(),
    };
    let value = match tag.kind() {
        ValueKind::I8 => Value::I8(i8::try_from(wide).map_err(|_| out_of_range())?),
        ValueKind::I16 => Value::I16(i16::try_from(wide).map_err(|_| out_of_range())?),
        ValueKind::I32 => Value::I32(i32::try_from(wide).map_err(|_| out_of_range())?),
        ValueKind::I64 => Value::I64(i64::try_from(wide).map_err(|_| out_of_range())?),
        ValueKind::U8 => Value::U8(u8::try_from(wide).map_err(|_| out_of_range())?),
        ValueKind::U16 => Value::U16(u16::try_from(wide).map_err(|_| out_of_range())?),
        ValueKind::U32 => Value::U32(u32::try_from(wide).map_err(|_| out_of_range())?),
        ValueKind::U64 => Value::U64(u64::try_from(wide).map_err(|_| out_of_range())?),
        _ => return Err(out_of_range()),
    };
    Ok(value)
}
