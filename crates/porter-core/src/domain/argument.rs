//! Wire-level arguments: a JSON value plus the type tag the producer declared.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::ValueKind;

/// Wire tag naming the native type of an argument.
///
/// Unknown or missing tags decode as [`TypeTag::Other`] instead of failing
/// the whole job body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TypeTag {
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float64,
    String,
    Bool,
    #[default]
    Other,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Int => "int",
            TypeTag::Int8 => "int8",
            TypeTag::Int16 => "int16",
            TypeTag::Int32 => "int32",
            TypeTag::Int64 => "int64",
            TypeTag::Uint => "uint",
            TypeTag::Uint8 => "uint8",
            TypeTag::Uint16 => "uint16",
            TypeTag::Uint32 => "uint32",
            TypeTag::Uint64 => "uint64",
            TypeTag::Float64 => "float64",
            TypeTag::String => "string",
            TypeTag::Bool => "bool",
            TypeTag::Other => "other",
        }
    }

    /// The native kind a value under this tag decodes to.
    /// `int` / `uint` are the platform-width aliases (64-bit).
    pub fn kind(&self) -> ValueKind {
        match self {
            TypeTag::Int8 => ValueKind::I8,
            TypeTag::Int16 => ValueKind::I16,
            TypeTag::Int32 => ValueKind::I32,
            TypeTag::Int | TypeTag::Int64 => ValueKind::I64,
            TypeTag::Uint8 => ValueKind::U8,
            TypeTag::Uint16 => ValueKind::U16,
            TypeTag::Uint32 => ValueKind::U32,
            TypeTag::Uint | TypeTag::Uint64 => ValueKind::U64,
            TypeTag::Float64 => ValueKind::F64,
            TypeTag::String => ValueKind::Str,
            TypeTag::Bool => ValueKind::Bool,
            TypeTag::Other => ValueKind::Other,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.kind(),
            ValueKind::I8
                | ValueKind::I16
                | ValueKind::I32
                | ValueKind::I64
                | ValueKind::U8
                | ValueKind::U16
                | ValueKind::U32
                | ValueKind::U64
        )
    }
}

impl From<ValueKind> for TypeTag {
    fn from(kind: ValueKind) -> Self {
        match kind {
            ValueKind::I8 => TypeTag::Int8,
            ValueKind::I16 => TypeTag::Int16,
            ValueKind::I32 => TypeTag::Int32,
            ValueKind::I64 => TypeTag::Int64,
            ValueKind::U8 => TypeTag::Uint8,
            ValueKind::U16 => TypeTag::Uint16,
            ValueKind::U32 => TypeTag::Uint32,
            ValueKind::U64 => TypeTag::Uint64,
            ValueKind::F64 => TypeTag::Float64,
            ValueKind::Str => TypeTag::String,
            ValueKind::Bool => TypeTag::Bool,
            ValueKind::Other => TypeTag::Other,
        }
    }
}

impl From<&str> for TypeTag {
    fn from(s: &str) -> Self {
        match s {
            "int" => TypeTag::Int,
            "int8" => TypeTag::Int8,
            "int16" => TypeTag::Int16,
            "int32" => TypeTag::Int32,
            "int64" => TypeTag::Int64,
            "uint" => TypeTag::Uint,
            "uint8" => TypeTag::Uint8,
            "uint16" => TypeTag::Uint16,
            "uint32" => TypeTag::Uint32,
            "uint64" => TypeTag::Uint64,
            "float64" => TypeTag::Float64,
            "string" => TypeTag::String,
            "bool" => TypeTag::Bool,
            _ => TypeTag::Other,
        }
    }
}

impl From<String> for TypeTag {
    fn from(s: String) -> Self {
        TypeTag::from(s.as_str())
    }
}

impl From<TypeTag> for String {
    fn from(tag: TypeTag) -> Self {
        tag.as_str().to_string()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One argument as it travels between producer, broker and worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(rename = "type", default)]
    pub type_tag: TypeTag,
}

impl Argument {
    pub fn new(value: impl Into<serde_json::Value>, type_tag: TypeTag) -> Self {
        Self {
            value: value.into(),
            type_tag,
        }
    }
}

/// A task invocation authored by a producer.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub args: Vec<Argument>,
}

impl Signature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument (builder style).
    pub fn arg(mut self, arg: impl Into<Argument>) -> Self {
        self.args.push(arg.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn argument_uses_type_as_field_name() {
        let arg = Argument::new(2.0, TypeTag::Int);
        let encoded = serde_json::to_value(&arg).unwrap();
        assert_eq!(encoded, json!({ "value": 2.0, "type": "int" }));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let arg: Argument = serde_json::from_value(json!({ "value": 2.0 })).unwrap();
        assert_eq!(arg, Argument::new(2.0, TypeTag::Other));

        let arg: Argument = serde_json::from_value(json!({ "type": "int" })).unwrap();
        assert_eq!(arg.value, serde_json::Value::Null);
        assert_eq!(arg.type_tag, TypeTag::Int);
    }

    #[test]
    fn unknown_tag_decodes_as_other() {
        let arg: Argument = serde_json::from_value(json!({ "value": [1, 2], "type": "[]int" })).unwrap();
        assert_eq!(arg.type_tag, TypeTag::Other);
    }

    #[test]
    fn platform_aliases_are_64_bit() {
        assert_eq!(TypeTag::Int.kind(), ValueKind::I64);
        assert_eq!(TypeTag::Uint.kind(), ValueKind::U64);
        assert!(TypeTag::Uint8.is_integer());
        assert!(!TypeTag::Float64.is_integer());
    }

    #[test]
    fn signature_builder_keeps_order() {
        let sig = Signature::new("add")
            .arg(Argument::new(1, TypeTag::Int))
            .arg(Argument::new(2, TypeTag::Int));
        assert_eq!(sig.args[0].value, json!(1));
        assert_eq!(sig.args[1].value, json!(2));
    }
}
