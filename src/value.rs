//! Typed property values.
//!
//! Decoders report scalars as text plus a [`ValueType`]. The types here turn that into geozero
//! column values and JSON.
use geozero::ColumnValue;
use serde::ser;
use serde_json::{Number, Value};

use crate::event::ValueType;

/// A scalar parsed according to its [`ValueType`].
///
/// Text that does not parse as the announced type stays a string.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl PropertyValue {
    #[must_use]
    pub fn parse(text: &str, value_type: ValueType) -> Self {
        let parsed = match value_type {
            ValueType::Integer => text.parse().ok().map(PropertyValue::Integer),
            ValueType::Float => text.parse().ok().map(PropertyValue::Float),
            ValueType::Boolean => text.parse().ok().map(PropertyValue::Boolean),
            ValueType::String | ValueType::Unknown => None,
        };
        parsed.unwrap_or_else(|| PropertyValue::String(text.to_string()))
    }

    #[must_use]
    pub fn as_column_value(&self) -> ColumnValue<'_> {
        match self {
            PropertyValue::String(value) => ColumnValue::String(value),
            PropertyValue::Integer(value) => ColumnValue::Long(*value),
            PropertyValue::Float(value) => ColumnValue::Double(*value),
            PropertyValue::Boolean(value) => ColumnValue::Bool(*value),
        }
    }

    /// Non-finite floats become `null`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::String(value) => Value::String(value.clone()),
            PropertyValue::Integer(value) => Value::from(*value),
            PropertyValue::Float(value) => {
                Number::from_f64(*value).map_or(Value::Null, Value::Number)
            }
            PropertyValue::Boolean(value) => Value::Bool(*value),
        }
    }
}

/// Serializes a geozero column value as its plain serde counterpart.
pub struct ColumnValueSerializer<'a>(pub &'a ColumnValue<'a>);

impl ser::Serialize for ColumnValueSerializer<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        match &self.0 {
            ColumnValue::Byte(val) => serializer.serialize_i8(*val),
            ColumnValue::UByte(val) => serializer.serialize_u8(*val),
            ColumnValue::Bool(val) => serializer.serialize_bool(*val),
            ColumnValue::Short(val) => serializer.serialize_i16(*val),
            ColumnValue::UShort(val) => serializer.serialize_u16(*val),
            ColumnValue::Int(val) => serializer.serialize_i32(*val),
            ColumnValue::UInt(val) => serializer.serialize_u32(*val),
            ColumnValue::Long(val) => serializer.serialize_i64(*val),
            ColumnValue::ULong(val) => serializer.serialize_u64(*val),
            ColumnValue::Float(val) => serializer.serialize_f32(*val),
            ColumnValue::Double(val) => serializer.serialize_f64(*val),
            ColumnValue::Json(val) => match serde_json::from_str::<Value>(val) {
                Ok(json) => ser::Serialize::serialize(&json, serializer),
                Err(_) => serializer.serialize_str(val),
            },
            ColumnValue::String(val) => serializer.serialize_str(val),
            ColumnValue::DateTime(val) => serializer.serialize_str(val.as_ref()),
            ColumnValue::Binary(val) => serializer.serialize_bytes(val),
        }
    }
}

/// JSON form of a geozero column value.
///
/// # Errors
///
/// [`crate::error::Error::Serde`] if the value cannot be represented in JSON.
pub fn column_to_json(value: &ColumnValue) -> crate::error::Result<Value> {
    Ok(serde_json::to_value(ColumnValueSerializer(value))?)
}
