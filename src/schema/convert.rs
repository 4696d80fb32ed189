//! Schema-driven conversion between the JSON intermediate form and Avro
//! values.
//!
//! Serialization maps a domain type to `serde_json::Value` first, then walks
//! the Avro schema to build the typed `apache_avro` value. The walk is
//! strict: a JSON field with no counterpart in the schema, or a value whose
//! shape does not match the schema, is an error rather than a silent
//! coercion.

use apache_avro::schema::{RecordField, Schema};
use apache_avro::types::Value;
use crate::{Error, Result};

fn mismatch(message: impl Into<String>) -> Error {
    Error::SchemaConformance {
        message: message.into(),
    }
}

/// Avro value → JSON intermediate form.
pub(crate) fn avro_to_json(value: &Value) -> Result<serde_json::Value> {
    let json = match value {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::json!(i),
        Value::Long(l) => serde_json::json!(l),
        Value::Float(f) => serde_json::json!(f),
        Value::Double(d) => serde_json::json!(d),
        Value::Bytes(b) | Value::Fixed(_, b) => serde_json::json!(b),
        Value::String(s) | Value::Enum(_, s) => serde_json::Value::String(s.clone()),
        Value::Union(_, inner) => avro_to_json(inner)?,
        Value::Array(items) => {
            let items: Result<Vec<_>> = items.iter().map(avro_to_json).collect();
            serde_json::Value::Array(items?)
        }
        Value::Map(entries) => {
            let mut map = serde_json::Map::with_capacity(entries.len());
            for (k, v) in entries {
                map.insert(k.clone(), avro_to_json(v)?);
            }
            serde_json::Value::Object(map)
        }
        Value::Record(fields) => {
            let mut map = serde_json::Map::with_capacity(fields.len());
            for (k, v) in fields {
                map.insert(k.clone(), avro_to_json(v)?);
            }
            serde_json::Value::Object(map)
        }
        Value::Date(d) => serde_json::json!(d),
        Value::TimeMillis(t) => serde_json::json!(t),
        Value::TimeMicros(t) => serde_json::json!(t),
        Value::TimestampMillis(t) => serde_json::json!(t),
        Value::TimestampMicros(t) => serde_json::json!(t),
        Value::TimestampNanos(t) => serde_json::json!(t),
        Value::LocalTimestampMillis(t) => serde_json::json!(t),
        Value::LocalTimestampMicros(t) => serde_json::json!(t),
        Value::LocalTimestampNanos(t) => serde_json::json!(t),
        Value::Uuid(u) => serde_json::Value::String(u.to_string()),
        Value::Decimal(_) | Value::BigDecimal(_) | Value::Duration(_) => {
            return Err(mismatch("decimal and duration values are not supported"));
        }
    };
    Ok(json)
}

/// JSON intermediate form → Avro value, validated against `schema`.
pub(crate) fn json_to_avro(json: &serde_json::Value, schema: &Schema) -> Result<Value> {
    match schema {
        Schema::Union(union) => {
            for (idx, variant) in union.variants().iter().enumerate() {
                if let Ok(v) = json_to_avro(json, variant) {
                    return Ok(Value::Union(idx as u32, Box::new(v)));
                }
            }
            Err(mismatch(format!("no union variant matches {json}")))
        }
        Schema::Null => match json {
            serde_json::Value::Null => Ok(Value::Null),
            other => Err(mismatch(format!("expected null, got {other}"))),
        },
        Schema::Boolean => match json {
            serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
            other => Err(mismatch(format!("expected boolean, got {other}"))),
        },
        Schema::Int => {
            let n = as_integer(json)?;
            let n = i32::try_from(n)
                .map_err(|_| mismatch(format!("{n} is out of range for an int field")))?;
            Ok(Value::Int(n))
        }
        Schema::Long => Ok(Value::Long(as_integer(json)?)),
        Schema::Float => Ok(Value::Float(as_float(json)? as f32)),
        Schema::Double => Ok(Value::Double(as_float(json)?)),
        Schema::String => match json {
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            other => Err(mismatch(format!("expected string, got {other}"))),
        },
        Schema::Bytes => Ok(Value::Bytes(as_byte_array(json)?)),
        Schema::Fixed(fixed) => {
            let bytes = as_byte_array(json)?;
            if bytes.len() != fixed.size {
                return Err(mismatch(format!(
                    "fixed field expects {} bytes, got {}",
                    fixed.size,
                    bytes.len()
                )));
            }
            Ok(Value::Fixed(fixed.size, bytes))
        }
        Schema::Enum(e) => match json {
            serde_json::Value::String(s) => {
                let position = e
                    .symbols
                    .iter()
                    .position(|symbol| symbol == s)
                    .ok_or_else(|| mismatch(format!("'{s}' is not an enum symbol")))?;
                Ok(Value::Enum(position as u32, s.clone()))
            }
            other => Err(mismatch(format!("expected enum symbol, got {other}"))),
        },
        Schema::Array(array) => match json {
            serde_json::Value::Array(items) => {
                let items: Result<Vec<_>> = items
                    .iter()
                    .map(|item| json_to_avro(item, &array.items))
                    .collect();
                Ok(Value::Array(items?))
            }
            other => Err(mismatch(format!("expected array, got {other}"))),
        },
        Schema::Map(map) => match json {
            serde_json::Value::Object(entries) => {
                let mut out = std::collections::HashMap::with_capacity(entries.len());
                for (k, v) in entries {
                    out.insert(k.clone(), json_to_avro(v, &map.types)?);
                }
                Ok(Value::Map(out))
            }
            other => Err(mismatch(format!("expected map object, got {other}"))),
        },
        Schema::Record(record) => match json {
            serde_json::Value::Object(entries) => {
                // Unknown-field strictness: the record may not carry fields
                // the schema does not know about.
                for key in entries.keys() {
                    if !record.fields.iter().any(|f| &f.name == key) {
                        return Err(mismatch(format!(
                            "field '{key}' is not part of record '{}'",
                            record.name
                        )));
                    }
                }

                let mut fields = Vec::with_capacity(record.fields.len());
                for field in &record.fields {
                    let value = match entries.get(&field.name) {
                        Some(v) => json_to_avro(v, &field.schema)?,
                        None => missing_field_value(field)?,
                    };
                    fields.push((field.name.clone(), value));
                }
                Ok(Value::Record(fields))
            }
            other => Err(mismatch(format!("expected record object, got {other}"))),
        },
        Schema::Date => Ok(Value::Date(as_integer_as_i32(json)?)),
        Schema::TimeMillis => Ok(Value::TimeMillis(as_integer_as_i32(json)?)),
        Schema::TimeMicros => Ok(Value::TimeMicros(as_integer(json)?)),
        Schema::TimestampMillis => Ok(Value::TimestampMillis(as_integer(json)?)),
        Schema::TimestampMicros => Ok(Value::TimestampMicros(as_integer(json)?)),
        Schema::TimestampNanos => Ok(Value::TimestampNanos(as_integer(json)?)),
        Schema::LocalTimestampMillis => Ok(Value::LocalTimestampMillis(as_integer(json)?)),
        Schema::LocalTimestampMicros => Ok(Value::LocalTimestampMicros(as_integer(json)?)),
        Schema::LocalTimestampNanos => Ok(Value::LocalTimestampNanos(as_integer(json)?)),
        Schema::Uuid => match json {
            // Resolution against the schema parses the string form.
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            other => Err(mismatch(format!("expected uuid string, got {other}"))),
        },
        other => Err(mismatch(format!("unsupported schema type {other:?}"))),
    }
}

fn missing_field_value(field: &RecordField) -> Result<Value> {
    if let Some(default) = &field.default {
        return json_to_avro(default, &field.schema);
    }
    // A nullable field with no default degrades to null.
    if let Schema::Union(union) = &field.schema {
        if let Some(idx) = union.variants().iter().position(|v| matches!(v, Schema::Null)) {
            return Ok(Value::Union(idx as u32, Box::new(Value::Null)));
        }
    }
    Err(mismatch(format!(
        "required field '{}' is missing",
        field.name
    )))
}

fn as_integer(json: &serde_json::Value) -> Result<i64> {
    json.as_i64()
        .ok_or_else(|| mismatch(format!("expected integer, got {json}")))
}

fn as_integer_as_i32(json: &serde_json::Value) -> Result<i32> {
    let n = as_integer(json)?;
    i32::try_from(n).map_err(|_| mismatch(format!("{n} is out of range for a 32-bit field")))
}

fn as_float(json: &serde_json::Value) -> Result<f64> {
    json.as_f64()
        .ok_or_else(|| mismatch(format!("expected number, got {json}")))
}

fn as_byte_array(json: &serde_json::Value) -> Result<Vec<u8>> {
    match json {
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| mismatch(format!("expected byte value, got {item}")))
            })
            .collect(),
        other => Err(mismatch(format!("expected byte array, got {other}"))),
    }
}
