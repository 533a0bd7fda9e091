//! Conformance of JSON values to protobuf message types.
//!
//! Values follow the proto3 JSON mapping: fields appear under their JSON
//! name or their original name, 64-bit integers may be strings, `null`
//! stands for an unset field, and map fields are JSON objects. Well-known
//! `google.protobuf` types have their own JSON forms and are not inspected.

use descriptor::{DescriptorPool, FieldDescriptor, FieldKind, MessageDescriptor};
use serde_json::Value;
use thiserror::Error;

const WELL_KNOWN_PREFIX: &str = "google.protobuf.";

/// Where and how a value departs from its declared message type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {reason}")]
pub struct ShapeError {
    /// Dotted path from the message type down to the offending value.
    pub path: String,
    pub reason: String,
}

/// Checks `value` against `message`, resolving nested types from `pool`.
pub fn check_message(
    pool: &DescriptorPool,
    message: &MessageDescriptor,
    value: &Value,
) -> Result<(), ShapeError> {
    Checker { pool }.message(message, value, message.full_name().to_string())
}

struct Checker<'a> {
    pool: &'a DescriptorPool,
}

impl Checker<'_> {
    fn message(&self, message: &MessageDescriptor, value: &Value, path: String) -> Result<(), ShapeError> {
        let Value::Object(fields) = value else {
            return Err(mismatch(path, "object", value));
        };
        for (key, value) in fields {
            let Some(field) = message.json_field(key) else {
                return Err(ShapeError {
                    reason: format!("unknown field {key:?} for {}", message.full_name()),
                    path,
                });
            };
            self.field(field, value, format!("{path}.{key}"))?;
        }
        Ok(())
    }

    fn field(&self, field: &FieldDescriptor, value: &Value, path: String) -> Result<(), ShapeError> {
        if value.is_null() {
            return Ok(());
        }
        if !field.repeated {
            return self.single(&field.kind, value, path);
        }

        if let FieldKind::Message(entry) = &field.kind
            && let Some(entry) = self.pool.message(entry)
            && entry.is_map_entry()
        {
            let Value::Object(entries) = value else {
                return Err(mismatch(path, "object", value));
            };
            let Some(value_field) = entry.field("value") else {
                return Ok(());
            };
            for (key, item) in entries {
                if !item.is_null() {
                    self.single(&value_field.kind, item, format!("{path}[{key:?}]"))?;
                }
            }
            return Ok(());
        }

        let Value::Array(items) = value else {
            return Err(mismatch(path, "array", value));
        };
        for (index, item) in items.iter().enumerate() {
            self.single(&field.kind, item, format!("{path}[{index}]"))?;
        }
        Ok(())
    }

    fn single(&self, kind: &FieldKind, value: &Value, path: String) -> Result<(), ShapeError> {
        let conforms = match kind {
            FieldKind::Bool => value.is_boolean(),
            FieldKind::String | FieldKind::Bytes => value.is_string(),
            FieldKind::Int32 => signed(value).is_some_and(|v| i32::try_from(v).is_ok()),
            FieldKind::Int64 => signed(value).is_some(),
            FieldKind::Uint32 => unsigned(value).is_some_and(|v| u32::try_from(v).is_ok()),
            FieldKind::Uint64 => unsigned(value).is_some(),
            FieldKind::Double | FieldKind::Float => {
                value.is_number() || value.as_str().is_some_and(|s| s.parse::<f64>().is_ok())
            }
            FieldKind::Enum(_) => value.is_string() || value.is_i64(),
            FieldKind::Message(name) if name.starts_with(WELL_KNOWN_PREFIX) => true,
            FieldKind::Message(name) => match self.pool.message(name) {
                Some(nested) => return self.message(nested, value, path),
                None => true,
            },
            FieldKind::Other(_) => true,
        };
        if conforms {
            Ok(())
        } else {
            Err(mismatch(path, expected(kind), value))
        }
    }
}

fn signed(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_str()?.parse().ok())
}

fn unsigned(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| value.as_str()?.parse().ok())
}

fn expected(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Double => "double",
        FieldKind::Float => "float",
        FieldKind::Int64 => "int64",
        FieldKind::Uint64 => "uint64",
        FieldKind::Int32 => "int32",
        FieldKind::Uint32 => "uint32",
        FieldKind::Bool => "bool",
        FieldKind::String => "string",
        FieldKind::Bytes => "base64 string",
        FieldKind::Enum(_) => "enum name or number",
        FieldKind::Message(_) => "object",
        FieldKind::Other(_) => "value",
    }
}

fn mismatch(path: String, expected: &str, found: &Value) -> ShapeError {
    let found = match found {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    ShapeError {
        path,
        reason: format!("expected {expected}, found {found}"),
    }
}
