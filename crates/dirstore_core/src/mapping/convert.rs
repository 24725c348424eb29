//! Conversions between Rust field types and attribute values.

use chrono::{DateTime, Utc};
use dirstore_model::{ModelError, ModelResult, Value};

use crate::hints::AttributeSyntax;

/// A Rust type that can be stored in an attribute.
///
/// An attribute that is absent from an entry converts to the type's zero
/// value. A zero value that has no meaningful wire form (an empty string,
/// `None`, an empty list) converts to no values at all, so the attribute is
/// omitted on write.
pub trait AttributeType: Sized {
    /// Syntax used for filters and sorting.
    const SYNTAX: AttributeSyntax;
    /// Whether the attribute holds several values.
    const MULTI_VALUED: bool = false;

    /// Values to write.
    fn to_values(&self) -> Vec<Value>;

    /// Read values. `attribute` names the attribute in errors.
    fn from_values(attribute: &str, values: &[Value]) -> ModelResult<Self>;
}

impl AttributeType for String {
    const SYNTAX: AttributeSyntax = AttributeSyntax::String;

    fn to_values(&self) -> Vec<Value> {
        if self.is_empty() {
            Vec::new()
        } else {
            vec![Value::Text(self.clone())]
        }
    }

    fn from_values(_attribute: &str, values: &[Value]) -> ModelResult<Self> {
        Ok(values
            .first()
            .map(|v| v.to_text().into_owned())
            .unwrap_or_default())
    }
}

impl AttributeType for Option<String> {
    const SYNTAX: AttributeSyntax = AttributeSyntax::String;

    fn to_values(&self) -> Vec<Value> {
        self.iter().map(|s| Value::Text(s.clone())).collect()
    }

    fn from_values(_attribute: &str, values: &[Value]) -> ModelResult<Self> {
        Ok(values.first().map(|v| v.to_text().into_owned()))
    }
}

impl AttributeType for Vec<String> {
    const SYNTAX: AttributeSyntax = AttributeSyntax::String;
    const MULTI_VALUED: bool = true;

    fn to_values(&self) -> Vec<Value> {
        self.iter().map(|s| Value::Text(s.clone())).collect()
    }

    fn from_values(_attribute: &str, values: &[Value]) -> ModelResult<Self> {
        Ok(values.iter().map(|v| v.to_text().into_owned()).collect())
    }
}

fn integer(attribute: &str, value: &Value) -> ModelResult<i64> {
    value
        .as_integer()
        .ok_or_else(|| ModelError::conversion(attribute, "integer"))
}

impl AttributeType for i64 {
    const SYNTAX: AttributeSyntax = AttributeSyntax::Integer;

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Integer(*self)]
    }

    fn from_values(attribute: &str, values: &[Value]) -> ModelResult<Self> {
        values.first().map_or(Ok(0), |v| integer(attribute, v))
    }
}

impl AttributeType for i32 {
    const SYNTAX: AttributeSyntax = AttributeSyntax::Integer;

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Integer(i64::from(*self))]
    }

    fn from_values(attribute: &str, values: &[Value]) -> ModelResult<Self> {
        let n = i64::from_values(attribute, values)?;
        i32::try_from(n).map_err(|_| ModelError::conversion(attribute, "32-bit integer"))
    }
}

impl AttributeType for Option<i64> {
    const SYNTAX: AttributeSyntax = AttributeSyntax::Integer;

    fn to_values(&self) -> Vec<Value> {
        self.iter().map(|n| Value::Integer(*n)).collect()
    }

    fn from_values(attribute: &str, values: &[Value]) -> ModelResult<Self> {
        values.first().map(|v| integer(attribute, v)).transpose()
    }
}

fn boolean(attribute: &str, value: &Value) -> ModelResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| ModelError::conversion(attribute, "boolean"))
}

impl AttributeType for bool {
    const SYNTAX: AttributeSyntax = AttributeSyntax::Boolean;

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Bool(*self)]
    }

    fn from_values(attribute: &str, values: &[Value]) -> ModelResult<Self> {
        values.first().map_or(Ok(false), |v| boolean(attribute, v))
    }
}

impl AttributeType for Option<bool> {
    const SYNTAX: AttributeSyntax = AttributeSyntax::Boolean;

    fn to_values(&self) -> Vec<Value> {
        self.iter().map(|b| Value::Bool(*b)).collect()
    }

    fn from_values(attribute: &str, values: &[Value]) -> ModelResult<Self> {
        values.first().map(|v| boolean(attribute, v)).transpose()
    }
}

impl AttributeType for Option<DateTime<Utc>> {
    const SYNTAX: AttributeSyntax = AttributeSyntax::Timestamp;

    fn to_values(&self) -> Vec<Value> {
        self.iter().map(|t| Value::Timestamp(*t)).collect()
    }

    fn from_values(attribute: &str, values: &[Value]) -> ModelResult<Self> {
        values
            .first()
            .map(|v| {
                v.as_timestamp()
                    .ok_or_else(|| ModelError::conversion(attribute, "timestamp"))
            })
            .transpose()
    }
}

impl AttributeType for Vec<u8> {
    const SYNTAX: AttributeSyntax = AttributeSyntax::Binary;

    fn to_values(&self) -> Vec<Value> {
        if self.is_empty() {
            Vec::new()
        } else {
            vec![Value::Bytes(self.clone())]
        }
    }

    fn from_values(_attribute: &str, values: &[Value]) -> ModelResult<Self> {
        Ok(values
            .first()
            .map(|v| v.as_bytes().into_owned())
            .unwrap_or_default())
    }
}

/// Compare stored and new values under a syntax, ignoring order.
///
/// Backends return text for typed values, so integers, booleans and
/// timestamps are compared after parsing.
pub(crate) fn same_values(syntax: AttributeSyntax, stored: &[Value], new: &[Value]) -> bool {
    if stored.len() != new.len() {
        return false;
    }
    let canonical = |v: &Value| -> String {
        match syntax {
            AttributeSyntax::Integer => v.as_integer().map(|n| n.to_string()),
            AttributeSyntax::Boolean => v.as_bool().map(|b| b.to_string()),
            AttributeSyntax::Timestamp => v.as_timestamp().map(|t| t.timestamp_millis().to_string()),
            AttributeSyntax::Binary => None,
            AttributeSyntax::String => Some(v.to_text().into_owned()),
        }
        .unwrap_or_else(|| String::from_utf8_lossy(&v.as_bytes()).into_owned())
    };
    let mut left: Vec<String> = stored.iter().map(canonical).collect();
    let mut right: Vec<String> = new.iter().map(canonical).collect();
    left.sort();
    right.sort();
    left == right
}
