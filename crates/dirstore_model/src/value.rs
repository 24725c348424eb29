//! Attribute values.

use std::borrow::Cow;

use chrono::{DateTime, Utc};

/// A single attribute value.
///
/// Directory backends carry strings or raw bytes on the wire; the typed
/// variants exist so that document backends can keep native JSON types and
/// so that filters can carry typed comparison operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Text string (UTF-8).
    Text(String),
    /// Raw bytes (binary and certificate attributes).
    Bytes(Vec<u8>),
    /// Signed integer.
    Integer(i64),
    /// Boolean.
    Bool(bool),
    /// Point in time.
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Get this value as a string slice, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an integer, parsing text if needed.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get this value as a boolean, accepting `TRUE`/`FALSE` text.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Text(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Value::Text(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    /// Get this value as a timestamp.
    ///
    /// Text is parsed as either generalized time or the document time format.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            Value::Text(s) => crate::time::parse_generalized_time(s)
                .or_else(|_| crate::time::parse_document_time(s))
                .ok(),
            _ => None,
        }
    }

    /// Get the raw bytes of this value.
    pub fn as_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Value::Bytes(b) => Cow::Borrowed(b),
            Value::Text(s) => Cow::Borrowed(s.as_bytes()),
            other => Cow::Owned(other.to_text().into_owned().into_bytes()),
        }
    }

    /// Render this value as text.
    ///
    /// Bytes are decoded lossily, timestamps use generalized time.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Value::Text(s) => Cow::Borrowed(s),
            Value::Bytes(b) => String::from_utf8_lossy(b),
            Value::Integer(n) => Cow::Owned(n.to_string()),
            Value::Bool(true) => Cow::Borrowed("TRUE"),
            Value::Bool(false) => Cow::Borrowed("FALSE"),
            Value::Timestamp(t) => Cow::Owned(crate::time::format_generalized_time(t)),
        }
    }

    /// Returns true for the binary variant.
    pub fn is_binary(&self) -> bool {
        matches!(self, Value::Bytes(_))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

/// A named attribute with zero or more values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name, case preserved.
    pub name: String,
    /// Attribute values in backend order.
    pub values: Vec<Value>,
    /// Whether the attribute is declared multi-valued.
    pub multi_valued: bool,
}

impl Attribute {
    /// Create a single-valued attribute.
    pub fn single(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            values: vec![value.into()],
            multi_valued: false,
        }
    }

    /// Create a multi-valued attribute.
    pub fn multi<V: Into<Value>>(name: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
            multi_valued: true,
        }
    }

    /// Create an attribute from raw values, inferring the multi-valued flag
    /// from the value count.
    pub fn from_values(name: impl Into<String>, values: Vec<Value>) -> Self {
        let multi_valued = values.len() > 1;
        Self {
            name: name.into(),
            values,
            multi_valued,
        }
    }

    /// Returns true if the attribute name matches, ignoring case.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Returns true if the attribute carries no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// First value, if any.
    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }

    /// All values rendered as text.
    pub fn texts(&self) -> Vec<String> {
        self.values.iter().map(|v| v.to_text().into_owned()).collect()
    }

    /// Compare values as unordered sets of their textual form.
    pub fn same_values(&self, other: &Attribute) -> bool {
        if self.values.len() != other.values.len() {
            return false;
        }
        let mut left = self.texts();
        let mut right = other.texts();
        left.sort();
        right.sort();
        left == right
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn text_conversions() {
        assert_eq!(Value::from("42").as_integer(), Some(42));
        assert_eq!(Value::from("TRUE").as_bool(), Some(true));
        assert_eq!(Value::from("false").as_bool(), Some(false));
        assert_eq!(Value::from("maybe").as_bool(), None);
        assert_eq!(Value::Bool(true).to_text(), "TRUE");
    }

    #[test]
    fn timestamp_from_generalized_time() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let value = Value::from("20240301123000.000Z");
        assert_eq!(value.as_timestamp(), Some(expected));
    }

    #[test]
    fn bytes_are_not_text() {
        let value = Value::Bytes(vec![0xde, 0xad]);
        assert!(value.is_binary());
        assert_eq!(value.as_str(), None);
        assert_eq!(value.as_bytes().as_ref(), &[0xde, 0xad]);
    }

    #[test]
    fn attribute_value_sets_ignore_order() {
        let a = Attribute::multi("mail", ["a@x", "b@x"]);
        let b = Attribute::multi("MAIL", ["b@x", "a@x"]);
        assert!(a.is_named("Mail"));
        assert!(a.same_values(&b));
        assert!(!a.same_values(&Attribute::single("mail", "a@x")));
    }
}
