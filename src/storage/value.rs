//! Stored values and entries.

use crate::protocol::RespValue;
use bytes::Bytes;
use std::collections::VecDeque;

/// A value held under a key.
///
/// Lists hold raw byte strings only, so a list element is always `Text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Nil,
    Integer(i64),
    Text(Bytes),
    List(VecDeque<Bytes>),
}

impl Value {
    pub fn text(data: impl Into<Bytes>) -> Self {
        Value::Text(data.into())
    }

    /// Builds a list value in the given order.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Interprets the value as a signed 64-bit integer.
    ///
    /// `Text` qualifies only when it holds the canonical decimal form of an
    /// i64: no sign other than `-`, no leading zeros, no whitespace.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Text(data) => {
                let n: i64 = std::str::from_utf8(data).ok()?.parse().ok()?;
                (n.to_string().as_bytes() == &data[..]).then_some(n)
            }
            Value::Nil | Value::List(_) => None,
        }
    }
}

impl From<Value> for RespValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Nil => RespValue::Null,
            Value::Integer(n) => RespValue::Integer(n),
            Value::Text(data) => RespValue::BulkString(data),
            Value::List(items) => {
                RespValue::Array(items.into_iter().map(RespValue::BulkString).collect())
            }
        }
    }
}

/// A value plus its optional absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Value,
    /// Unix epoch milliseconds after which the entry is dead (None = never expires)
    pub expires_at: Option<u64>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    pub fn with_expiry(value: Value, expires_at: Option<u64>) -> Self {
        Self { value, expires_at }
    }

    /// An entry is live while `now < expires_at`.
    #[inline]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at.is_some_and(|exp| now_ms >= exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_integer_rejects_non_canonical_text() {
        assert_eq!(Value::text("+5").as_integer(), None);
        assert_eq!(Value::text("007").as_integer(), None);
        assert_eq!(Value::text("-0").as_integer(), None);
        assert_eq!(Value::text(" 5").as_integer(), None);
    }

    #[test]
    fn test_as_integer() {
        assert_eq!(Value::Integer(5).as_integer(), Some(5));
        assert_eq!(Value::text("-12").as_integer(), Some(-12));
        assert_eq!(Value::text("hello").as_integer(), None);
        assert_eq!(Value::text("1.5").as_integer(), None);
        assert_eq!(Value::text("0").as_integer(), Some(0));
        assert_eq!(Value::text(i64::MIN.to_string()).as_integer(), Some(i64::MIN));
        assert_eq!(Value::list(["1"]).as_integer(), None);
        assert_eq!(Value::Nil.as_integer(), None);
    }

    #[test]
    fn test_into_resp() {
        assert_eq!(RespValue::from(Value::Nil), RespValue::Null);
        assert_eq!(RespValue::from(Value::Integer(3)), RespValue::Integer(3));
        assert_eq!(
            RespValue::from(Value::list(["a", "b"])),
            RespValue::request(["a", "b"])
        );
    }

    #[test]
    fn test_expiry_boundary() {
        let entry = Entry::with_expiry(Value::text("v"), Some(1_000));
        assert!(!entry.is_expired(999));
        assert!(entry.is_expired(1_000));
        assert!(!Entry::new(Value::text("v")).is_expired(u64::MAX));
    }
}
