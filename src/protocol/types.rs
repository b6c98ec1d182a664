//! RESP Reply and Request Values
//!
//! This module defines the in-memory form of everything that crosses the wire.
//! Encoding is a total function: every `RespValue` has exactly one wire form.
//!
//! ## Wire Forms
//!
//! | Variant        | Wire form                              |
//! |----------------|----------------------------------------|
//! | `Null`         | `$-1\r\n`                              |
//! | `BulkString`   | `$<len>\r\n<bytes>\r\n`                |
//! | `Integer`      | `:<n>\r\n`                             |
//! | `Array`        | `*<count>\r\n` + each element          |
//! | `Error`        | `-<message>\r\n`                       |
//! | `SimpleString` | `+<text>\r\n` (decoded, never replied) |

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A value in the RESP protocol.
///
/// Replies produced by the server only ever use `Null`, `BulkString`,
/// `Integer`, `Array` and `Error`. `SimpleString` exists so that standalone
/// `+` replies decode symmetrically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// Format: `-<error message>\r\n`
    Error(String),

    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe, length-prefixed payload.
    /// Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// The nil bulk string `$-1\r\n` (also what `*-1\r\n` decodes to).
    Null,

    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Creates a new error reply.
    ///
    /// # Example
    /// ```
    /// use respkv::protocol::types::RespValue;
    /// let err = RespValue::error("Invalid command");
    /// assert_eq!(err.serialize(), b"-Invalid command\r\n");
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// Creates a new bulk string reply.
    ///
    /// # Example
    /// ```
    /// use respkv::protocol::types::RespValue;
    /// let bulk = RespValue::bulk_string("PONG");
    /// assert_eq!(bulk.serialize(), b"$4\r\nPONG\r\n");
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// The `OK` acknowledgement, sent as a bulk string.
    pub fn ok() -> Self {
        RespValue::BulkString(Bytes::from_static(b"OK"))
    }

    /// Builds the request form of a command: an array of bulk strings.
    ///
    /// # Example
    /// ```
    /// use respkv::protocol::types::RespValue;
    /// let req = RespValue::request(["GET", "name"]);
    /// assert_eq!(req.serialize(), b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
    /// ```
    pub fn request<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        RespValue::Array(
            parts
                .into_iter()
                .map(|part| RespValue::BulkString(part.into()))
                .collect(),
        )
    }

    /// Serializes the value to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the value into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::BulkString(data) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            RespValue::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "{}", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) if values.is_empty() => write!(f, "(empty array)"),
            RespValue::Array(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, v)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialize() {
        let value = RespValue::error("Invalid command");
        assert_eq!(value.serialize(), b"-Invalid command\r\n");
    }

    #[test]
    fn test_integer_serialize() {
        assert_eq!(RespValue::integer(1000).serialize(), b":1000\r\n");
        assert_eq!(RespValue::integer(-42).serialize(), b":-42\r\n");
    }

    #[test]
    fn test_bulk_string_serialize() {
        let value = RespValue::bulk_string(Bytes::from("hello"));
        assert_eq!(value.serialize(), b"$5\r\nhello\r\n");
    }

    #[test]
    fn test_bulk_string_with_crlf_payload() {
        let value = RespValue::bulk_string(Bytes::from_static(b"a\r\nb"));
        assert_eq!(value.serialize(), b"$4\r\na\r\nb\r\n");
    }

    #[test]
    fn test_null_serialize() {
        assert_eq!(RespValue::null().serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_array_serialize() {
        let value = RespValue::request(["GET", "name"]);
        assert_eq!(value.serialize(), b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
    }

    #[test]
    fn test_empty_array_serialize() {
        assert_eq!(RespValue::array(vec![]).serialize(), b"*0\r\n");
    }

    #[test]
    fn test_ok_is_bulk() {
        assert_eq!(RespValue::ok().serialize(), b"$2\r\nOK\r\n");
    }

    #[test]
    fn test_display() {
        assert_eq!(RespValue::Null.to_string(), "(nil)");
        assert_eq!(RespValue::integer(3).to_string(), "(integer) 3");
        assert_eq!(
            RespValue::request(["a", "b"]).to_string(),
            "1) \"a\"\n2) \"b\""
        );
    }
}
