//! Length-Prefixed RESP Parser
//!
//! The parser walks a byte buffer with an explicit cursor. Bulk payloads are
//! sliced by their declared length, never by searching for CRLF, so payloads
//! may contain `\r\n` or arbitrary binary data.
//!
//! ## How the Parser Works
//!
//! Every entry point returns one of:
//! - `Ok(Some((value, consumed)))` - a complete value, `consumed` bytes were used
//! - `Ok(None)` - the buffer ends early, wait for more bytes
//! - `Err(ParseError)` - the input is malformed and cannot become valid
//!
//! Keeping "incomplete" out of the error type lets the connection layer
//! buffer partial reads and only drop a client on genuinely bad input.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The first byte is not one of `* $ + - :`
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Structural violation (missing CRLF, nesting too deep)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Well-formed RESP that is not an array of bulk strings
    #[error("not a request: {0}")]
    NotARequest(&'static str),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

/// A RESP protocol parser.
///
/// # Example
///
/// ```
/// use respkv::protocol::{RespParser, RespValue};
///
/// let mut parser = RespParser::new();
/// let buf = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
///
/// let (value, consumed) = parser.parse(buf).unwrap().unwrap();
/// assert_eq!(consumed, buf.len());
/// assert_eq!(value, RespValue::request(["GET", "name"]));
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    depth: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one RESP value from the start of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    /// Attempts to parse one client request from the start of `buf`.
    ///
    /// A request is an array of bulk strings. The first element is the
    /// command name; the rest are its arguments.
    pub fn parse_request(&mut self, buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
        let (value, consumed) = match self.parse(buf)? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        let items = match value {
            RespValue::Array(items) => items,
            RespValue::Null => return Err(ParseError::NotARequest("null array")),
            _ => return Err(ParseError::NotARequest("request must be an array")),
        };

        let parts = items
            .into_iter()
            .map(|item| match item {
                RespValue::BulkString(data) => Ok(data),
                _ => Err(ParseError::NotARequest(
                    "request elements must be bulk strings",
                )),
            })
            .collect::<ParseResult<Vec<Bytes>>>()?;

        Ok(Some((parts, consumed)))
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => parse_line(buf).map(|line| {
                line.map(|(s, used)| (RespValue::SimpleString(s.to_string()), used))
            }),
            prefix::ERROR => parse_line(buf)
                .map(|line| line.map(|(s, used)| (RespValue::Error(s.to_string()), used))),
            prefix::INTEGER => parse_integer(buf),
            prefix::BULK_STRING => parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (count, header_len) = match parse_length_header(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        if count == -1 {
            return Ok(Some((RespValue::Null, header_len)));
        }
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;
        // A hostile count must not drive a huge up-front allocation.
        let mut elements = Vec::with_capacity(count.min(1024));
        let mut consumed = header_len;

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_len)) => {
                    elements.push(value);
                    consumed += element_len;
                }
                None => return Ok(None),
            }
        }
        self.depth -= 1;

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Parses a `<prefix><text>\r\n` line, returning the text and bytes used.
fn parse_line(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    match find_crlf(&buf[1..]) {
        Some(pos) => {
            let s = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            Ok(Some((s, 1 + pos + 2)))
        }
        None => Ok(None),
    }
}

/// Parses an integer: `:<integer>\r\n`
fn parse_integer(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    match parse_line(buf)? {
        Some((s, used)) => {
            let n: i64 = s
                .parse()
                .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))?;
            Ok(Some((RespValue::Integer(n), used)))
        }
        None => Ok(None),
    }
}

/// Parses the signed length in a `$<n>\r\n` or `*<n>\r\n` header.
fn parse_length_header(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    match parse_line(buf)? {
        Some((s, used)) => {
            let n: i64 = s
                .parse()
                .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))?;
            Ok(Some((n, used)))
        }
        None => Ok(None),
    }
}

/// Parses a bulk string: `$<length>\r\n<data>\r\n`
fn parse_bulk_string(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    let (length, data_start) = match parse_length_header(buf)? {
        Some(header) => header,
        None => return Ok(None),
    };

    if length == -1 {
        return Ok(Some((RespValue::Null, data_start)));
    }
    if length < 0 {
        return Err(ParseError::InvalidBulkLength(length));
    }

    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let total_needed = data_start + length + 2;
    if buf.len() < total_needed {
        return Ok(None);
    }

    if &buf[data_start + length..total_needed] != CRLF {
        return Err(ParseError::ProtocolError(
            "bulk string missing trailing CRLF".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);
    Ok(Some((RespValue::BulkString(data), total_needed)))
}

/// Returns the position of the `\r` of the first CRLF in `buf`.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|window| window == CRLF)
}

/// Parses a single RESP value from bytes.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}

/// Parses a single client request from bytes.
pub fn parse_request(buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
    RespParser::new().parse_request(buf)
}
