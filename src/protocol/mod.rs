//! RESP Protocol Implementation
//!
//! Bidirectional conversion between wire bytes and [`RespValue`].
//!
//! ## Modules
//!
//! - `types`: the `RespValue` enum and its encoder
//! - `parser`: length-prefixed decoder with explicit "need more bytes" results
//!
//! ## Example
//!
//! ```
//! use respkv::protocol::{parse_request, RespValue};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (parts, consumed) = parse_request(data).unwrap().unwrap();
//! assert_eq!(parts[0], Bytes::from("GET"));
//! assert_eq!(consumed, data.len());
//!
//! let reply = RespValue::bulk_string("Ariz").serialize();
//! assert_eq!(reply, b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, parse_request, ParseError, ParseResult, RespParser};
pub use types::RespValue;
