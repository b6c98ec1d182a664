//! Command Handler Module
//!
//! Receives decoded requests, executes them against the key space and
//! returns the reply to encode.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │ Vec<Bytes>
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Lookup       │
//! │  - Arity        │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Keyspace     │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`, `ECHO`
//! - `GET`, `SET` (with `EX`, `PX`, `EXAT`, `PXAT`)
//! - `EXISTS`, `DEL`
//! - `INCR`, `DECR`
//! - `LPUSH`, `RPUSH`
//! - `SAVE`

pub mod error;
pub mod handler;
pub mod options;

pub use error::CommandError;
pub use handler::{Command, CommandHandler};
pub use options::SetExpiry;
