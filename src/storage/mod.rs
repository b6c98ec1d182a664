//! Storage Module
//!
//! The in-memory key space, its value model, the snapshot store, and the
//! optional active-expiry sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            SharedKeyspace                    │
//! │       Rc<RefCell<Keyspace>>                  │
//! │  ┌────────────────────────────────────────┐  │
//! │  │ HashMap<Bytes, Entry { value, expiry }>│  │
//! │  └────────────────────────────────────────┘  │
//! └───────▲──────────────────▲───────────────────┘
//!         │                  │
//!   CommandHandler     ExpirySweeper (optional)
//!         │
//!   SnapshotStore (SAVE / startup load)
//! ```
//!
//! ## Example
//!
//! ```
//! use respkv::storage::{Keyspace, Value};
//! use bytes::Bytes;
//!
//! let mut keyspace = Keyspace::new();
//! keyspace.put(Bytes::from("name"), Value::text("Ariz"), None);
//! assert!(keyspace.contains_live(b"name"));
//! assert!(keyspace.delete(b"name"));
//! ```

pub mod clock;
pub mod expiry;
pub mod keyspace;
pub mod snapshot;
pub mod value;

pub use clock::{Clock, ManualClock, SystemClock};
pub use expiry::{ExpiryConfig, ExpirySweeper};
pub use keyspace::{Keyspace, SharedKeyspace};
pub use snapshot::{SnapshotError, SnapshotStore};
pub use value::{Entry, Value};
