//! # respkv - A Single-Threaded In-Memory Key-Value Server
//!
//! respkv speaks RESP over TCP and keeps typed values (integers, byte
//! strings and lists) in memory, with optional per-key expiry and on-demand
//! snapshots to disk.
//!
//! ## Features
//!
//! - **RESP Wire Protocol**: binary-safe bulk strings, pipelining, partial reads
//! - **Single Writer**: one thread, one key space, no locks
//! - **TTL Support**: `SET ... EX|PX|EXAT|PXAT`, expired lazily on access
//! - **Snapshots**: `SAVE` writes a binary snapshot that is reloaded at startup
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       respkv (one thread, LocalSet)                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Server    │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌──────────────────────────┐     │
//! │                     │ RESP Parser │    │  Rc<RefCell<Keyspace>>   │     │
//! │                     └─────────────┘    └──────┬────────────▲──────┘     │
//! │                                               │            │            │
//! │                                               ▼            │            │
//! │                                      ┌──────────────┐ ┌────┴─────────┐  │
//! │                                      │SnapshotStore │ │ExpirySweeper │  │
//! │                                      │ (SAVE, load) │ │  (optional)  │  │
//! │                                      └──────────────┘ └──────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use respkv::server::Server;
//! use respkv::storage::{Keyspace, SnapshotStore};
//! use respkv::CommandHandler;
//! use tokio::task::LocalSet;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> std::io::Result<()> {
//!     let keyspace = Keyspace::new().into_shared();
//!     let handler = CommandHandler::new(keyspace, SnapshotStore::new("dump.rkv"));
//!
//!     LocalSet::new()
//!         .run_until(async {
//!             let server = Server::bind("127.0.0.1:6379", handler).await?;
//!             server.run(async {
//!                 let _ = tokio::signal::ctrl_c().await;
//!             }).await;
//!             Ok::<(), std::io::Error>(())
//!         })
//!         .await
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`, `ECHO message`
//! - `SET key value [EX seconds | PX milliseconds | EXAT unix-s | PXAT unix-ms]`
//! - `GET key`, `EXISTS key`, `DEL key [key ...]`
//! - `INCR key`, `DECR key`
//! - `LPUSH key value [value ...]`, `RPUSH key value [value ...]`
//! - `SAVE`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP parser and types
//! - [`storage`]: key space, value model, snapshots and expiry
//! - [`commands`]: command dispatch
//! - [`connection`]: per-client service cycle
//! - [`server`]: accept loop and shutdown
//! - [`config`]: command-line configuration
//!
//! ## Design Highlights
//!
//! ### Single Writer
//!
//! Every connection is a local task on one thread. Command execution is
//! synchronous and never awaits while it holds the key space, so commands
//! apply one at a time in arrival order.
//!
//! ### Lazy Expiry
//!
//! An expired key stays in memory until something reads it, at which point
//! it is removed and treated as absent. The optional sweeper reclaims keys
//! that are never read again.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandError, CommandHandler};
pub use config::{CliAction, Config, ConfigError};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{ParseError, RespParser, RespValue};
pub use server::Server;
pub use storage::{ExpiryConfig, ExpirySweeper, Keyspace, SharedKeyspace, SnapshotStore};

/// The default port respkv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host respkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default snapshot file, relative to the working directory
pub const DEFAULT_SNAPSHOT_PATH: &str = "dump.rkv";

/// Version of respkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
