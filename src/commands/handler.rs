//! Command Handler
//!
//! Maps a decoded request to one of the supported commands, checks its
//! arity, runs it against the key space and produces the reply.
//!
//! ## Supported Commands
//!
//! | Command | Arity | Reply |
//! |---------|-------|-------|
//! | `PING` | 1 | `PONG` |
//! | `ECHO message` | 2 | the message |
//! | `EXISTS key` | 2 | `1` or `0` |
//! | `DEL key [key ...]` | ≥2 | number of keys removed |
//! | `INCR key` / `DECR key` | 2 | new value, or nil if absent |
//! | `LPUSH key v [v ...]` / `RPUSH key v [v ...]` | ≥3 | new list length |
//! | `GET key` | 2 | stored value, or nil |
//! | `SET key value [EX s \| PX ms \| EXAT s \| PXAT ms]` | ≥3 | `OK` |
//! | `SAVE` | 1 | `OK` |
//!
//! Arity counts the command name. Names match case-insensitively.
//!
//! Every handler runs to completion while holding the key space borrow, so
//! commands never interleave.

use crate::commands::error::CommandError;
use crate::commands::options::parse_set_expiry;
use crate::protocol::RespValue;
use crate::storage::{Entry, SharedKeyspace, SnapshotStore, Value};
use bytes::Bytes;
use std::collections::VecDeque;
use tracing::{error, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    Exact(usize),
    AtLeast(usize),
}

/// A supported command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Echo,
    Exists,
    Del,
    Incr,
    Decr,
    LPush,
    RPush,
    Get,
    Set,
    Save,
}

const COMMAND_TABLE: &[Command] = &[
    Command::Ping,
    Command::Echo,
    Command::Exists,
    Command::Del,
    Command::Incr,
    Command::Decr,
    Command::LPush,
    Command::RPush,
    Command::Get,
    Command::Set,
    Command::Save,
];

impl Command {
    /// Resolves a command name, ignoring ASCII case.
    pub fn lookup(name: &[u8]) -> Option<Self> {
        COMMAND_TABLE
            .iter()
            .copied()
            .find(|cmd| name.eq_ignore_ascii_case(cmd.name().as_bytes()))
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Echo => "echo",
            Command::Exists => "exists",
            Command::Del => "del",
            Command::Incr => "incr",
            Command::Decr => "decr",
            Command::LPush => "lpush",
            Command::RPush => "rpush",
            Command::Get => "get",
            Command::Set => "set",
            Command::Save => "save",
        }
    }

    fn arity(self) -> Arity {
        match self {
            Command::Ping | Command::Save => Arity::Exact(1),
            Command::Echo | Command::Exists | Command::Incr | Command::Decr | Command::Get => {
                Arity::Exact(2)
            }
            Command::Del => Arity::AtLeast(2),
            Command::LPush | Command::RPush | Command::Set => Arity::AtLeast(3),
        }
    }

    fn check_arity(self, len: usize) -> Result<(), CommandError> {
        let ok = match self.arity() {
            Arity::Exact(n) => len == n,
            Arity::AtLeast(n) => len >= n,
        };
        if ok {
            Ok(())
        } else {
            Err(CommandError::WrongArity(self.name()))
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ListEnd {
    Head,
    Tail,
}

/// Executes requests against the shared key space.
///
/// Cloning is cheap; every clone talks to the same key space.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    keyspace: SharedKeyspace,
    snapshots: SnapshotStore,
}

impl CommandHandler {
    pub fn new(keyspace: SharedKeyspace, snapshots: SnapshotStore) -> Self {
        Self {
            keyspace,
            snapshots,
        }
    }

    pub fn keyspace(&self) -> &SharedKeyspace {
        &self.keyspace
    }

    /// Executes one request and returns the reply to send.
    ///
    /// `request[0]` is the command name; the rest are its arguments.
    pub fn execute(&self, request: &[Bytes]) -> RespValue {
        self.try_execute(request).unwrap_or_else(RespValue::from)
    }

    fn try_execute(&self, request: &[Bytes]) -> Result<RespValue, CommandError> {
        let (name, args) = request.split_first().ok_or(CommandError::EmptyCommand)?;
        let cmd = Command::lookup(name).ok_or(CommandError::UnknownCommand)?;
        cmd.check_arity(request.len())?;

        trace!(command = cmd.name(), args = args.len(), "Executing command");
        self.dispatch(cmd, args)
    }

    fn dispatch(&self, cmd: Command, args: &[Bytes]) -> Result<RespValue, CommandError> {
        match cmd {
            Command::Ping => Ok(RespValue::bulk_string("PONG")),
            Command::Echo => Ok(RespValue::BulkString(args[0].clone())),
            Command::Exists => self.cmd_exists(&args[0]),
            Command::Del => self.cmd_del(args),
            Command::Incr => self.cmd_step(&args[0], 1),
            Command::Decr => self.cmd_step(&args[0], -1),
            Command::LPush => self.cmd_push(&args[0], &args[1..], ListEnd::Head),
            Command::RPush => self.cmd_push(&args[0], &args[1..], ListEnd::Tail),
            Command::Get => self.cmd_get(&args[0]),
            Command::Set => self.cmd_set(&args[0], &args[1], &args[2..]),
            Command::Save => self.cmd_save(),
        }
    }

    /// EXISTS key
    fn cmd_exists(&self, key: &Bytes) -> Result<RespValue, CommandError> {
        let present = self.keyspace.borrow_mut().contains_live(key);
        Ok(RespValue::integer(i64::from(present)))
    }

    /// DEL key [key ...]
    fn cmd_del(&self, keys: &[Bytes]) -> Result<RespValue, CommandError> {
        let mut keyspace = self.keyspace.borrow_mut();
        let removed = keys.iter().filter(|key| keyspace.delete(key)).count();
        Ok(RespValue::integer(removed as i64))
    }

    /// INCR key / DECR key
    ///
    /// The expiry of the key is left as it was.
    fn cmd_step(&self, key: &Bytes, delta: i64) -> Result<RespValue, CommandError> {
        let mut keyspace = self.keyspace.borrow_mut();
        let Some(entry) = keyspace.get_live_mut(key) else {
            return Ok(RespValue::null());
        };

        let current = entry.value.as_integer().ok_or(CommandError::NotAnInteger)?;
        let next = current.checked_add(delta).ok_or(CommandError::Overflow)?;
        entry.value = Value::Integer(next);
        Ok(RespValue::integer(next))
    }

    /// LPUSH / RPUSH key value [value ...]
    ///
    /// Values are pushed one at a time, so LPUSH leaves the last argument at
    /// the head of the list.
    fn cmd_push(
        &self,
        key: &Bytes,
        values: &[Bytes],
        end: ListEnd,
    ) -> Result<RespValue, CommandError> {
        let mut keyspace = self.keyspace.borrow_mut();
        let len = match keyspace.get_live_mut(key) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => {
                push_all(list, values, end);
                list.len()
            }
            Some(_) => return Err(CommandError::WrongType),
            None => {
                let mut list = VecDeque::with_capacity(values.len());
                push_all(&mut list, values, end);
                let len = list.len();
                keyspace.put(key.clone(), Value::List(list), None);
                len
            }
        };
        Ok(RespValue::integer(len as i64))
    }

    /// GET key
    fn cmd_get(&self, key: &Bytes) -> Result<RespValue, CommandError> {
        let mut keyspace = self.keyspace.borrow_mut();
        Ok(match keyspace.get_live(key) {
            Some(entry) => entry.value.clone().into(),
            None => RespValue::null(),
        })
    }

    /// SET key value [EX seconds | PX milliseconds | EXAT unix-s | PXAT unix-ms]
    ///
    /// Always overwrites, including the expiry: no option means no expiry.
    fn cmd_set(
        &self,
        key: &Bytes,
        value: &Bytes,
        options: &[Bytes],
    ) -> Result<RespValue, CommandError> {
        let expiry = parse_set_expiry(options)?;
        let mut keyspace = self.keyspace.borrow_mut();
        let expires_at = expiry.map(|expiry| expiry.resolve(keyspace.now_millis()));
        keyspace.put(key.clone(), Value::Text(value.clone()), expires_at);
        Ok(RespValue::ok())
    }

    /// SAVE
    fn cmd_save(&self) -> Result<RespValue, CommandError> {
        let keyspace = self.keyspace.borrow();
        match self.snapshots.save(&keyspace) {
            Ok(_) => Ok(RespValue::ok()),
            Err(e) => {
                error!(
                    path = %self.snapshots.path().display(),
                    error = %e,
                    "SAVE failed"
                );
                Err(CommandError::Snapshot(e.to_string()))
            }
        }
    }
}

fn push_all(list: &mut VecDeque<Bytes>, values: &[Bytes], end: ListEnd) {
    for value in values {
        match end {
            ListEnd::Head => list.push_front(value.clone()),
            ListEnd::Tail => list.push_back(value.clone()),
        }
    }
}
