//! Snapshot Store
//!
//! Serializes the whole key space to one file and restores it at startup.
//!
//! ## Format
//!
//! All integers are little-endian.
//!
//! ```text
//! magic      8 bytes   "RKVSNAP\0"
//! version    u16       1
//! count      u32       number of entries
//! entry*     flag u8 (0 | 1) [expires_at u64 millis]
//!            key_len u32, key bytes
//!            tag u8: 0 Nil
//!                    1 Integer  i64
//!                    2 Text     len u32, bytes
//!                    3 List     count u32, (len u32, bytes)*
//! ```
//!
//! Files are written to `<path>.tmp` and renamed over the target, so a failed
//! SAVE leaves the previous snapshot intact.

use crate::storage::keyspace::Keyspace;
use crate::storage::value::{Entry, Value};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Fixed marker at the start of every snapshot file.
const SNAPSHOT_MAGIC: &[u8; 8] = b"RKVSNAP\0";
const SNAPSHOT_VERSION: u16 = 1;

mod tag {
    pub const NIL: u8 = 0;
    pub const INTEGER: u8 = 1;
    pub const TEXT: u8 = 2;
    pub const LIST: u8 = 3;
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid snapshot magic")]
    InvalidMagic,

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u16),

    #[error("snapshot truncated at offset {offset} (needed {needed} more bytes)")]
    Truncated { offset: usize, needed: usize },

    #[error("invalid {field} {value} in entry {index}")]
    InvalidTag {
        field: &'static str,
        value: u8,
        index: usize,
    },

    #[error("{0} trailing bytes after the last entry")]
    TrailingBytes(usize),

    #[error("{0} exceeds u32::MAX")]
    TooLarge(&'static str),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Reads and writes the snapshot file at a fixed path.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes every live entry of `keyspace`. Returns the number written.
    pub fn save(&self, keyspace: &Keyspace) -> SnapshotResult<usize> {
        let (payload, written) = encode_snapshot(keyspace)?;

        let tmp_path = self.tmp_path();
        let result =
            write_synced(&tmp_path, &payload).and_then(|()| fs::rename(&tmp_path, &self.path));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        info!(
            path = %self.path.display(),
            keys = written,
            bytes = payload.len(),
            "Snapshot saved"
        );
        Ok(written)
    }

    /// Reads the snapshot file, or `None` if it does not exist.
    pub fn load(&self) -> SnapshotResult<Option<HashMap<Bytes, Entry>>> {
        let payload = match fs::read(&self.path) {
            Ok(payload) => payload,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot file");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        decode_snapshot(&payload).map(Some)
    }

    /// Replaces the contents of `keyspace` with the snapshot, if one exists.
    ///
    /// Returns the number of entries loaded.
    pub fn load_into(&self, keyspace: &mut Keyspace) -> SnapshotResult<usize> {
        match self.load()? {
            Some(entries) => {
                let count = entries.len();
                keyspace.replace_all(entries);
                info!(path = %self.path.display(), keys = count, "Snapshot loaded");
                Ok(count)
            }
            None => {
                info!(path = %self.path.display(), "No snapshot found, starting empty");
                Ok(0)
            }
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

fn write_synced(path: &Path, payload: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(payload)?;
    file.sync_all()
}

/// Encodes the live entries of `keyspace`.
///
/// Returns the payload and the number of entries it holds. Entries that have
/// already expired are skipped.
pub fn encode_snapshot(keyspace: &Keyspace) -> SnapshotResult<(Bytes, usize)> {
    let now = keyspace.now_millis();
    let live: Vec<(&Bytes, &Entry)> = keyspace
        .iter()
        .filter(|(_, entry)| !entry.is_expired(now))
        .collect();

    let mut out = BytesMut::with_capacity(64 + live.len() * 32);
    out.put_slice(SNAPSHOT_MAGIC);
    out.put_u16_le(SNAPSHOT_VERSION);
    out.put_u32_le(to_u32_len(live.len(), "entry count")?);

    for (key, entry) in &live {
        match entry.expires_at {
            Some(expires_at) => {
                out.put_u8(1);
                out.put_u64_le(expires_at);
            }
            None => out.put_u8(0),
        }
        put_len_prefixed(&mut out, key, "key length")?;
        put_value(&mut out, &entry.value)?;
    }

    Ok((out.freeze(), live.len()))
}

/// Decodes a snapshot payload into entries.
pub fn decode_snapshot(payload: &[u8]) -> SnapshotResult<HashMap<Bytes, Entry>> {
    let mut cursor = SnapshotCursor::new(payload);

    if cursor.read_slice(SNAPSHOT_MAGIC.len())? != SNAPSHOT_MAGIC {
        return Err(SnapshotError::InvalidMagic);
    }
    let version = cursor.read_u16()?;
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }

    let count = cursor.read_u32()? as usize;
    let mut entries = HashMap::with_capacity(count.min(1 << 16));

    for index in 0..count {
        let expires_at = match cursor.read_u8()? {
            0 => None,
            1 => Some(cursor.read_u64()?),
            flag => {
                return Err(SnapshotError::InvalidTag {
                    field: "expiry flag",
                    value: flag,
                    index,
                })
            }
        };
        let key = cursor.read_len_prefixed()?;
        let value = match cursor.read_u8()? {
            tag::NIL => Value::Nil,
            tag::INTEGER => Value::Integer(cursor.read_i64()?),
            tag::TEXT => Value::Text(cursor.read_len_prefixed()?),
            tag::LIST => {
                let len = cursor.read_u32()? as usize;
                let mut items = VecDeque::with_capacity(len.min(1 << 16));
                for _ in 0..len {
                    items.push_back(cursor.read_len_prefixed()?);
                }
                Value::List(items)
            }
            other => {
                return Err(SnapshotError::InvalidTag {
                    field: "value tag",
                    value: other,
                    index,
                })
            }
        };
        entries.insert(key, Entry::with_expiry(value, expires_at));
    }

    match cursor.remaining() {
        0 => Ok(entries),
        extra => Err(SnapshotError::TrailingBytes(extra)),
    }
}

fn put_value(out: &mut BytesMut, value: &Value) -> SnapshotResult<()> {
    match value {
        Value::Nil => out.put_u8(tag::NIL),
        Value::Integer(n) => {
            out.put_u8(tag::INTEGER);
            out.put_i64_le(*n);
        }
        Value::Text(data) => {
            out.put_u8(tag::TEXT);
            put_len_prefixed(out, data, "text length")?;
        }
        Value::List(items) => {
            out.put_u8(tag::LIST);
            out.put_u32_le(to_u32_len(items.len(), "list length")?);
            for item in items {
                put_len_prefixed(out, item, "list element length")?;
            }
        }
    }
    Ok(())
}

fn put_len_prefixed(out: &mut BytesMut, data: &[u8], field: &'static str) -> SnapshotResult<()> {
    out.put_u32_le(to_u32_len(data.len(), field)?);
    out.put_slice(data);
    Ok(())
}

fn to_u32_len(len: usize, field: &'static str) -> SnapshotResult<u32> {
    u32::try_from(len).map_err(|_| SnapshotError::TooLarge(field))
}

/// Byte reader that bounds-checks before every `Buf` read.
struct SnapshotCursor<'a> {
    buf: &'a [u8],
    total: usize,
}

impl<'a> SnapshotCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            total: buf.len(),
        }
    }

    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, needed: usize) -> SnapshotResult<()> {
        if self.buf.remaining() < needed {
            return Err(SnapshotError::Truncated {
                offset: self.total - self.buf.remaining(),
                needed: needed - self.buf.remaining(),
            });
        }
        Ok(())
    }

    fn read_slice(&mut self, len: usize) -> SnapshotResult<&'a [u8]> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn read_u8(&mut self) -> SnapshotResult<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    fn read_u16(&mut self) -> SnapshotResult<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    fn read_u32(&mut self) -> SnapshotResult<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn read_u64(&mut self) -> SnapshotResult<u64> {
        self.ensure(8)?;
        Ok(self.buf.get_u64_le())
    }

    fn read_i64(&mut self) -> SnapshotResult<i64> {
        self.ensure(8)?;
        Ok(self.buf.get_i64_le())
    }

    fn read_len_prefixed(&mut self) -> SnapshotResult<Bytes> {
        let len = self.read_u32()? as usize;
        self.read_slice(len).map(Bytes::copy_from_slice)
    }
}
