//! The Key Space
//!
//! A plain owned map from key to [`Entry`]. There is no locking inside: the
//! server runs every command on one thread, and the map is shared between
//! connection tasks as [`SharedKeyspace`], whose `RefCell` borrow is never
//! held across an `.await`. At most one command mutates the map at a time.
//!
//! ## Lazy Expiry
//!
//! Expiry is enforced in exactly one place, [`Keyspace::get_live`] (and its
//! `_mut` twin). An expired entry stays in the map until something reads that
//! key, at which point it is removed and reported as absent. The optional
//! [`ExpirySweeper`](crate::storage::ExpirySweeper) can reclaim keys that are
//! never read again.

use crate::storage::clock::{Clock, SystemClock};
use crate::storage::value::{Entry, Value};
use bytes::Bytes;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

/// The key space as shared by every task on the server thread.
pub type SharedKeyspace = Rc<RefCell<Keyspace>>;

/// Mapping from key to typed, optionally expiring entry.
///
/// # Example
///
/// ```
/// use respkv::storage::{Keyspace, ManualClock, Value};
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let clock = ManualClock::new(0);
/// let mut keyspace = Keyspace::with_clock(Rc::new(clock.clone()));
///
/// keyspace.put("session".into(), Value::text("abc"), Some(1_000));
/// assert!(keyspace.contains_live(b"session"));
///
/// clock.advance(Duration::from_secs(1));
/// assert!(keyspace.get_live(b"session").is_none());
/// assert!(keyspace.is_empty());
/// ```
pub struct Keyspace {
    entries: HashMap<Bytes, Entry>,
    clock: Rc<dyn Clock>,
    /// Number of entries removed because they had expired
    expired_total: u64,
}

impl fmt::Debug for Keyspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyspace")
            .field("keys", &self.entries.len())
            .field("expired_total", &self.expired_total)
            .field("clock", &self.clock)
            .finish()
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyspace {
    /// Creates an empty key space on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Rc::new(SystemClock))
    }

    pub fn with_clock(clock: Rc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            clock,
            expired_total: 0,
        }
    }

    /// Wraps the key space for sharing between connection tasks.
    pub fn into_shared(self) -> SharedKeyspace {
        Rc::new(RefCell::new(self))
    }

    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Returns the entry for `key` if it exists and has not expired.
    ///
    /// An expired entry is deleted before `None` is returned.
    pub fn get_live(&mut self, key: &[u8]) -> Option<&Entry> {
        self.evict_if_expired(key);
        self.entries.get(key)
    }

    /// Mutable form of [`get_live`](Self::get_live).
    pub fn get_live_mut(&mut self, key: &[u8]) -> Option<&mut Entry> {
        self.evict_if_expired(key);
        self.entries.get_mut(key)
    }

    pub fn contains_live(&mut self, key: &[u8]) -> bool {
        self.get_live(key).is_some()
    }

    /// Stores `value` under `key`, replacing any previous entry and expiry.
    pub fn put(&mut self, key: Bytes, value: Value, expires_at: Option<u64>) {
        self.entries.insert(key, Entry::with_expiry(value, expires_at));
    }

    /// Removes `key` whether or not it had expired.
    ///
    /// Returns `true` if an entry was present.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Number of physically present entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn expired_total(&self) -> u64 {
        self.expired_total
    }

    /// Removes every entry that has expired. Returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - self.entries.len();
        self.expired_total += removed as u64;
        removed
    }

    /// Iterates over every physically present entry.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Entry)> {
        self.entries.iter()
    }

    /// Replaces the whole contents, as when a snapshot is loaded.
    pub fn replace_all(&mut self, entries: HashMap<Bytes, Entry>) {
        self.entries = entries;
    }

    fn evict_if_expired(&mut self, key: &[u8]) {
        let now = self.clock.now_millis();
        if self
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(now))
        {
            self.entries.remove(key);
            self.expired_total += 1;
            trace!(key = %String::from_utf8_lossy(key), "lazily expired key");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::clock::ManualClock;
    use std::time::Duration;

    fn keyspace_at(start_ms: u64) -> (Keyspace, ManualClock) {
        let clock = ManualClock::new(start_ms);
        (Keyspace::with_clock(Rc::new(clock.clone())), clock)
    }

    #[test]
    fn test_put_and_get() {
        let (mut ks, _) = keyspace_at(0);
        ks.put(Bytes::from("key"), Value::text("value"), None);
        assert_eq!(
            ks.get_live(b"key").map(|e| &e.value),
            Some(&Value::text("value"))
        );
    }

    #[test]
    fn test_get_nonexistent() {
        let (mut ks, _) = keyspace_at(0);
        assert!(ks.get_live(b"nonexistent").is_none());
    }

    #[test]
    fn test_put_overwrites_expiry() {
        let (mut ks, clock) = keyspace_at(0);
        ks.put(Bytes::from("k"), Value::text("v1"), Some(100));
        ks.put(Bytes::from("k"), Value::text("v2"), None);
        clock.advance(Duration::from_secs(10));
        assert_eq!(ks.get_live(b"k").map(|e| e.expires_at), Some(None));
    }

    #[test]
    fn test_expired_entry_stays_until_read() {
        let (mut ks, clock) = keyspace_at(0);
        ks.put(Bytes::from("k"), Value::text("v"), Some(50));
        clock.advance(Duration::from_millis(60));

        // Nothing has touched the key yet.
        assert_eq!(ks.len(), 1);

        assert!(!ks.contains_live(b"k"));
        assert_eq!(ks.len(), 0);
        assert_eq!(ks.expired_total(), 1);
    }

    #[test]
    fn test_delete_counts_expired_entries() {
        let (mut ks, clock) = keyspace_at(0);
        ks.put(Bytes::from("k"), Value::text("v"), Some(10));
        clock.advance(Duration::from_millis(20));
        assert!(ks.delete(b"k"));
        assert!(!ks.delete(b"k"));
    }

    #[test]
    fn test_get_live_mut_preserves_expiry() {
        let (mut ks, _) = keyspace_at(0);
        ks.put(Bytes::from("n"), Value::Integer(1), Some(500));
        if let Some(entry) = ks.get_live_mut(b"n") {
            entry.value = Value::Integer(2);
        }
        let entry = ks.get_live(b"n").cloned();
        assert_eq!(entry, Some(Entry::with_expiry(Value::Integer(2), Some(500))));
    }

    #[test]
    fn test_purge_expired() {
        let (mut ks, clock) = keyspace_at(0);
        for i in 0..10 {
            ks.put(Bytes::from(format!("short{}", i)), Value::text("v"), Some(10));
        }
        ks.put(Bytes::from("long"), Value::text("v"), Some(10_000));
        ks.put(Bytes::from("forever"), Value::text("v"), None);

        clock.advance(Duration::from_millis(10));
        assert_eq!(ks.purge_expired(), 10);
        assert_eq!(ks.len(), 2);
        assert!(ks.contains_live(b"long"));
        assert!(ks.contains_live(b"forever"));
    }
}
