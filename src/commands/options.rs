//! SET option parsing.
//!
//! Options follow `SET key value` and are read two at a time:
//! `EX seconds`, `PX milliseconds`, `EXAT unix-seconds`, `PXAT unix-milliseconds`.
//! They are scanned left to right and the last expiry option wins, so
//! `SET k v EX 100 PX 5` expires after 5 ms.

use crate::commands::error::CommandError;
use bytes::Bytes;

const MILLIS_PER_SEC: i64 = 1_000;

/// One expiry option as written by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetExpiry {
    Seconds(i64),
    Milliseconds(i64),
    UnixSeconds(i64),
    UnixMillis(i64),
}

impl SetExpiry {
    /// Offset from `now_ms` in milliseconds. May be zero or negative.
    ///
    /// Absolute forms are turned into an offset against "now"; EXAT compares
    /// whole seconds, so the sub-second part of `now_ms` carries over.
    pub fn offset_millis(self, now_ms: u64) -> i64 {
        let now_ms = i64::try_from(now_ms).unwrap_or(i64::MAX);
        match self {
            SetExpiry::Seconds(secs) => secs.saturating_mul(MILLIS_PER_SEC),
            SetExpiry::Milliseconds(ms) => ms,
            SetExpiry::UnixSeconds(at) => at
                .saturating_sub(now_ms / MILLIS_PER_SEC)
                .saturating_mul(MILLIS_PER_SEC),
            SetExpiry::UnixMillis(at) => at.saturating_sub(now_ms),
        }
    }

    /// Absolute expiry in Unix milliseconds.
    pub fn resolve(self, now_ms: u64) -> u64 {
        now_ms.saturating_add_signed(self.offset_millis(now_ms))
    }
}

/// Parses the options after `SET key value`.
///
/// Returns `None` when no expiry option is present, which clears any expiry
/// the key had before.
pub fn parse_set_expiry(options: &[Bytes]) -> Result<Option<SetExpiry>, CommandError> {
    let mut expiry = None;

    for pair in options.chunks(2) {
        let [name, raw] = pair else {
            return Err(CommandError::Syntax);
        };
        let amount = parse_i64(raw)?;

        expiry = Some(if name.eq_ignore_ascii_case(b"EX") {
            SetExpiry::Seconds(amount)
        } else if name.eq_ignore_ascii_case(b"PX") {
            SetExpiry::Milliseconds(amount)
        } else if name.eq_ignore_ascii_case(b"EXAT") {
            SetExpiry::UnixSeconds(amount)
        } else if name.eq_ignore_ascii_case(b"PXAT") {
            SetExpiry::UnixMillis(amount)
        } else {
            return Err(CommandError::Syntax);
        });
    }

    Ok(expiry)
}

pub(crate) fn parse_i64(raw: &[u8]) -> Result<i64, CommandError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::InvalidNumber)
}
