//! Cache Entries
//!
//! A [`CacheEntry`] is the unit of storage: key, opaque value, client flags,
//! the expiration the client asked for, the handle of the scheduled deletion
//! (if any) and the [`VisitorTree`] that gates `cas`.
//!
//! Entries are owned by the engine's LRU list; nothing outside the storage
//! module holds a reference to one.

use crate::storage::visitors::VisitorTree;
use bytes::{Bytes, BytesMut};
use tokio::time::Instant;

/// The writable fields of a storage command, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: String,
    /// Opaque client flags.
    pub flags: u16,
    /// Seconds to live. `0` never expires, negative is already expired.
    pub exptime: i64,
    /// Declared length of `value`.
    pub bytes: usize,
    pub value: Bytes,
}

impl Item {
    pub fn new(key: impl Into<String>, flags: u16, exptime: i64, value: impl Into<Bytes>) -> Self {
        let value = value.into();
        Self {
            key: key.into(),
            flags,
            exptime,
            bytes: value.len(),
            value,
        }
    }
}

/// How an update combines the incoming value with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Replace,
    Append,
    Prepend,
}

/// Handle of the scheduled deletion of an entry.
///
/// It is the key of the entry's slot in the engine's expiration schedule;
/// removing that slot cancels the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct TimerHandle {
    pub(crate) deadline: Instant,
    pub(crate) timer_id: u64,
}

#[derive(Debug)]
pub struct CacheEntry {
    key: String,
    flags: u16,
    exptime: i64,
    byte_len: usize,
    value: Bytes,
    pub(crate) timer: Option<TimerHandle>,
    visitors: VisitorTree,
}

impl CacheEntry {
    /// Creates an entry whose only visitor is its creator.
    pub fn new(item: Item, requester_id: u64) -> Self {
        Self {
            key: item.key,
            flags: item.flags,
            exptime: item.exptime,
            byte_len: item.bytes,
            value: item.value,
            timer: None,
            visitors: VisitorTree::with_visitor(requester_id),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn exptime(&self) -> i64 {
        self.exptime
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn visitors(&self) -> &VisitorTree {
        &self.visitors
    }

    /// Records a read by `requester_id` without forgetting earlier visitors.
    pub fn visit(&mut self, requester_id: u64) {
        self.visitors.insert(requester_id);
    }

    /// Overwrites metadata, combines the value per `mode`, and resets the
    /// visitor set to just `requester_id`.
    pub fn apply(
        &mut self,
        flags: u16,
        exptime: i64,
        bytes: usize,
        value: Bytes,
        mode: StoreMode,
        requester_id: u64,
    ) {
        self.flags = flags;
        match mode {
            StoreMode::Replace => {
                self.value = value;
                self.byte_len = bytes;
            }
            StoreMode::Append => {
                self.value = concat(&self.value, &value);
                self.byte_len += bytes;
            }
            StoreMode::Prepend => {
                self.value = concat(&value, &self.value);
                self.byte_len += bytes;
            }
        }
        self.exptime = exptime;
        self.visitors.clear();
        self.visitors.insert(requester_id);
        debug_assert_eq!(self.byte_len, self.value.len());
    }

    pub(crate) fn clear_visitors(&mut self) {
        self.visitors.clear();
    }

    /// Returns `true` if the scheduled deletion is due at `now`.
    pub(crate) fn is_expired_at(&self, now: Instant) -> bool {
        self.timer.is_some_and(|timer| timer.deadline <= now)
    }

    pub fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            key: self.key.clone(),
            flags: self.flags,
            exptime: self.exptime,
            bytes: self.byte_len,
            value: self.value.clone(),
        }
    }
}

/// A read-only copy of an entry's visible state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub key: String,
    pub flags: u16,
    pub exptime: i64,
    pub bytes: usize,
    pub value: Bytes,
}

fn concat(front: &[u8], back: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(front.len() + back.len());
    buf.extend_from_slice(front);
    buf.extend_from_slice(back);
    buf.freeze()
}
