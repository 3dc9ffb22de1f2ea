//! LRU Storage Engine with Visitor-Gated CAS
//!
//! This module implements the storage engine behind every memcached command
//! memlru understands. It is a bounded, item-count LRU cache whose entries
//! carry a [`VisitorTree`](crate::storage::visitors::VisitorTree) used to
//! decide `cas` writes.
//!
//! ## Design Decisions
//!
//! 1. **One Lock**: every operation mutates the global `head`/`tail` of the
//!    recency list, so the whole cache sits behind a single `Mutex`. Critical
//!    sections are short and never await.
//! 2. **Arena Ownership**: entries live in an [`LruList`] slot arena and the key
//!    index maps to `SlotId`s. No pointer to an entry leaves this module.
//! 3. **Engine-Owned Timers**: each entry with a positive expiration holds a
//!    [`TimerHandle`] into an ordered expiration schedule. The background
//!    expiry task sleeps until the earliest deadline and then purges under
//!    the same lock. Writes cancel and replace the handle.
//! 4. **Lazy Expiry**: operations also drop their key first if its deadline
//!    has passed, so a late purge is never observable.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Mutex<CacheState>                         │
//! │                                                              │
//! │  index: HashMap<String, SlotId>                              │
//! │            │                                                 │
//! │            ▼                                                 │
//! │  lru:   head ─► [entry] ◄─► [entry] ◄─► [entry] ◄─ tail      │
//! │                    │                                         │
//! │                    └─ timer ─► expirations: BTreeMap         │
//! │                                  (deadline, id) -> key       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## CAS Semantics
//!
//! `gets` does not hand out a per-item version. The CAS value it reports is
//! the caller's own requester id, and `cas` succeeds only if that id is in the
//! entry's visitor set: the caller (or the creator) must have touched the
//! entry since its last write. A requester that never read the entry cannot
//! `cas` it, and two connections cannot `cas` on each other's behalf.

use crate::storage::entry::{CacheEntry, EntrySnapshot, Item, StoreMode, TimerHandle};
use crate::storage::lru::{LruList, SlotId};
use bytes::Bytes;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

/// Default maximum number of items.
pub const DEFAULT_LIMIT: usize = 100;

/// Outcome of a storage command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    Stored,
    NotStored,
    /// The item was modified since the requester last saw it.
    Exists,
    NotFound,
}

impl StoreStatus {
    fn stored_if(stored: bool) -> Self {
        if stored {
            StoreStatus::Stored
        } else {
            StoreStatus::NotStored
        }
    }

    /// Applies `noreply`: the status is dropped when no reply was requested.
    fn reply(self, noreply: bool) -> Option<Self> {
        (!noreply).then_some(self)
    }
}

/// One hit of a `get`/`gets` lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedValue {
    pub key: String,
    pub flags: u16,
    pub bytes: usize,
    /// Present for `gets`: the requester id of the caller.
    pub cas: Option<u64>,
    pub value: Bytes,
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Items currently stored
    pub items: usize,
    /// Configured maximum number of items
    pub limit: usize,
    /// Keys looked up by get/gets
    pub cmd_get: u64,
    /// Storage commands executed
    pub cmd_set: u64,
    pub get_hits: u64,
    pub get_misses: u64,
    pub cas_hits: u64,
    /// `cas` rejected with EXISTS
    pub cas_badval: u64,
    pub cas_misses: u64,
    /// Items dropped to make room
    pub evictions: u64,
    /// Items dropped because their expiration passed
    pub expired: u64,
}

#[derive(Debug)]
struct CacheState {
    index: HashMap<String, SlotId>,
    lru: LruList<CacheEntry>,
    expirations: BTreeMap<TimerHandle, String>,
    next_timer_id: u64,
    limit: usize,
    evictions: u64,
    expired: u64,
    /// Set when a new earliest deadline was scheduled.
    wake_expiry_task: bool,
}

impl CacheState {
    fn new(limit: usize) -> Self {
        Self {
            index: HashMap::with_capacity(limit),
            lru: LruList::with_capacity(limit),
            expirations: BTreeMap::new(),
            next_timer_id: 0,
            limit,
            evictions: 0,
            expired: 0,
            wake_expiry_task: false,
        }
    }

    fn entry(&self, key: &str) -> Option<&CacheEntry> {
        self.index.get(key).and_then(|&id| self.lru.get(id))
    }

    /// Drops `key` if its deadline has passed.
    fn purge_if_expired(&mut self, key: &str, now: Instant) {
        match self.entry(key) {
            Some(entry) if entry.is_expired_at(now) => {}
            _ => return,
        }
        self.delete_entry(key);
        self.expired += 1;
        debug!(key = %key, "Expired item removed on access");
    }

    /// Stores a new item. Hands the item back if the key is taken or the
    /// expiration is negative.
    fn add(&mut self, item: Item, requester_id: u64, now: Instant) -> Result<(), Item> {
        self.purge_if_expired(&item.key, now);
        if self.index.contains_key(&item.key) || item.exptime < 0 {
            return Err(item);
        }

        self.ensure_capacity();

        let key = item.key.clone();
        let exptime = item.exptime;
        let id = self.lru.push_front(CacheEntry::new(item, requester_id));
        self.index.insert(key, id);
        if exptime > 0 {
            self.schedule(id, exptime, now);
        }
        Ok(())
    }

    /// The shared write path of replace/append/prepend/set.
    ///
    /// Returns `false` if the key is absent or the new expiration is negative
    /// (in which case the entry is deleted).
    fn update(&mut self, item: Item, requester_id: u64, mode: StoreMode, now: Instant) -> bool {
        self.purge_if_expired(&item.key, now);
        let Some(&id) = self.index.get(&item.key) else {
            return false;
        };
        let Item {
            key,
            flags,
            exptime,
            bytes,
            value,
        } = item;

        let Some(entry) = self.lru.get_mut(id) else {
            return false;
        };
        entry.apply(flags, exptime, bytes, value, mode, requester_id);
        self.lru.move_to_front(id);

        match exptime.cmp(&0) {
            CmpOrdering::Greater => {
                self.schedule(id, exptime, now);
                true
            }
            CmpOrdering::Equal => {
                self.cancel_timer(id);
                true
            }
            CmpOrdering::Less => {
                self.delete_entry(&key);
                false
            }
        }
    }

    /// Unconditional upsert: add, falling back to replace.
    fn set(&mut self, item: Item, requester_id: u64, now: Instant) -> StoreStatus {
        match self.add(item, requester_id, now) {
            Ok(()) => StoreStatus::Stored,
            Err(item) => {
                StoreStatus::stored_if(self.update(item, requester_id, StoreMode::Replace, now))
            }
        }
    }

    fn cas(&mut self, item: Item, cas_token: u64, now: Instant) -> StoreStatus {
        self.purge_if_expired(&item.key, now);
        match self.entry(&item.key) {
            None => StoreStatus::NotFound,
            Some(entry) if !entry.visitors().contains(cas_token) => StoreStatus::Exists,
            Some(_) => self.set(item, cas_token, now),
        }
    }

    /// Marks `key` as used by `requester_id` and returns its value.
    fn touch(
        &mut self,
        key: &str,
        requester_id: u64,
        with_cas: bool,
        now: Instant,
    ) -> Option<RetrievedValue> {
        self.purge_if_expired(key, now);
        let &id = self.index.get(key)?;
        self.lru.move_to_front(id);
        let entry = self.lru.get_mut(id)?;
        entry.visit(requester_id);
        Some(RetrievedValue {
            key: entry.key().to_string(),
            flags: entry.flags(),
            bytes: entry.byte_len(),
            cas: with_cas.then_some(requester_id),
            value: entry.value().clone(),
        })
    }

    /// Unlinks and drops `key`, cancelling its timer and forgetting its visitors.
    fn delete_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let id = self.index.remove(key)?;
        let mut entry = self.lru.remove(id)?;
        if let Some(timer) = entry.timer.take() {
            self.expirations.remove(&timer);
        }
        entry.clear_visitors();
        Some(entry)
    }

    /// Evicts the least recently used entry if the cache is full.
    fn ensure_capacity(&mut self) {
        if self.index.len() < self.limit {
            return;
        }
        let Some(tail_key) = self
            .lru
            .back_id()
            .and_then(|id| self.lru.get(id))
            .map(|entry| entry.key().to_string())
        else {
            return;
        };
        self.delete_entry(&tail_key);
        self.evictions += 1;
        debug!(key = %tail_key, limit = self.limit, "Evicted least recently used item");
    }

    /// (Re)schedules deletion of `id` in `exptime` seconds.
    fn schedule(&mut self, id: SlotId, exptime: i64, now: Instant) {
        self.cancel_timer(id);

        let ttl = Duration::from_secs(exptime.unsigned_abs());
        // Deadlines past the clock's range never fire.
        let Some(deadline) = now.checked_add(ttl) else {
            return;
        };
        let Some(key) = self.lru.get(id).map(|entry| entry.key().to_string()) else {
            return;
        };

        let timer = TimerHandle {
            deadline,
            timer_id: self.next_timer_id,
        };
        self.next_timer_id += 1;

        if self.next_deadline().map_or(true, |next| next > deadline) {
            self.wake_expiry_task = true;
        }
        self.expirations.insert(timer, key);
        if let Some(entry) = self.lru.get_mut(id) {
            entry.timer = Some(timer);
        }
    }

    fn cancel_timer(&mut self, id: SlotId) {
        if let Some(timer) = self.lru.get_mut(id).and_then(|entry| entry.timer.take()) {
            self.expirations.remove(&timer);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.expirations.keys().next().map(|timer| timer.deadline)
    }

    fn clear(&mut self) {
        self.index.clear();
        self.lru.clear();
        self.expirations.clear();
    }
}

/// The shared cache.
///
/// Wrap it in an `Arc` and hand a clone to every connection; all operations
/// take `&self` and serialize on an internal lock.
///
/// # Example
///
/// ```
/// use memlru::storage::{Item, StorageEngine, StoreStatus};
///
/// let engine = StorageEngine::with_limit(10);
///
/// let status = engine.add(Item::new("hola", 13, 0, "HOLA"), 1, false);
/// assert_eq!(status, Some(StoreStatus::Stored));
///
/// let hits = engine.gets(&["hola"], 2);
/// assert_eq!(hits[0].cas, Some(2));
///
/// let status = engine.cas(Item::new("hola", 13, 0, "LAST"), 2, false);
/// assert_eq!(status, Some(StoreStatus::Stored));
/// ```
pub struct StorageEngine {
    state: Mutex<CacheState>,

    /// Wakes the expiry task when an earlier deadline is scheduled.
    expiry_notify: Notify,

    /// Statistics: keys looked up
    get_count: AtomicU64,

    /// Statistics: storage commands
    set_count: AtomicU64,

    get_hits: AtomicU64,
    get_misses: AtomicU64,
    cas_hits: AtomicU64,
    cas_badval: AtomicU64,
    cas_misses: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("StorageEngine")
            .field("items", &state.index.len())
            .field("limit", &state.limit)
            .field("timers", &state.expirations.len())
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an engine holding at most [`DEFAULT_LIMIT`] items.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_LIMIT)
    }

    /// Creates an engine holding at most `limit` items (at least one).
    pub fn with_limit(limit: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::new(limit.max(1))),
            expiry_notify: Notify::new(),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            get_hits: AtomicU64::new(0),
            get_misses: AtomicU64::new(0),
            cas_hits: AtomicU64::new(0),
            cas_badval: AtomicU64::new(0),
            cas_misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` under the engine lock, then wakes the expiry task if `f`
    /// scheduled a new earliest deadline.
    fn with_state<R>(&self, f: impl FnOnce(&mut CacheState, Instant) -> R) -> R {
        let mut state = self.lock();
        let result = f(&mut state, Instant::now());
        let wake = std::mem::take(&mut state.wake_expiry_task);
        drop(state);

        if wake {
            self.expiry_notify.notify_one();
        }
        result
    }

    /// Stores `item` only if its key is absent.
    ///
    /// Evicts the least recently used item when the cache is full. A negative
    /// expiration is rejected with `NOT_STORED`.
    pub fn add(&self, item: Item, requester_id: u64, noreply: bool) -> Option<StoreStatus> {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        let stored = self.with_state(|state, now| state.add(item, requester_id, now).is_ok());
        StoreStatus::stored_if(stored).reply(noreply)
    }

    /// Overwrites an existing item.
    pub fn replace(&self, item: Item, requester_id: u64, noreply: bool) -> Option<StoreStatus> {
        self.store(item, requester_id, StoreMode::Replace, noreply)
    }

    /// Appends to an existing item's value. Flags and expiration are replaced
    /// by the ones supplied.
    pub fn append(&self, item: Item, requester_id: u64, noreply: bool) -> Option<StoreStatus> {
        self.store(item, requester_id, StoreMode::Append, noreply)
    }

    /// Prepends to an existing item's value. Flags and expiration are replaced
    /// by the ones supplied.
    pub fn prepend(&self, item: Item, requester_id: u64, noreply: bool) -> Option<StoreStatus> {
        self.store(item, requester_id, StoreMode::Prepend, noreply)
    }

    fn store(
        &self,
        item: Item,
        requester_id: u64,
        mode: StoreMode,
        noreply: bool,
    ) -> Option<StoreStatus> {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        let stored = self.with_state(|state, now| state.update(item, requester_id, mode, now));
        StoreStatus::stored_if(stored).reply(noreply)
    }

    /// Stores `item` whether or not its key exists.
    pub fn set(&self, item: Item, requester_id: u64, noreply: bool) -> Option<StoreStatus> {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        let status = self.with_state(|state, now| state.set(item, requester_id, now));
        status.reply(noreply)
    }

    /// Stores `item` only if `cas_token` has visited the entry since its
    /// last write.
    ///
    /// - `NOT_FOUND` if the key is absent
    /// - `EXISTS` if `cas_token` is not a visitor
    /// - otherwise behaves as `set` with `cas_token` as the requester
    pub fn cas(&self, item: Item, cas_token: u64, noreply: bool) -> Option<StoreStatus> {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        let status = self.with_state(|state, now| state.cas(item, cas_token, now));
        let counter = match status {
            StoreStatus::NotFound => &self.cas_misses,
            StoreStatus::Exists => &self.cas_badval,
            _ => &self.cas_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        status.reply(noreply)
    }

    /// Looks up `keys`, marking each hit as used by `requester_id`.
    pub fn get<K: AsRef<str>>(&self, keys: &[K], requester_id: u64) -> Vec<RetrievedValue> {
        self.retrieve(keys, requester_id, false)
    }

    /// Like [`get`](Self::get), with `requester_id` reported as each hit's CAS value.
    pub fn gets<K: AsRef<str>>(&self, keys: &[K], requester_id: u64) -> Vec<RetrievedValue> {
        self.retrieve(keys, requester_id, true)
    }

    fn retrieve<K: AsRef<str>>(
        &self,
        keys: &[K],
        requester_id: u64,
        with_cas: bool,
    ) -> Vec<RetrievedValue> {
        self.get_count.fetch_add(keys.len() as u64, Ordering::Relaxed);
        let hits = self.with_state(|state, now| {
            let mut hits = Vec::with_capacity(keys.len());
            for key in keys {
                hits.extend(state.touch(key.as_ref(), requester_id, with_cas, now));
            }
            hits
        });
        let misses = keys.len() - hits.len();
        self.get_hits.fetch_add(hits.len() as u64, Ordering::Relaxed);
        self.get_misses.fetch_add(misses as u64, Ordering::Relaxed);
        hits
    }

    /// Deletes a key. Returns `true` if it existed.
    pub fn delete(&self, key: &str) -> bool {
        self.with_state(|state, now| {
            state.purge_if_expired(key, now);
            state.delete_entry(key).is_some()
        })
    }

    /// Removes every item and cancels every pending expiration.
    pub fn flush(&self) {
        self.lock().clear();
    }

    /// Deletes every item whose deadline has passed.
    ///
    /// Returns the next pending deadline, if any. Called by the expiry task.
    pub fn purge_expired(&self) -> Option<Instant> {
        let mut state = self.lock();
        let now = Instant::now();
        let mut purged = 0u64;

        let next = loop {
            let Some((&timer, key)) = state.expirations.iter().next() else {
                break None;
            };
            if timer.deadline > now {
                break Some(timer.deadline);
            }
            let key = key.clone();
            if state.delete_entry(&key).is_none() {
                state.expirations.remove(&timer);
            } else {
                purged += 1;
            }
        };

        state.expired += purged;
        state.wake_expiry_task = false;
        if purged > 0 {
            debug!(
                expired = purged,
                items_remaining = state.index.len(),
                "Expired items purged"
            );
        }
        next
    }

    pub(crate) fn expiry_notify(&self) -> &Notify {
        &self.expiry_notify
    }

    /// Number of items currently stored.
    pub fn len(&self) -> usize {
        self.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of items.
    pub fn limit(&self) -> usize {
        self.lock().limit
    }

    /// Returns an item without touching its recency or visitors.
    pub fn peek(&self, key: &str) -> Option<EntrySnapshot> {
        let state = self.lock();
        state
            .entry(key)
            .filter(|entry| !entry.is_expired_at(Instant::now()))
            .map(CacheEntry::snapshot)
    }

    /// Keys from most to least recently used.
    pub fn lru_keys(&self) -> Vec<String> {
        self.lock()
            .lru
            .iter()
            .map(|entry| entry.key().to_string())
            .collect()
    }

    /// Requester ids that have visited `key` since its last write, ascending.
    pub fn visitors(&self, key: &str) -> Option<Vec<u64>> {
        self.lock()
            .entry(key)
            .map(|entry| entry.visitors().iter().collect())
    }

    /// Earliest pending expiration deadline.
    pub fn next_expiration(&self) -> Option<Instant> {
        self.lock().next_deadline()
    }

    pub fn stats(&self) -> StorageStats {
        let state = self.lock();
        StorageStats {
            items: state.index.len(),
            limit: state.limit,
            cmd_get: self.get_count.load(Ordering::Relaxed),
            cmd_set: self.set_count.load(Ordering::Relaxed),
            get_hits: self.get_hits.load(Ordering::Relaxed),
            get_misses: self.get_misses.load(Ordering::Relaxed),
            cas_hits: self.cas_hits.load(Ordering::Relaxed),
            cas_badval: self.cas_badval.load(Ordering::Relaxed),
            cas_misses: self.cas_misses.load(Ordering::Relaxed),
            evictions: state.evictions,
            expired: state.expired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(key: &str, flags: u16, exptime: i64, value: &'static str) -> Item {
        Item::new(key, flags, exptime, value)
    }

    fn value_of(engine: &StorageEngine, key: &str) -> Option<Bytes> {
        engine.peek(key).map(|entry| entry.value)
    }

    // ========================================================================
    // add / replace
    // ========================================================================

    #[test]
    fn test_add_to_empty_cache() {
        let engine = StorageEngine::new();

        let status = engine.add(item("hola", 13, 0, "HOLA"), 1, false);
        assert_eq!(status, Some(StoreStatus::Stored));
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.lru_keys(), vec!["hola"]);
        assert_eq!(engine.visitors("hola"), Some(vec![1]));
    }

    #[test]
    fn test_add_existing_key_is_not_stored() {
        let engine = StorageEngine::new();
        engine.add(item("hola", 15, 0, "HOLA"), 1, false);

        let status = engine.add(item("hola", 13, 0, "LAST"), 1, false);
        assert_eq!(status, Some(StoreStatus::NotStored));
        assert_eq!(value_of(&engine, "hola"), Some(Bytes::from("HOLA")));
        assert_eq!(engine.peek("hola").unwrap().flags, 15);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_add_negative_exptime_is_not_stored() {
        let engine = StorageEngine::new();
        let status = engine.add(item("hola", 0, -1, "HOLA"), 1, false);
        assert_eq!(status, Some(StoreStatus::NotStored));
        assert!(engine.is_empty());
    }

    #[test]
    fn test_replace_missing_key_creates_nothing() {
        let engine = StorageEngine::new();
        engine.add(item("last", 15, 0, "LAST"), 1, false);

        let status = engine.replace(item("hola", 13, 0, "HOLA"), 1, false);
        assert_eq!(status, Some(StoreStatus::NotStored));
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.lru_keys(), vec!["last"]);
    }

    #[test]
    fn test_replace_existing_key() {
        let engine = StorageEngine::new();
        engine.add(item("hola", 15, 0, "LAST"), 1, false);
        engine.add(item("other", 0, 0, "X"), 1, false);

        let status = engine.replace(item("hola", 3, 0, "HOLA!"), 2, false);
        assert_eq!(status, Some(StoreStatus::Stored));

        let entry = engine.peek("hola").unwrap();
        assert_eq!(entry.value, Bytes::from("HOLA!"));
        assert_eq!(entry.bytes, 5);
        assert_eq!(entry.flags, 3);
        assert_eq!(engine.lru_keys(), vec!["hola", "other"]);
        assert_eq!(engine.visitors("hola"), Some(vec![2]));
    }

    #[test]
    fn test_replace_with_negative_exptime_deletes() {
        let engine = StorageEngine::new();
        engine.add(item("hola", 0, 0, "HOLA"), 1, false);

        let status = engine.replace(item("hola", 0, -1, "LAST"), 1, false);
        assert_eq!(status, Some(StoreStatus::NotStored));
        assert!(engine.peek("hola").is_none());
        assert!(engine.is_empty());
    }

    // ========================================================================
    // set / append / prepend
    // ========================================================================

    #[test]
    fn test_set_upserts() {
        let engine = StorageEngine::new();

        assert_eq!(
            engine.set(item("k", 1, 0, "one"), 1, false),
            Some(StoreStatus::Stored)
        );
        assert_eq!(
            engine.set(item("k", 2, 0, "two"), 1, false),
            Some(StoreStatus::Stored)
        );
        assert_eq!(value_of(&engine, "k"), Some(Bytes::from("two")));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_set_negative_exptime_on_missing_key() {
        let engine = StorageEngine::new();
        assert_eq!(
            engine.set(item("k", 0, -5, "v"), 1, false),
            Some(StoreStatus::NotStored)
        );
        assert!(engine.is_empty());
    }

    #[test]
    fn test_append_and_prepend_arithmetic() {
        let engine = StorageEngine::new();
        engine.add(item("hola", 15, 0, "LAST"), 1, false);

        assert_eq!(
            engine.append(item("hola", 15, 0, "HOLA"), 1, false),
            Some(StoreStatus::Stored)
        );
        let entry = engine.peek("hola").unwrap();
        assert_eq!(entry.value, Bytes::from("LASTHOLA"));
        assert_eq!(entry.bytes, 8);

        assert_eq!(
            engine.prepend(item("hola", 9, 0, "<<"), 1, false),
            Some(StoreStatus::Stored)
        );
        let entry = engine.peek("hola").unwrap();
        assert_eq!(entry.value, Bytes::from("<<LASTHOLA"));
        assert_eq!(entry.bytes, 10);
        // Supplied flags overwrite the stored ones.
        assert_eq!(entry.flags, 9);
    }

    #[test]
    fn test_append_missing_key() {
        let engine = StorageEngine::new();
        assert_eq!(
            engine.append(item("hola", 15, 0, "HOLA"), 1, false),
            Some(StoreStatus::NotStored)
        );
        assert_eq!(
            engine.prepend(item("hola", 15, 0, "HOLA"), 1, false),
            Some(StoreStatus::NotStored)
        );
        assert!(engine.is_empty());
    }

    // ========================================================================
    // cas
    // ========================================================================

    #[test]
    fn test_cas_missing_key() {
        let engine = StorageEngine::new();
        assert_eq!(
            engine.cas(item("hola", 0, 0, "LAST"), 1, false),
            Some(StoreStatus::NotFound)
        );
        assert!(engine.is_empty());
    }

    #[test]
    fn test_cas_from_stranger_is_exists() {
        let engine = StorageEngine::new();
        engine.add(item("hola", 15, 0, "HOLA"), 1, false);

        assert_eq!(
            engine.cas(item("hola", 15, 0, "LAST"), 99, false),
            Some(StoreStatus::Exists)
        );
        assert_eq!(value_of(&engine, "hola"), Some(Bytes::from("HOLA")));
        assert_eq!(engine.visitors("hola"), Some(vec![1]));
    }

    #[test]
    fn test_cas_after_get_is_stored_and_purges_visitors() {
        let engine = StorageEngine::new();
        engine.add(item("hola", 15, 0, "HOLA"), 1, false);
        engine.get(&["hola"], 2);
        engine.get(&["hola"], 3);
        assert_eq!(engine.visitors("hola"), Some(vec![1, 2, 3]));

        assert_eq!(
            engine.cas(item("hola", 15, 0, "LAST"), 2, false),
            Some(StoreStatus::Stored)
        );
        assert_eq!(value_of(&engine, "hola"), Some(Bytes::from("LAST")));
        assert_eq!(engine.visitors("hola"), Some(vec![2]));

        // 3 read the old value, so its cas now fails.
        assert_eq!(
            engine.cas(item("hola", 15, 0, "MINE"), 3, false),
            Some(StoreStatus::Exists)
        );
    }

    #[test]
    fn test_creator_can_cas_without_reading() {
        let engine = StorageEngine::new();
        engine.add(item("hola", 15, 0, "HOLA"), 7, false);
        assert_eq!(
            engine.cas(item("hola", 15, 0, "LAST"), 7, false),
            Some(StoreStatus::Stored)
        );
    }

    #[test]
    fn test_cas_stats() {
        let engine = StorageEngine::new();
        engine.cas(item("a", 0, 0, "x"), 1, false);
        engine.add(item("a", 0, 0, "x"), 1, false);
        engine.cas(item("a", 0, 0, "y"), 2, false);
        engine.cas(item("a", 0, 0, "z"), 1, false);

        let stats = engine.stats();
        assert_eq!(stats.cas_misses, 1);
        assert_eq!(stats.cas_badval, 1);
        assert_eq!(stats.cas_hits, 1);
    }

    // ========================================================================
    // noreply
    // ========================================================================

    #[test]
    fn test_noreply_suppresses_every_outcome() {
        let engine = StorageEngine::new();

        assert_eq!(engine.add(item("a", 0, 0, "1"), 1, true), None);
        assert_eq!(engine.add(item("a", 0, 0, "2"), 1, true), None);
        assert_eq!(engine.replace(item("b", 0, 0, "1"), 1, true), None);
        assert_eq!(engine.append(item("a", 0, 0, "3"), 1, true), None);
        assert_eq!(engine.prepend(item("a", 0, 0, "0"), 1, true), None);
        assert_eq!(engine.set(item("c", 0, 0, "1"), 1, true), None);
        assert_eq!(engine.cas(item("missing", 0, 0, "1"), 1, true), None);
        assert_eq!(engine.cas(item("a", 0, 0, "1"), 42, true), None);

        assert_eq!(value_of(&engine, "a"), Some(Bytes::from("013")));
        assert!(engine.peek("b").is_none());
        assert_eq!(value_of(&engine, "c"), Some(Bytes::from("1")));

        assert_eq!(engine.cas(item("a", 0, 0, "new"), 1, true), None);
        assert_eq!(value_of(&engine, "a"), Some(Bytes::from("new")));
    }

    // ========================================================================
    // get / gets
    // ========================================================================

    #[test]
    fn test_get_missing_keys() {
        let engine = StorageEngine::new();
        assert!(engine.get(&["hola", "test"], 1).is_empty());
        assert!(engine.is_empty());
    }

    #[test]
    fn test_get_returns_hits_in_request_order() {
        let engine = StorageEngine::new();
        engine.add(item("a", 1, 0, "AA"), 1, false);
        engine.add(item("b", 2, 0, "B"), 1, false);

        let hits = engine.get(&["b", "missing", "a"], 5);
        assert_eq!(
            hits,
            vec![
                RetrievedValue {
                    key: "b".into(),
                    flags: 2,
                    bytes: 1,
                    cas: None,
                    value: Bytes::from("B"),
                },
                RetrievedValue {
                    key: "a".into(),
                    flags: 1,
                    bytes: 2,
                    cas: None,
                    value: Bytes::from("AA"),
                },
            ]
        );

        let stats = engine.stats();
        assert_eq!(stats.cmd_get, 3);
        assert_eq!(stats.get_hits, 2);
        assert_eq!(stats.get_misses, 1);
    }

    #[test]
    fn test_gets_reports_requester_as_cas() {
        let engine = StorageEngine::new();
        engine.add(item("a", 0, 0, "x"), 1, false);
        let hits = engine.gets(&["a"], 12_700_154_321);
        assert_eq!(hits[0].cas, Some(12_700_154_321));
        assert_eq!(engine.visitors("a"), Some(vec![1, 12_700_154_321]));
    }

    #[test]
    fn test_get_marks_recently_used() {
        let engine = StorageEngine::new();
        engine.add(item("a", 0, 0, "1"), 1, false);
        engine.add(item("b", 0, 0, "2"), 1, false);
        engine.add(item("c", 0, 0, "3"), 1, false);
        assert_eq!(engine.lru_keys(), vec!["c", "b", "a"]);

        engine.get(&["a"], 1);
        assert_eq!(engine.lru_keys(), vec!["a", "c", "b"]);

        engine.gets(&["b"], 1);
        assert_eq!(engine.lru_keys(), vec!["b", "a", "c"]);
    }

    // ========================================================================
    // eviction / delete / flush
    // ========================================================================

    #[test]
    fn test_eviction_drops_exactly_the_tail() {
        let engine = StorageEngine::with_limit(3);
        engine.add(item("a", 0, 0, "1"), 1, false);
        engine.add(item("b", 0, 0, "2"), 1, false);
        engine.add(item("c", 0, 0, "3"), 1, false);
        engine.get(&["a"], 1);

        engine.add(item("d", 0, 0, "4"), 1, false);
        assert_eq!(engine.lru_keys(), vec!["d", "a", "c"]);
        assert!(engine.peek("b").is_none());
        assert_eq!(engine.len(), 3);
        assert_eq!(engine.stats().evictions, 1);
    }

    #[test]
    fn test_limit_one() {
        let engine = StorageEngine::with_limit(1);
        engine.add(item("a", 0, 0, "A"), 1, false);
        engine.add(item("b", 0, 0, "B"), 1, false);

        assert!(engine.get(&["a"], 1).is_empty());
        assert_eq!(engine.get(&["b"], 1)[0].value, Bytes::from("B"));
    }

    #[test]
    fn test_update_does_not_evict() {
        let engine = StorageEngine::with_limit(2);
        engine.add(item("a", 0, 0, "1"), 1, false);
        engine.add(item("b", 0, 0, "2"), 1, false);
        engine.set(item("a", 0, 0, "3"), 1, false);

        assert_eq!(engine.lru_keys(), vec!["a", "b"]);
        assert_eq!(engine.stats().evictions, 0);
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let engine = StorageEngine::with_limit(0);
        assert_eq!(engine.limit(), 1);
        engine.add(item("a", 0, 0, "1"), 1, false);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_delete() {
        let engine = StorageEngine::new();
        engine.add(item("a", 0, 0, "1"), 1, false);
        engine.add(item("b", 0, 0, "2"), 1, false);
        engine.add(item("c", 0, 0, "3"), 1, false);

        assert!(engine.delete("b"));
        assert_eq!(engine.lru_keys(), vec!["c", "a"]);
        assert!(engine.delete("c"));
        assert!(engine.delete("a"));
        assert!(!engine.delete("a"));
        assert!(engine.is_empty());

        // The list is usable again after being emptied.
        engine.add(item("d", 0, 0, "4"), 1, false);
        assert_eq!(engine.lru_keys(), vec!["d"]);
    }

    #[test]
    fn test_flush() {
        let engine = StorageEngine::new();
        engine.add(item("a", 0, 10, "1"), 1, false);
        engine.add(item("b", 0, 0, "2"), 1, false);

        engine.flush();
        assert!(engine.is_empty());
        assert!(engine.lru_keys().is_empty());
        assert_eq!(engine.next_expiration(), None);
    }

    // ========================================================================
    // expiration
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_expired_item_is_gone_on_access() {
        let engine = StorageEngine::new();
        engine.add(item("hola", 0, 2, "HOLA"), 1, false);
        assert!(engine.peek("hola").is_some());

        tokio::time::advance(Duration::from_millis(2100)).await;

        assert!(engine.get(&["hola"], 1).is_empty());
        assert!(engine.is_empty());
        assert_eq!(engine.stats().expired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_reschedules_expiration() {
        let engine = StorageEngine::new();
        engine.add(item("hola", 0, 2, "HOLA"), 1, false);
        let first = engine.next_expiration().unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        engine.set(item("hola", 0, 5, "LAST"), 1, false);
        let second = engine.next_expiration().unwrap();
        assert!(second > first);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(value_of(&engine, "hola"), Some(Bytes::from("LAST")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_exptime_cancels_timer() {
        let engine = StorageEngine::new();
        engine.add(item("hola", 0, 1, "HOLA"), 1, false);
        engine.append(item("hola", 0, 0, "!"), 1, false);
        assert_eq!(engine.next_expiration(), None);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(value_of(&engine, "hola"), Some(Bytes::from("HOLA!")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let engine = StorageEngine::new();
        engine.add(item("a", 0, 1, "1"), 1, false);
        engine.add(item("b", 0, 3, "2"), 1, false);
        engine.add(item("c", 0, 0, "3"), 1, false);

        tokio::time::advance(Duration::from_secs(2)).await;
        let next = engine.purge_expired();

        assert_eq!(engine.lru_keys(), vec!["c", "b"]);
        assert_eq!(next, engine.next_expiration());
        assert!(next.is_some());
        assert_eq!(engine.stats().expired, 1);
    }

    #[test]
    fn test_huge_exptime_never_fires() {
        let engine = StorageEngine::new();
        engine.add(item("a", 0, i64::MAX, "1"), 1, false);
        assert!(engine.peek("a").is_some());
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let engine = Arc::new(StorageEngine::with_limit(500));
        let mut handles = vec![];

        for i in 0..10u64 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key-{}-{}", i, j);
                    engine.set(Item::new(key.clone(), 0, 0, "value"), i, false);
                    engine.get(&[key], i);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 500);
        assert_eq!(engine.lru_keys().len(), 500);
        assert_eq!(engine.stats().evictions, 500);
    }
}
