//! Storage Engine Module
//!
//! This module provides the cache behind the memcached commands: a bounded
//! LRU of entries, each carrying the set of requesters that may `cas` it, and
//! a background task that deletes entries when their expiration passes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │ Mutex<CacheState>                                     │  │
//! │  │   index ──► LruList<CacheEntry> ──► VisitorTree       │  │
//! │  │   expirations (deadline order)                        │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ purge_expired / Notify
//!              ┌─────────────┴─────────────┐
//!              │       ExpiryTask          │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **LRU Eviction**: adding to a full cache drops the least recently used item
//! - **Visitor CAS**: `cas` succeeds only for requesters that touched the item
//!   since its last write
//! - **Lazy Expiry**: expired items are dropped on access
//! - **Scheduled Expiry**: the background task drops them at their deadline
//!
//! ## Example
//!
//! ```
//! use memlru::storage::{Item, StorageEngine, StoreStatus};
//!
//! let engine = StorageEngine::with_limit(2);
//!
//! engine.set(Item::new("a", 0, 0, "1"), 1, false);
//! engine.set(Item::new("b", 0, 0, "2"), 1, false);
//! engine.get(&["a"], 1);
//! engine.set(Item::new("c", 0, 0, "3"), 1, false);
//!
//! // "b" was least recently used
//! assert_eq!(engine.lru_keys(), vec!["c", "a"]);
//!
//! // Requester 9 never saw "a"
//! assert_eq!(
//!     engine.cas(Item::new("a", 0, 0, "x"), 9, false),
//!     Some(StoreStatus::Exists)
//! );
//! ```

pub mod engine;
pub mod entry;
pub mod expiry;
pub mod lru;
pub mod visitors;

// Re-export commonly used types
pub use engine::{RetrievedValue, StorageEngine, StorageStats, StoreStatus, DEFAULT_LIMIT};
pub use entry::{EntrySnapshot, Item, StoreMode};
pub use expiry::ExpiryTask;
pub use visitors::VisitorTree;
