//! # memlru - A memcached-Compatible LRU Cache Server
//!
//! memlru speaks a subset of the memcached text protocol over TCP and keeps
//! a bounded number of items, evicting the least recently used one when full.
//!
//! ## Features
//!
//! - **memcached Text Protocol**: `set`, `add`, `replace`, `append`, `prepend`,
//!   `cas`, `get`, `gets`, plus `delete`, `flush_all`, `stats`, `version`, `quit`
//! - **LRU Eviction**: item-count bound, O(1) per operation
//! - **Visitor CAS**: `cas` succeeds only for clients that touched the item since
//!   its last write
//! - **Expiration**: relative expiration times with a background purge task
//! - **Async I/O**: Built on Tokio, one task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               memlru                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  + Session  │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │   Line      │    │              StorageEngine                   │    │
//! │  │   Parser    │    │   Mutex ─ index ─ LRU list ─ visitor trees   │    │
//! │  └─────────────┘    └──────────────────────────────────────────────┘    │
//! │                                               ▲                         │
//! │                                               │                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpiryTask                            │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use memlru::storage::{ExpiryTask, StorageEngine};
//! use memlru::commands::CommandHandler;
//! use memlru::connection::{handle_connection, ConnectionStats};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = Arc::new(StorageEngine::with_limit(100));
//!     let _expiry = ExpiryTask::start(Arc::clone(&storage));
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("127.0.0.1:9000").await.unwrap();
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         let handler = CommandHandler::new(Arc::clone(&storage), Arc::clone(&stats));
//!         tokio::spawn(handle_connection(stream, addr, handler, Arc::clone(&stats)));
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: Line framing, command parsing and reply serialization
//! - [`storage`]: The LRU engine, visitor trees and expiration task
//! - [`commands`]: Dispatch of parsed commands to the engine
//! - [`connection`]: Per-client sessions and socket handling
//! - [`config`]: Command-line configuration
//!
//! ## Design Highlights
//!
//! ### Requester Ids
//!
//! Each connection is identified by the digits of its remote `address:port`.
//! Reads and writes record that id in the item's visitor tree; `gets` reports
//! it as the CAS value; a write clears the tree down to the writer.
//!
//! ### Lazy + Scheduled Expiry
//!
//! Items with an expiration are removed in two ways:
//! 1. **Lazy**: an operation on an expired key removes it first
//! 2. **Scheduled**: a background task sleeps until the next deadline
//!
//! This ensures memory is reclaimed even for keys that are never accessed again.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{CliAction, Config, ConfigError};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{ParseError, Reply};
pub use storage::{ExpiryTask, StorageEngine};

/// The default port memlru listens on
pub const DEFAULT_PORT: u16 = 9000;

/// The default host memlru binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default maximum number of cached items
pub const DEFAULT_LIMIT: usize = storage::DEFAULT_LIMIT;

/// Version of memlru
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
