//! Command Executor
//!
//! This module dispatches parsed memcached commands to the storage engine
//! and turns the outcome into a [`Reply`].
//!
//! ## Supported Commands
//!
//! ### Storage Commands
//! - `set <key> <flags> <exptime> <bytes> [noreply]` - Store unconditionally
//! - `add ...` - Store if the key is absent
//! - `replace ...` - Store if the key is present
//! - `append ...` / `prepend ...` - Extend an existing value
//! - `cas <key> <flags> <exptime> <bytes> <cas unique> [noreply]` - Store if
//!   the CAS value has visited the item since its last write
//!
//! ### Retrieval Commands
//! - `get <key>+` - Value blocks for every key found
//! - `gets <key>+` - Same, with the requester id as CAS value
//!
//! ### Other Commands
//! - `delete <key> [noreply]`
//! - `flush_all [noreply]`
//! - `stats`
//! - `version`
//!
//! `quit` is handled by the connection and never reaches this module.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌────────────────┐    ┌─────────────┐    ┌─────────────┐   │
//! │  │ check data     │───>│  dispatch   │───>│ into Reply  │   │
//! │  │ block length   │    │             │    │             │   │
//! │  └────────────────┘    └──────┬──────┘    └─────────────┘   │
//! │                               ▼                             │
//! │                        StorageEngine                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::connection::ConnectionStats;
use crate::protocol::{
    ClientErrorKind, Command, Reply, RetrievalCommand, StorageCommand, StorageRequest,
};
use crate::storage::{StorageEngine, StoreStatus};
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

/// Executes memcached commands against a shared storage engine.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
    /// Connection counters reported by `stats`
    connections: Arc<ConnectionStats>,
    /// Server start time for `stats`
    start_time: Instant,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>, connections: Arc<ConnectionStats>) -> Self {
        Self {
            storage,
            connections,
            start_time: Instant::now(),
        }
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Executes a command that needs no data block.
    ///
    /// A storage command reaching this method is executed with an empty data
    /// block. `quit` produces no reply.
    pub fn execute(&self, command: Command, requester_id: u64) -> Option<Reply> {
        match command {
            Command::Retrieval { command, keys } => {
                Some(self.retrieve(command, &keys, requester_id))
            }
            Command::Storage(request) => self.execute_storage(request, b"", requester_id),
            Command::Delete { key, noreply } => self.delete(&key, noreply),
            Command::FlushAll { noreply } => {
                self.storage.flush();
                (!noreply).then_some(Reply::Ok)
            }
            Command::Stats => Some(self.stats()),
            Command::Version => Some(Reply::Version(crate::VERSION.to_string())),
            Command::Quit => None,
        }
    }

    /// Executes a storage command with its data block.
    ///
    /// Replies with the size-mismatch `CLIENT_ERROR` (even under `noreply`)
    /// if the block length differs from the declared `bytes`.
    pub fn execute_storage(
        &self,
        request: StorageRequest,
        data: &[u8],
        requester_id: u64,
    ) -> Option<Reply> {
        if !request.accepts(data) {
            trace!(
                key = %request.key,
                declared = request.bytes,
                received = data.len(),
                "Data block size mismatch"
            );
            return Some(Reply::ClientError(ClientErrorKind::DataSizeMismatch));
        }

        let command = request.command;
        let noreply = request.noreply;
        let item = request.into_item(Bytes::copy_from_slice(data));

        let status = match command {
            StorageCommand::Set => self.storage.set(item, requester_id, noreply),
            StorageCommand::Add => self.storage.add(item, requester_id, noreply),
            StorageCommand::Replace => self.storage.replace(item, requester_id, noreply),
            StorageCommand::Append => self.storage.append(item, requester_id, noreply),
            StorageCommand::Prepend => self.storage.prepend(item, requester_id, noreply),
            StorageCommand::Cas { unique } => self.storage.cas(item, unique, noreply),
        };
        status.map(Reply::from)
    }

    fn retrieve(&self, command: RetrievalCommand, keys: &[String], requester_id: u64) -> Reply {
        let hits = match command {
            RetrievalCommand::Get => self.storage.get(keys, requester_id),
            RetrievalCommand::Gets => self.storage.gets(keys, requester_id),
        };
        Reply::Values(hits)
    }

    fn delete(&self, key: &str, noreply: bool) -> Option<Reply> {
        let status = if self.storage.delete(key) {
            Reply::Deleted
        } else {
            Reply::from(StoreStatus::NotFound)
        };
        (!noreply).then_some(status)
    }

    /// `stats`
    fn stats(&self) -> Reply {
        let storage = self.storage.stats();
        let connections = &self.connections;
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed).to_string();

        let stats = [
            ("pid", std::process::id().to_string()),
            ("uptime", self.start_time.elapsed().as_secs().to_string()),
            ("version", crate::VERSION.to_string()),
            ("curr_connections", load(&connections.active_connections)),
            ("total_connections", load(&connections.connections_accepted)),
            ("cmd_total", load(&connections.commands_processed)),
            ("bytes_read", load(&connections.bytes_read)),
            ("bytes_written", load(&connections.bytes_written)),
            ("cmd_get", storage.cmd_get.to_string()),
            ("cmd_set", storage.cmd_set.to_string()),
            ("get_hits", storage.get_hits.to_string()),
            ("get_misses", storage.get_misses.to_string()),
            ("cas_misses", storage.cas_misses.to_string()),
            ("cas_hits", storage.cas_hits.to_string()),
            ("cas_badval", storage.cas_badval.to_string()),
            ("curr_items", storage.items.to_string()),
            ("limit_maxitems", storage.limit.to_string()),
            ("evictions", storage.evictions.to_string()),
            ("expirations", storage.expired.to_string()),
        ];

        Reply::Stats(
            stats
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }
}
