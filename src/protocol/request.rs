//! Parsed Requests
//!
//! The parser turns a command line into a [`Command`]. Storage commands carry
//! a [`StorageRequest`] holding the validated header fields; the value arrives
//! on the following line and is attached with [`StorageRequest::into_item`].

use crate::storage::Item;
use bytes::Bytes;
use std::fmt;

/// The storage commands: `set`, `add`, `replace`, `append`, `prepend`, `cas`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageCommand {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
    /// `unique` is the CAS value the client got from `gets`.
    Cas { unique: u64 },
}

impl StorageCommand {
    pub fn name(self) -> &'static str {
        match self {
            StorageCommand::Set => "set",
            StorageCommand::Add => "add",
            StorageCommand::Replace => "replace",
            StorageCommand::Append => "append",
            StorageCommand::Prepend => "prepend",
            StorageCommand::Cas { .. } => "cas",
        }
    }
}

impl fmt::Display for StorageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `get` or `gets`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalCommand {
    Get,
    /// Also reports a CAS value per hit.
    Gets,
}

/// A validated storage command line, waiting for its data block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRequest {
    pub command: StorageCommand,
    pub key: String,
    pub flags: u16,
    pub exptime: i64,
    /// Declared length of the data block.
    pub bytes: u8,
    pub noreply: bool,
}

impl StorageRequest {
    /// Returns `true` if `data` has the declared length.
    pub fn accepts(&self, data: &[u8]) -> bool {
        data.len() == usize::from(self.bytes)
    }

    /// Combines the header with its data block.
    pub fn into_item(self, value: Bytes) -> Item {
        Item {
            key: self.key,
            flags: self.flags,
            exptime: self.exptime,
            bytes: value.len(),
            value,
        }
    }
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Retrieval {
        command: RetrievalCommand,
        keys: Vec<String>,
    },
    Storage(StorageRequest),
    Delete {
        key: String,
        noreply: bool,
    },
    FlushAll {
        noreply: bool,
    },
    Stats,
    Version,
    Quit,
}

impl Command {
    /// Returns the command name (for logging).
    pub fn name(&self) -> &'static str {
        match self {
            Command::Retrieval {
                command: RetrievalCommand::Get,
                ..
            } => "get",
            Command::Retrieval {
                command: RetrievalCommand::Gets,
                ..
            } => "gets",
            Command::Storage(request) => request.command.name(),
            Command::Delete { .. } => "delete",
            Command::FlushAll { .. } => "flush_all",
            Command::Stats => "stats",
            Command::Version => "version",
            Command::Quit => "quit",
        }
    }
}
