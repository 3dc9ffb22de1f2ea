//! Memcached Text Protocol Replies
//!
//! Every reply memlru sends is a line of ASCII terminated by CRLF, except
//! retrieval replies which interleave header lines with raw data blocks.
//!
//! ## Formats
//!
//! Outcome: `STORED\r\n`
//! Error: `CLIENT_ERROR - There are missing arguments in the command given\r\n`
//! Value block: `VALUE <key> <flags> <bytes>[ <cas>]\r\n<data>\r\n`
//! Retrieval: zero or more value blocks followed by `END\r\n`
//! Statistics: `STAT <name> <value>\r\n` lines followed by `END\r\n`

use crate::storage::{RetrievedValue, StoreStatus};
use std::fmt;

/// The CRLF terminator used by every reply line
pub const CRLF: &[u8] = b"\r\n";

/// Fixed reply lines
pub mod reply {
    pub const STORED: &[u8] = b"STORED\r\n";
    pub const NOT_STORED: &[u8] = b"NOT_STORED\r\n";
    pub const EXISTS: &[u8] = b"EXISTS\r\n";
    pub const NOT_FOUND: &[u8] = b"NOT_FOUND\r\n";
    pub const DELETED: &[u8] = b"DELETED\r\n";
    pub const OK: &[u8] = b"OK\r\n";
    pub const END: &[u8] = b"END\r\n";
    pub const ERROR: &[u8] = b"ERROR\r\n";
    pub const MISSING_ARGUMENTS: &[u8] =
        b"CLIENT_ERROR - There are missing arguments in the command given\r\n";
    pub const TOO_MANY_ARGUMENTS: &[u8] =
        b"CLIENT_ERROR - There are too many arguments in the command given\r\n";
    pub const INVALID_ARGUMENTS: &[u8] =
        b"CLIENT_ERROR - Please make sure that the arguments conform to the protocol\r\n";
    pub const DATA_SIZE_MISMATCH: &[u8] =
        b"CLIENT_ERROR - Please make sure that the bytes and datablock size are the same\r\n";
}

/// The kinds of `CLIENT_ERROR` a request can provoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorKind {
    MissingArguments,
    TooManyArguments,
    InvalidArguments,
    /// The data block length differs from the declared `bytes`.
    DataSizeMismatch,
}

impl ClientErrorKind {
    fn line(self) -> &'static [u8] {
        match self {
            ClientErrorKind::MissingArguments => reply::MISSING_ARGUMENTS,
            ClientErrorKind::TooManyArguments => reply::TOO_MANY_ARGUMENTS,
            ClientErrorKind::InvalidArguments => reply::INVALID_ARGUMENTS,
            ClientErrorKind::DataSizeMismatch => reply::DATA_SIZE_MISMATCH,
        }
    }
}

/// A reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Stored,
    NotStored,
    Exists,
    NotFound,
    Deleted,
    Ok,

    /// Unknown command.
    Error,

    ClientError(ClientErrorKind),

    /// Hits of a `get`/`gets`, serialized as value blocks and `END`.
    Values(Vec<RetrievedValue>),

    /// `stats` output, serialized as `STAT` lines and `END`.
    Stats(Vec<(String, String)>),

    Version(String),
}

impl Reply {
    /// Serializes the reply to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    ///
    /// This is more efficient than `serialize()` when you want to reuse a buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Stored => buf.extend_from_slice(reply::STORED),
            Reply::NotStored => buf.extend_from_slice(reply::NOT_STORED),
            Reply::Exists => buf.extend_from_slice(reply::EXISTS),
            Reply::NotFound => buf.extend_from_slice(reply::NOT_FOUND),
            Reply::Deleted => buf.extend_from_slice(reply::DELETED),
            Reply::Ok => buf.extend_from_slice(reply::OK),
            Reply::Error => buf.extend_from_slice(reply::ERROR),
            Reply::ClientError(kind) => buf.extend_from_slice(kind.line()),
            Reply::Values(values) => {
                for value in values {
                    buf.extend_from_slice(b"VALUE ");
                    buf.extend_from_slice(value.key.as_bytes());
                    buf.extend_from_slice(format!(" {} {}", value.flags, value.bytes).as_bytes());
                    if let Some(cas) = value.cas {
                        buf.extend_from_slice(format!(" {}", cas).as_bytes());
                    }
                    buf.extend_from_slice(CRLF);
                    buf.extend_from_slice(&value.value);
                    buf.extend_from_slice(CRLF);
                }
                buf.extend_from_slice(reply::END);
            }
            Reply::Stats(stats) => {
                for (name, value) in stats {
                    buf.extend_from_slice(format!("STAT {} {}", name, value).as_bytes());
                    buf.extend_from_slice(CRLF);
                }
                buf.extend_from_slice(reply::END);
            }
            Reply::Version(version) => {
                buf.extend_from_slice(b"VERSION ");
                buf.extend_from_slice(version.as_bytes());
                buf.extend_from_slice(CRLF);
            }
        }
    }
}

impl From<StoreStatus> for Reply {
    fn from(status: StoreStatus) -> Self {
        match status {
            StoreStatus::Stored => Reply::Stored,
            StoreStatus::NotStored => Reply::NotStored,
            StoreStatus::Exists => Reply::Exists,
            StoreStatus::NotFound => Reply::NotFound,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Values(values) => write!(f, "{} value(s)", values.len()),
            Reply::Stats(stats) => write!(f, "{} stat(s)", stats.len()),
            other => {
                let bytes = other.serialize();
                f.write_str(String::from_utf8_lossy(&bytes).trim_end())
            }
        }
    }
}
