//! Memcached Text Protocol Implementation
//!
//! This module implements the subset of the memcached text protocol memlru
//! speaks.
//!
//! ## Overview
//!
//! Requests are lines of whitespace-separated tokens. Storage commands are
//! followed by a second line, the data block, whose length must match the
//! `bytes` argument. Replies are CRLF-terminated lines, or value blocks
//! followed by `END` for retrievals.
//!
//! ## Modules
//!
//! - `types`: The reply catalog and the `Reply` enum
//! - `request`: Typed commands produced by the parser
//! - `parser`: Line framing and command validation
//!
//! ## Example
//!
//! ```
//! use memlru::protocol::{next_line, parse_command, Command, Reply};
//!
//! let buf = b"get hola\r\n";
//! let (line, consumed) = next_line(buf).unwrap();
//! assert_eq!(consumed, buf.len());
//!
//! let command = parse_command(std::str::from_utf8(line).unwrap()).unwrap();
//! assert_eq!(command.name(), "get");
//!
//! assert_eq!(Reply::Values(vec![]).serialize(), b"END\r\n");
//! ```

pub mod parser;
pub mod request;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{next_line, parse_command, ParseError, ParseResult};
pub use request::{Command, RetrievalCommand, StorageCommand, StorageRequest};
pub use types::{ClientErrorKind, Reply};
