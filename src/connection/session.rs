//! Per-Connection Protocol State
//!
//! A [`Session`] drives the two-phase memcached exchange for one client:
//!
//! ```text
//!        ┌──────────────────────────┐  valid storage line
//!   ────►│  AwaitingCommandLine     │─────────────────────────┐
//!        └──────────────────────────┘                         ▼
//!              ▲   │ get/gets/delete/...    ┌──────────────────────────┐
//!              │   └─► reply                │  AwaitingDataBlock(req)  │
//!              │                            └────────────┬─────────────┘
//!              └─────────────────────────────────────────┘
//!                  next line: execute or size-mismatch error
//! ```
//!
//! The session is transport-agnostic: it consumes already-framed lines and
//! returns replies. Socket handling lives in
//! [`ConnectionHandler`](crate::connection::ConnectionHandler).

use crate::commands::CommandHandler;
use crate::protocol::{parse_command, Command, Reply, StorageRequest};
use std::net::SocketAddr;
use tracing::{debug, trace};

/// Derives the requester id of a client from its remote endpoint: the decimal
/// digits of `<address>:<port>` read as one number.
///
/// The id doubles as the CAS value reported to the client by `gets`.
///
/// ```
/// use memlru::connection::requester_id;
///
/// assert_eq!(requester_id(&"127.0.0.1:54321".parse().unwrap()), 12700154321);
/// ```
pub fn requester_id(addr: &SocketAddr) -> u64 {
    format!("{}:{}", addr.ip(), addr.port())
        .bytes()
        .filter(u8::is_ascii_digit)
        .fold(0u64, |id, digit| {
            id.wrapping_mul(10).wrapping_add(u64::from(digit - b'0'))
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    AwaitingCommandLine,
    /// A storage command line was accepted; the next line is its value.
    AwaitingDataBlock(StorageRequest),
}

/// Protocol state of one connection.
pub struct Session {
    handler: CommandHandler,
    requester_id: u64,
    state: SessionState,
    closing: bool,
}

impl Session {
    pub fn new(handler: CommandHandler, requester_id: u64) -> Self {
        Self {
            handler,
            requester_id,
            state: SessionState::AwaitingCommandLine,
            closing: false,
        }
    }

    /// Creates a session whose requester id is derived from `addr`.
    pub fn for_peer(handler: CommandHandler, addr: &SocketAddr) -> Self {
        Self::new(handler, requester_id(addr))
    }

    pub fn requester_id(&self) -> u64 {
        self.requester_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_awaiting_data(&self) -> bool {
        matches!(self.state, SessionState::AwaitingDataBlock(_))
    }

    /// Returns `true` once the client sent `quit`.
    pub fn wants_close(&self) -> bool {
        self.closing
    }

    /// Handles one line (without its CR/LF) and returns the reply, if any.
    pub fn handle_line(&mut self, line: &[u8]) -> Option<Reply> {
        match std::mem::replace(&mut self.state, SessionState::AwaitingCommandLine) {
            SessionState::AwaitingDataBlock(request) => {
                self.handler
                    .execute_storage(request, line, self.requester_id)
            }
            SessionState::AwaitingCommandLine => self.handle_command_line(line),
        }
    }

    fn handle_command_line(&mut self, line: &[u8]) -> Option<Reply> {
        let line = String::from_utf8_lossy(line);
        trace!(requester = self.requester_id, line = %line, "Command line");

        match parse_command(&line) {
            Ok(Command::Storage(request)) => {
                self.state = SessionState::AwaitingDataBlock(request);
                None
            }
            Ok(Command::Quit) => {
                self.closing = true;
                None
            }
            Ok(command) => self.handler.execute(command, self.requester_id),
            Err(e) => {
                debug!(requester = self.requester_id, error = %e, "Rejected command line");
                Some(Reply::from(e))
            }
        }
    }
}
