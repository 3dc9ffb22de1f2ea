//! Command Line Parser
//!
//! This module turns one line of the memcached text protocol into a typed
//! [`Command`], validating every argument on the way.
//!
//! ## How the Parser Works
//!
//! Framing and parsing are separate steps:
//!
//! 1. [`next_line`] looks for a `\n` in the read buffer and returns the line
//!    without its trailing CR/LF plus the number of bytes consumed, or `None`
//!    if the line is incomplete.
//! 2. [`parse_command`] splits a command line on whitespace and validates it.
//!
//! Data blocks are framed by [`next_line`] too but never parsed: the
//! connection hands them to the pending [`StorageRequest`] as raw bytes.
//!
//! ## Validation Order
//!
//! Arity is checked before contents, so `set k` reports missing arguments
//! even though `k` alone would be valid. Then, left to right:
//! - `flags` must fit in a `u16`
//! - `exptime` must be an integer (`i64`)
//! - `bytes` must fit in a `u8`
//! - `cas` takes a `u64` CAS value after `bytes`
//! - a trailing token must be exactly `noreply`

use crate::protocol::request::{Command, RetrievalCommand, StorageCommand, StorageRequest};
use crate::protocol::types::{ClientErrorKind, Reply};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while parsing a command line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The first token is not a known command (or the line is blank)
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    #[error("missing arguments for {0}")]
    MissingArguments(&'static str),

    #[error("too many arguments for {0}")]
    TooManyArguments(&'static str),

    /// An argument is out of range or malformed
    #[error("invalid argument for {command}: {token:?}")]
    InvalidArguments {
        command: &'static str,
        token: String,
    },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// The token that suppresses a reply.
pub const NOREPLY: &str = "noreply";

impl From<ParseError> for Reply {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::UnknownCommand(_) => Reply::Error,
            ParseError::MissingArguments(_) => {
                Reply::ClientError(ClientErrorKind::MissingArguments)
            }
            ParseError::TooManyArguments(_) => {
                Reply::ClientError(ClientErrorKind::TooManyArguments)
            }
            ParseError::InvalidArguments { .. } => {
                Reply::ClientError(ClientErrorKind::InvalidArguments)
            }
        }
    }
}

/// Finds the first complete line in `buf`.
///
/// Returns the line with trailing `\r`/`\n` bytes stripped and the number of
/// bytes it occupied including the terminator, or `None` if no `\n` has
/// arrived yet.
///
/// ```
/// use memlru::protocol::next_line;
///
/// assert_eq!(next_line(b"get a\r\nrest"), Some((&b"get a"[..], 7)));
/// assert_eq!(next_line(b"get a"), None);
/// ```
pub fn next_line(buf: &[u8]) -> Option<(&[u8], usize)> {
    let newline = buf.iter().position(|&b| b == b'\n')?;
    let mut line = &buf[..newline];
    while let [rest @ .., b'\r' | b'\n'] = line {
        line = rest;
    }
    Some((line, newline + 1))
}

/// Parses one command line.
///
/// Command names are case-sensitive, as in memcached.
///
/// ```
/// use memlru::protocol::{parse_command, Command};
///
/// let command = parse_command("set hola 13 0 4 noreply").unwrap();
/// assert!(matches!(command, Command::Storage(ref r) if r.noreply && r.bytes == 4));
/// ```
pub fn parse_command(line: &str) -> ParseResult<Command> {
    let mut tokens = line.split_whitespace();
    let Some(name) = tokens.next() else {
        return Err(ParseError::UnknownCommand(String::new()));
    };
    let args: Vec<&str> = tokens.collect();

    match name {
        "set" => parse_storage("set", &args),
        "add" => parse_storage("add", &args),
        "replace" => parse_storage("replace", &args),
        "append" => parse_storage("append", &args),
        "prepend" => parse_storage("prepend", &args),
        "cas" => parse_storage("cas", &args),
        "get" => parse_retrieval(RetrievalCommand::Get, "get", &args),
        "gets" => parse_retrieval(RetrievalCommand::Gets, "gets", &args),
        "delete" => {
            check_arity("delete", &args, 1, 2)?;
            Ok(Command::Delete {
                key: args[0].to_string(),
                noreply: parse_noreply("delete", args.get(1))?,
            })
        }
        "flush_all" => {
            check_arity("flush_all", &args, 0, 1)?;
            Ok(Command::FlushAll {
                noreply: parse_noreply("flush_all", args.first())?,
            })
        }
        "stats" => parse_bare("stats", &args, Command::Stats),
        "version" => parse_bare("version", &args, Command::Version),
        "quit" => parse_bare("quit", &args, Command::Quit),
        _ => Err(ParseError::UnknownCommand(name.to_string())),
    }
}

fn parse_retrieval(
    command: RetrievalCommand,
    name: &'static str,
    args: &[&str],
) -> ParseResult<Command> {
    if args.is_empty() {
        return Err(ParseError::MissingArguments(name));
    }
    Ok(Command::Retrieval {
        command,
        keys: args.iter().map(|key| key.to_string()).collect(),
    })
}

/// `<key> <flags> <exptime> <bytes> [<cas unique>] [noreply]`
fn parse_storage(name: &'static str, args: &[&str]) -> ParseResult<Command> {
    let required = if name == "cas" { 5 } else { 4 };
    check_arity(name, args, required, required + 1)?;

    let flags = parse_number(name, args[1])?;
    let exptime = parse_number(name, args[2])?;
    let bytes = parse_number(name, args[3])?;
    let command = match name {
        "set" => StorageCommand::Set,
        "add" => StorageCommand::Add,
        "replace" => StorageCommand::Replace,
        "append" => StorageCommand::Append,
        "prepend" => StorageCommand::Prepend,
        _ => StorageCommand::Cas {
            unique: parse_number(name, args[4])?,
        },
    };
    let noreply = parse_noreply(name, args.get(required))?;

    Ok(Command::Storage(StorageRequest {
        command,
        key: args[0].to_string(),
        flags,
        exptime,
        bytes,
        noreply,
    }))
}

/// A command that takes no arguments.
fn parse_bare(name: &'static str, args: &[&str], command: Command) -> ParseResult<Command> {
    check_arity(name, args, 0, 0)?;
    Ok(command)
}

fn check_arity(command: &'static str, args: &[&str], min: usize, max: usize) -> ParseResult<()> {
    if args.len() < min {
        Err(ParseError::MissingArguments(command))
    } else if args.len() > max {
        Err(ParseError::TooManyArguments(command))
    } else {
        Ok(())
    }
}

fn parse_number<T: FromStr>(command: &'static str, token: &str) -> ParseResult<T> {
    token.parse().map_err(|_| ParseError::InvalidArguments {
        command,
        token: token.to_string(),
    })
}

fn parse_noreply(command: &'static str, token: Option<&&str>) -> ParseResult<bool> {
    match token {
        None => Ok(false),
        Some(&NOREPLY) => Ok(true),
        Some(other) => Err(ParseError::InvalidArguments {
            command,
            token: other.to_string(),
        }),
    }
}
