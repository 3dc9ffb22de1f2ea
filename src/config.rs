//! Server Configuration
//!
//! Command-line flags for the `memlru` binary. Parsing never prints or exits;
//! it returns a [`CliAction`] (or a [`ConfigError`]) and leaves that to `main`.

use crate::{DEFAULT_HOST, DEFAULT_LIMIT, DEFAULT_PORT};
use thiserror::Error;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum number of cached items
    pub limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// What the command line asks the binary to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Run(Config),
    PrintHelp,
    PrintVersion,
}

/// Errors in command-line flags.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid port number: {0}")]
    InvalidPort(String),

    /// Not a number, or zero
    #[error("invalid item limit: {0} (must be at least 1)")]
    InvalidLimit(String),

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

impl Config {
    /// Parses configuration from the process arguments.
    pub fn from_env() -> Result<CliAction, ConfigError> {
        Self::from_args(std::env::args().skip(1))
    }

    /// Parses configuration from `args` (without the program name).
    pub fn from_args<I, A>(args: I) -> Result<CliAction, ConfigError>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => {
                    config.host = args.next().ok_or(ConfigError::MissingValue(arg))?;
                }
                "--port" | "-p" => {
                    let value = args.next().ok_or(ConfigError::MissingValue(arg))?;
                    config.port = value
                        .parse()
                        .map_err(|_| ConfigError::InvalidPort(value.clone()))?;
                }
                "--limit" | "-l" => {
                    let value = args.next().ok_or(ConfigError::MissingValue(arg))?;
                    config.limit = match value.parse::<usize>() {
                        Ok(limit) if limit >= 1 => limit,
                        _ => return Err(ConfigError::InvalidLimit(value)),
                    };
                }
                "--help" => return Ok(CliAction::PrintHelp),
                "--version" | "-v" => return Ok(CliAction::PrintVersion),
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        Ok(CliAction::Run(config))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
