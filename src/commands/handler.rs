//! Command Handler Module
//!
//! This module implements the four HFTP commands. It receives tokenized
//! requests, validates their arguments, consults the [`FileStore`] and
//! returns the response to send back.
//!
//! ## Supported Commands
//!
//! - `get_file_listing` - List the files in the serving directory
//! - `get_metadata filename` - Get a file's size in bytes
//! - `get_slice filename offset size` - Get `size` bytes of a file starting
//!   at `offset`, base64-encoded
//! - `quit` - Close the connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ from_token()│───>│  arity()    │───>│  cmd_*()    │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                          FileStore          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every failure is resolved here into a [`StatusCode`]; nothing escapes
//! as a panic or an I/O error.

use crate::protocol::{is_valid_filename, Request, Response, StatusCode};
use crate::storage::{FileStore, StoreError};
use std::num::IntErrorKind;
use std::sync::Arc;
use tracing::{debug, warn};

/// The commands understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Quit,
    GetFileListing,
    GetMetadata,
    GetSlice,
}

impl Command {
    /// Every supported command.
    pub const ALL: [Command; 4] = [
        Command::Quit,
        Command::GetFileListing,
        Command::GetMetadata,
        Command::GetSlice,
    ];

    /// Maps a command token to its command. Tokens are case-sensitive.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.name() == token)
    }

    /// The token that selects this command.
    pub fn name(self) -> &'static str {
        match self {
            Command::Quit => "quit",
            Command::GetFileListing => "get_file_listing",
            Command::GetMetadata => "get_metadata",
            Command::GetSlice => "get_slice",
        }
    }

    /// Number of tokens a well-formed request has, the command included.
    pub fn arity(self) -> usize {
        match self {
            Command::Quit | Command::GetFileListing => 1,
            Command::GetMetadata => 2,
            Command::GetSlice => 4,
        }
    }
}

/// Result of a single command: a response, or the status that rejected it.
type CommandResult = Result<Response, StatusCode>;

/// Executes HFTP commands against a serving directory.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// The serving directory (shared across connections)
    store: Arc<FileStore>,
}

impl CommandHandler {
    /// Creates a new command handler serving files from `store`.
    pub fn new(store: Arc<FileStore>) -> Self {
        Self { store }
    }

    /// Executes a request and returns the response.
    pub async fn execute(&self, request: &Request) -> Response {
        let command = match Command::from_token(request.command()) {
            Some(command) => command,
            None => {
                debug!(command = request.command(), "Unknown command");
                return Response::Error(StatusCode::InvalidCommand);
            }
        };

        self.dispatch(command, request.tokens())
            .await
            .unwrap_or_else(Response::Error)
    }

    /// Dispatches a command to its handler.
    ///
    /// `args` holds every request token, so `args[0]` is the command itself.
    async fn dispatch(&self, command: Command, args: &[String]) -> CommandResult {
        if args.len() != command.arity() {
            return Err(StatusCode::InvalidArguments);
        }

        match command {
            Command::Quit => Ok(Response::Goodbye),
            Command::GetFileListing => self.cmd_get_file_listing().await,
            Command::GetMetadata => self.cmd_get_metadata(&args[1]).await,
            Command::GetSlice => self.cmd_get_slice(&args[1], &args[2], &args[3]).await,
        }
    }

    /// get_file_listing
    async fn cmd_get_file_listing(&self) -> CommandResult {
        let names = self.store.list_entries().await.map_err(internal_error)?;

        let names = names
            .into_iter()
            .filter(|name| {
                if name.is_ascii() {
                    true
                } else {
                    warn!(name = %name, "Skipping entry with non-ASCII name");
                    false
                }
            })
            .collect();

        Ok(Response::Listing(names))
    }

    /// get_metadata filename
    async fn cmd_get_metadata(&self, filename: &str) -> CommandResult {
        let filename = check_filename(filename)?;
        let size = self.file_size(filename).await?;
        Ok(Response::Metadata(size))
    }

    /// get_slice filename offset size
    async fn cmd_get_slice(&self, filename: &str, offset: &str, size: &str) -> CommandResult {
        let offset = parse_integer(offset)?;
        let size = parse_integer(size)?;
        let filename = check_filename(filename)?;

        let file_size = i64::try_from(self.file_size(filename).await?).unwrap_or(i64::MAX);

        // The size bound is checked before the offset bound
        if size < 0 || size > file_size {
            return Err(StatusCode::InvalidArguments);
        }
        if offset < 0 || offset > file_size || offset.saturating_add(size) > file_size {
            return Err(StatusCode::BadOffset);
        }

        let len = usize::try_from(size).map_err(|_| StatusCode::InternalError)?;
        let data = self
            .store
            .read_slice(filename, offset as u64, len)
            .await
            .map_err(internal_error)?;

        Ok(Response::Slice(data))
    }

    // ========================================================================
    // Helper functions
    // ========================================================================

    /// Returns the size of an existing file in the serving directory.
    async fn file_size(&self, filename: &str) -> Result<u64, StatusCode> {
        if !self.store.exists(filename).await.map_err(internal_error)? {
            return Err(StatusCode::FileNotFound);
        }
        self.store.size(filename).await.map_err(internal_error)
    }
}

/// Rejects filenames outside the allow-list before any filesystem access.
fn check_filename(filename: &str) -> Result<&str, StatusCode> {
    if is_valid_filename(filename) {
        Ok(filename)
    } else {
        debug!(filename = %filename, "Rejected filename");
        Err(StatusCode::InvalidArguments)
    }
}

/// Parses a signed decimal integer argument.
///
/// Out-of-range values saturate so they fail the range checks like any
/// other oversized number.
fn parse_integer(token: &str) -> Result<i64, StatusCode> {
    match token.parse::<i64>() {
        Ok(n) => Ok(n),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Ok(i64::MAX),
            IntErrorKind::NegOverflow => Ok(i64::MIN),
            _ => Err(StatusCode::InvalidArguments),
        },
    }
}

/// Maps a filesystem failure to INTERNAL_ERROR.
///
/// A not-found error here means the file disappeared after its existence
/// was checked.
fn internal_error(err: StoreError) -> StatusCode {
    warn!(error = %err, vanished = err.is_not_found(), "Filesystem error");
    StatusCode::InternalError
}
