//! # HFTP - A Minimal Line-Oriented File Transfer Server
//!
//! HFTP serves the files of one directory over TCP. Clients send ASCII
//! command lines terminated by `\r\n` and get back a status line, optionally
//! followed by a payload. File content is sent base64-encoded, so the whole
//! conversation stays printable.
//!
//! ## Features
//!
//! - **Read-only**: List files, query sizes, fetch arbitrary byte ranges
//! - **Safe names**: Filenames are allow-listed, so clients cannot leave the
//!   serving directory
//! - **Pipelining**: Several requests may arrive in one packet
//! - **Async I/O**: Built on Tokio, one task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                HFTP                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌─────────────┐                  │
//! │                     │  Request    │    │  FileStore  │                  │
//! │                     │  Framer     │    │ (tokio::fs) │                  │
//! │                     └─────────────┘    └─────────────┘                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use hftp::commands::CommandHandler;
//! use hftp::connection::{handle_connection, ConnectionConfig, ConnectionStats};
//! use hftp::storage::FileStore;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(FileStore::new("testdata"));
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("0.0.0.0:19500").await.unwrap();
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         let handler = CommandHandler::new(Arc::clone(&store));
//!         let stats = Arc::clone(&stats);
//!
//!         tokio::spawn(handle_connection(
//!             stream,
//!             addr,
//!             handler,
//!             ConnectionConfig::default(),
//!             stats,
//!         ));
//!     }
//! }
//! ```
//!
//! ## Protocol
//!
//! | Request | Success payload |
//! |---|---|
//! | `get_file_listing` | one `name\r\n` per file, then `\r\n` |
//! | `get_metadata <file>` | `<size>\r\n` |
//! | `get_slice <file> <offset> <size>` | `<base64>\r\n` |
//! | `quit` | none, the server closes the connection |
//!
//! Every response starts with `<code> <message> \r\n`; see
//! [`protocol::StatusCode`] for the table.
//!
//! ## Module Overview
//!
//! - [`protocol`]: Status codes, responses and the request framer
//! - [`commands`]: The four commands and their dispatch
//! - [`storage`]: Read-only access to the serving directory
//! - [`connection`]: Client connection management
//! - [`config`]: Command-line configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{Command, CommandHandler};
pub use config::Config;
pub use connection::{handle_connection, ConnectionConfig, ConnectionStats};
pub use protocol::{FrameError, Request, RequestFramer, Response, StatusCode};
pub use storage::{FileStore, StoreError};

/// The default port HFTP listens on
pub const DEFAULT_PORT: u16 = 19500;

/// The default host HFTP binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// The default serving directory
pub const DEFAULT_DIRECTORY: &str = "testdata";

/// Version of HFTP
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
