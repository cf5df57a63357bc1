//! Command Module
//!
//! This module implements the command processing layer of the server.
//! It receives tokenized requests, dispatches them to the matching command
//! and returns the response to send.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ RequestFramer   │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ FileStore       │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `get_file_listing`
//! - `get_metadata filename`
//! - `get_slice filename offset size`
//! - `quit`

pub mod handler;

// Re-export the main command types
pub use handler::{Command, CommandHandler};
