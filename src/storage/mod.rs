//! Storage Module
//!
//! This module provides read-only access to the serving directory.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        FileStore                            │
//! │                                                             │
//! │   list_entries()   size()   exists()   read_slice()         │
//! │         │             │        │            │               │
//! │         └─────────────┴────────┴────────────┘               │
//! │                         tokio::fs                           │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//!                   serving directory
//! ```
//!
//! A single `FileStore` is shared by every connection. It holds no mutable
//! state, so it needs no locking.
//!
//! ## Example
//!
//! ```no_run
//! use hftp::storage::FileStore;
//!
//! # async fn demo() -> Result<(), hftp::storage::StoreError> {
//! let store = FileStore::new("testdata");
//! for name in store.list_entries().await? {
//!     println!("{name}: {} bytes", store.size(&name).await?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod store;

// Re-export commonly used types
pub use store::{FileStore, StoreError, StoreResult};
