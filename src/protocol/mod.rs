//! HFTP Protocol Implementation
//!
//! This module provides the wire side of HFTP, a minimal line-oriented file
//! transfer protocol.
//!
//! ## Overview
//!
//! A client sends ASCII command lines terminated by `\r\n` and receives a
//! status line, optionally followed by a payload. File content travels as
//! base64 text so the whole conversation stays printable.
//!
//! ## Modules
//!
//! - `types`: Status codes, responses and their serialization
//! - `parser`: Incremental framer for incoming request lines
//!
//! ## Example
//!
//! ```
//! use hftp::protocol::{Request, RequestFramer, Response, StatusCode};
//! use bytes::BytesMut;
//!
//! // Framing incoming data
//! let mut framer = RequestFramer::default();
//! let mut buffer = BytesMut::from(&b"get_metadata a.txt\r\n"[..]);
//! let line = framer.next_request(&mut buffer).unwrap().unwrap();
//! let request = Request::parse(&line).unwrap();
//! assert_eq!(request.command(), "get_metadata");
//!
//! // Creating responses
//! let response = Response::Error(StatusCode::FileNotFound);
//! assert_eq!(response.serialize(), b"202 FILE NOT FOUND \r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{FrameError, FrameResult, Request, RequestFramer, DEFAULT_MAX_REQUEST_SIZE};
pub use types::{is_valid_filename, Response, StatusCode, EOL};
