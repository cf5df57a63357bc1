//! Incremental Request Framer
//!
//! HFTP requests are single ASCII lines terminated by `\r\n`. TCP is a
//! stream protocol, so a read may deliver half a request, or several
//! pipelined requests at once. The framer pulls complete request lines out
//! of the connection's receive buffer and leaves partial data in place
//! until more arrives.
//!
//! ## How the Framer Works
//!
//! 1. Every chunk read from the socket is checked for non-ASCII bytes
//!    before it is appended to the buffer ([`RequestFramer::check_chunk`]).
//! 2. [`RequestFramer::next_request`] is called repeatedly:
//!    - `Ok(Some(line))` - a complete request was removed from the buffer
//!    - `Ok(None)` - no terminator yet, wait for more data
//!    - `Err(FrameError)` - the client violated the framing rules
//!
//! The framer remembers how far it has already scanned, so a long request
//! trickling in byte by byte is not rescanned from the start on every read.

use crate::protocol::types::{StatusCode, EOL};
use bytes::{Buf, BytesMut};
use thiserror::Error;

/// Errors that can occur while framing requests.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A request line contained a `\n` that was not part of `\r\n`
    #[error("stray newline in request line")]
    BadEol,

    /// The client sent a byte outside the ASCII range
    #[error("non-ASCII byte {byte:#04x} at offset {offset}")]
    NonAscii { byte: u8, offset: usize },

    /// The buffered request exceeds the configured maximum
    #[error("request too large: {size} bytes (max: {max})")]
    RequestTooLarge { size: usize, max: usize },
}

impl FrameError {
    /// The status code reported to the client for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            FrameError::BadEol => StatusCode::BadEol,
            FrameError::NonAscii { .. } | FrameError::RequestTooLarge { .. } => {
                StatusCode::BadRequest
            }
        }
    }
}

/// Result type for framing operations.
pub type FrameResult<T> = Result<T, FrameError>;

/// Default limit for a single unterminated request (64 KB)
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 64 * 1024;

/// Extracts `\r\n`-terminated request lines from a receive buffer.
#[derive(Debug)]
pub struct RequestFramer {
    /// Bytes at the front of the buffer already known to contain no EOL
    scanned: usize,

    /// Largest unterminated request we are willing to buffer
    max_request_size: usize,
}

impl Default for RequestFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUEST_SIZE)
    }
}

impl RequestFramer {
    /// Creates a framer that rejects requests larger than `max_request_size`.
    pub fn new(max_request_size: usize) -> Self {
        Self {
            scanned: 0,
            max_request_size,
        }
    }

    /// Validates a freshly received chunk before it joins the buffer.
    pub fn check_chunk(chunk: &[u8]) -> FrameResult<()> {
        match chunk.iter().position(|b| !b.is_ascii()) {
            Some(offset) => Err(FrameError::NonAscii {
                byte: chunk[offset],
                offset,
            }),
            None => Ok(()),
        }
    }

    /// Removes the next complete request from `buf`.
    ///
    /// The request text and its terminator are consumed; anything after the
    /// terminator stays in `buf` for the next call.
    pub fn next_request(&mut self, buf: &mut BytesMut) -> FrameResult<Option<String>> {
        // A terminator may straddle the boundary of the previous scan
        let start = self.scanned.saturating_sub(EOL.len() - 1).min(buf.len());

        match find_eol(&buf[start..]) {
            Some(pos) => {
                let line = buf.split_to(start + pos);
                buf.advance(EOL.len());
                self.scanned = 0;

                if line.contains(&b'\n') {
                    return Err(FrameError::BadEol);
                }

                let line = String::from_utf8(line.to_vec()).map_err(|e| {
                    let offset = e.utf8_error().valid_up_to();
                    FrameError::NonAscii {
                        byte: line[offset],
                        offset,
                    }
                })?;
                Ok(Some(line))
            }
            None => {
                self.scanned = buf.len();
                if buf.len() > self.max_request_size {
                    return Err(FrameError::RequestTooLarge {
                        size: buf.len(),
                        max: self.max_request_size,
                    });
                }
                Ok(None)
            }
        }
    }
}

/// Finds the position of the first `\r\n` in the buffer.
fn find_eol(buf: &[u8]) -> Option<usize> {
    buf.windows(EOL.len()).position(|window| window == EOL)
}

/// A request split into its command token and arguments.
///
/// `tokens()[0]` is always the command; the remaining tokens are its
/// arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    tokens: Vec<String>,
}

impl Request {
    /// Splits a request line on runs of whitespace, vertical tab included.
    ///
    /// Returns `None` for a line with no tokens, which the server ignores.
    pub fn parse(line: &str) -> Option<Self> {
        let tokens: Vec<String> = line.split_whitespace().map(String::from).collect();
        if tokens.is_empty() {
            None
        } else {
            Some(Self { tokens })
        }
    }

    /// The command token.
    pub fn command(&self) -> &str {
        &self.tokens[0]
    }

    /// All tokens, command included.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}
