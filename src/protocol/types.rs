//! HFTP Wire Types
//!
//! This module defines the vocabulary of the HFTP protocol: the line
//! terminator, the status code table, and the responses the server sends.
//!
//! ## Protocol Format
//!
//! Every response starts with a status line:
//!
//! ```text
//! <code> <message> \r\n
//! ```
//!
//! Successful commands may follow the status line with a payload:
//!
//! - `get_file_listing`: one `name\r\n` per entry, then a bare `\r\n`
//! - `get_metadata`: `<size>\r\n`
//! - `get_slice`: `<base64 data>\r\n`
//!
//! ## Status Codes
//!
//! Codes in the `1xx` range are fatal: the server closes the connection
//! right after sending them. Codes in the `2xx` range only reject the
//! current request.

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use std::fmt;

/// The end-of-line marker terminating every request and response line
pub const EOL: &[u8] = b"\r\n";

/// Punctuation allowed in filenames besides ASCII letters and digits
pub const FILENAME_PUNCTUATION: &[u8] = b".-_";

/// Status codes sent at the start of every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// The command succeeded
    Ok,
    /// A request line contained a stray `\n`
    BadEol,
    /// The request could not be decoded as ASCII or was too large
    BadRequest,
    /// The server failed while serving the request
    InternalError,
    /// Unknown command token
    InvalidCommand,
    /// Wrong number of arguments or malformed argument
    InvalidArguments,
    /// The requested file does not exist
    FileNotFound,
    /// The requested range falls outside the file
    BadOffset,
}

impl StatusCode {
    /// Every status code, in wire-code order.
    pub const ALL: [StatusCode; 8] = [
        StatusCode::Ok,
        StatusCode::BadEol,
        StatusCode::BadRequest,
        StatusCode::InternalError,
        StatusCode::InvalidCommand,
        StatusCode::InvalidArguments,
        StatusCode::FileNotFound,
        StatusCode::BadOffset,
    ];

    /// The numeric code sent on the wire.
    pub fn code(self) -> u16 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::BadEol => 100,
            StatusCode::BadRequest => 101,
            StatusCode::InternalError => 199,
            StatusCode::InvalidCommand => 200,
            StatusCode::InvalidArguments => 201,
            StatusCode::FileNotFound => 202,
            StatusCode::BadOffset => 203,
        }
    }

    /// The fixed human-readable message paired with the code.
    pub fn message(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadEol => "BAD EOL",
            StatusCode::BadRequest => "BAD REQUEST",
            StatusCode::InternalError => "INTERNAL SERVER ERROR",
            StatusCode::InvalidCommand => "NO SUCH COMMAND",
            StatusCode::InvalidArguments => "INVALID ARGUMENTS FOR COMMAND",
            StatusCode::FileNotFound => "FILE NOT FOUND",
            StatusCode::BadOffset => "OFFSET EXCEEDS FILE SIZE",
        }
    }

    /// Returns true if the connection must be closed after sending this code.
    pub fn is_fatal(self) -> bool {
        (100..200).contains(&self.code())
    }

    /// Appends the status line (`<code> <message> \r\n`) to `buf`.
    pub fn write_line(self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.code().to_string().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.message().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(EOL);
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.message())
    }
}

/// A complete reply to one request.
///
/// Every variant except `Error` is sent with a [`StatusCode::Ok`] status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Directory entry names, terminated on the wire by an empty line
    Listing(Vec<String>),

    /// File size in bytes
    Metadata(u64),

    /// Raw file bytes, base64-encoded when serialized
    Slice(Bytes),

    /// Acknowledges `quit`; the connection closes afterwards
    Goodbye,

    /// A status line with no payload
    Error(StatusCode),
}

impl Response {
    /// The status code this response starts with.
    pub fn status(&self) -> StatusCode {
        match self {
            Response::Error(code) => *code,
            _ => StatusCode::Ok,
        }
    }

    /// Returns true if the connection ends once this response is sent.
    pub fn closes_connection(&self) -> bool {
        match self {
            Response::Goodbye => true,
            Response::Error(code) => code.is_fatal(),
            _ => false,
        }
    }

    /// Serializes the response to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the response into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        self.status().write_line(buf);
        match self {
            Response::Listing(names) => {
                for name in names {
                    buf.extend_from_slice(name.as_bytes());
                    buf.extend_from_slice(EOL);
                }
                buf.extend_from_slice(EOL);
            }
            Response::Metadata(size) => {
                buf.extend_from_slice(size.to_string().as_bytes());
                buf.extend_from_slice(EOL);
            }
            Response::Slice(data) => {
                buf.extend_from_slice(general_purpose::STANDARD.encode(data).as_bytes());
                buf.extend_from_slice(EOL);
            }
            Response::Goodbye | Response::Error(_) => {}
        }
    }
}

impl From<StatusCode> for Response {
    fn from(code: StatusCode) -> Self {
        Response::Error(code)
    }
}

/// Returns true if `name` is a safe filename to resolve under the serving
/// directory.
///
/// Only ASCII letters, digits and [`FILENAME_PUNCTUATION`] are allowed, so
/// path separators can never appear. `.` and `..` are made of allowed
/// characters but still name directories outside the file set, so they are
/// rejected as well.
pub fn is_valid_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || FILENAME_PUNCTUATION.contains(&b))
}
