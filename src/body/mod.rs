//! Message body framing for HTTP/1.x.
//!
//! A body on an HTTP/1.x connection is delimited in one of three ways: by a
//! declared length, by chunked transfer encoding, or by the sender closing the
//! connection. [`BodyWriter`] applies one of these framings to outgoing bytes,
//! and [`BodyReader`] removes it from incoming bytes.
//!
//! Both are sans-IO state machines: the writer appends framed bytes to a
//! buffer which the caller then sends, and the reader pulls from any
//! [`BufRead`](std::io::BufRead) source.

mod reader;
mod writer;

pub use self::reader::BodyReader;
pub use self::writer::{BodyWriter, IncompleteBody};
