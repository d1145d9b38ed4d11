//! Selection of body framing for requests and responses.
//!
//! A receiver must know in advance how a body ends, so framing is always
//! computed from the message head, never assumed.

use http::{header, Method, StatusCode};

use crate::body::{BodyReader, BodyWriter};
use crate::message::{Request, Response};

/// How an outgoing request is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFraming {
    /// Head written verbatim, followed by a chunked body.
    Chunked,

    /// Head and a body of the declared length, bounded together.
    Length(u64),

    /// Only the head; no body is expected.
    HeadOnly,

    /// Head followed by a body ended by closing the connection.
    CloseDelimited,
}

impl OutputFraming {
    /// Choose the framing for `request`.
    pub fn select(request: &Request) -> Self {
        if request.chunked_transfer_encoding() {
            OutputFraming::Chunked
        } else if let Some(length) = request.content_length() {
            OutputFraming::Length(length)
        } else if !carries_body(request.method()) || request.has(&header::UPGRADE) {
            OutputFraming::HeadOnly
        } else {
            OutputFraming::CloseDelimited
        }
    }

    /// Whether the head is written through the body writer and counted against its bound.
    pub fn bounds_head(&self) -> bool {
        matches!(self, OutputFraming::Length(_) | OutputFraming::HeadOnly)
    }

    /// The writer for a request whose serialized head is `head_len` bytes long.
    pub fn writer(&self, head_len: u64) -> BodyWriter {
        match *self {
            OutputFraming::Chunked => BodyWriter::chunked(),
            OutputFraming::Length(length) => BodyWriter::length(length.saturating_add(head_len)),
            OutputFraming::HeadOnly => BodyWriter::length(head_len),
            OutputFraming::CloseDelimited => BodyWriter::close_delimited(),
        }
    }
}

/// How an incoming response body is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFraming {
    /// There is no body.
    Empty,

    /// The body uses chunked transfer encoding.
    Chunked,

    /// The body is exactly this many bytes.
    Length(u64),

    /// The body ends when the connection is closed.
    CloseDelimited,
}

impl InputFraming {
    /// Choose the framing for `response`. `expect_body` is false when the request was `HEAD`.
    pub fn select(expect_body: bool, response: &Response) -> Self {
        let status = response.status();
        if !expect_body
            || status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
        {
            InputFraming::Empty
        } else if response.chunked_transfer_encoding() {
            InputFraming::Chunked
        } else if let Some(length) = response.content_length() {
            InputFraming::Length(length)
        } else {
            InputFraming::CloseDelimited
        }
    }

    /// The reader which removes this framing.
    pub fn reader(&self) -> BodyReader {
        match *self {
            InputFraming::Empty => BodyReader::empty(),
            InputFraming::Chunked => BodyReader::chunked(),
            InputFraming::Length(length) => BodyReader::length(length),
            InputFraming::CloseDelimited => BodyReader::close_delimited(),
        }
    }
}

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::PUT | Method::POST | Method::PATCH)
}
