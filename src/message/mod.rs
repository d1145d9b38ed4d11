//! HTTP/1.x message heads.
//!
//! [`Request`] and [`Response`] carry the request line / status line and the
//! header block of a message, and know how to serialize (requests) and parse
//! (responses) themselves against a byte stream. Bodies are never part of these
//! types; they are framed by the session.

use thiserror::Error;

mod request;
mod response;

pub use self::request::Request;
pub use self::response::Response;

/// Longest single line accepted in a response head, including the line ending.
pub const MAX_LINE_LENGTH: usize = 8192;

/// Largest number of header fields accepted in a response head.
pub const MAX_HEADER_FIELDS: usize = 100;

/// A response head was received but could not be understood.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// The status line is not of the form `HTTP/x.y NNN reason`.
    #[error("invalid status line: {0:?}")]
    StatusLine(String),

    /// The HTTP version is not HTTP/1.0 or HTTP/1.1.
    #[error("unsupported version: {0:?}")]
    Version(String),

    /// A header line had no name, no colon, or an invalid value.
    #[error("invalid header field: {0:?}")]
    Header(String),

    /// A line exceeded [`MAX_LINE_LENGTH`].
    #[error("line too long")]
    LineTooLong,

    /// More than [`MAX_HEADER_FIELDS`] header fields were sent.
    #[error("too many header fields")]
    TooManyHeaders,

    /// The peer kept sending `100 Continue` heads.
    #[error("too many informational responses")]
    TooManyInformational,

    /// The connection ended in the middle of a head.
    #[error("message head ended prematurely")]
    Truncated,
}

/// Failure while reading a response head.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The underlying stream failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The stream ended before any part of a response was received.
    #[error("no message received")]
    NoMessage,

    /// The bytes received do not form a valid response head.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Read a single line terminated by `\n`, stripping the line ending.
///
/// Returns `Ok(None)` if the stream is already at its end.
pub(crate) fn read_line<R>(reader: &mut R, limit: usize) -> Result<Option<String>, ReadError>
where
    R: std::io::BufRead + ?Sized,
{
    Ok(read_raw_line(reader, limit)?.map(|line| String::from_utf8_lossy(&line).into_owned()))
}

/// Like [`read_line`], but the line is returned as received.
pub(crate) fn read_raw_line<R>(reader: &mut R, limit: usize) -> Result<Option<Vec<u8>>, ReadError>
where
    R: std::io::BufRead + ?Sized,
{
    use std::io::{BufRead as _, Read as _};

    let mut line = Vec::new();
    let n = reader
        .take(limit as u64 + 1)
        .read_until(b'\n', &mut line)?;

    if n == 0 {
        return Ok(None);
    }

    if line.last() != Some(&b'\n') {
        return Err(if n > limit {
            ParseError::LineTooLong.into()
        } else {
            ParseError::Truncated.into()
        });
    }

    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }

    Ok(Some(line))
}

/// True if a comma separated header contains `token`, compared case-insensitively.
pub(crate) fn has_token(value: &http::HeaderValue, token: &str) -> bool {
    value
        .to_str()
        .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
        .unwrap_or(false)
}

/// Persistent-connection semantics shared by requests and responses.
pub(crate) fn keep_alive(version: http::Version, headers: &http::HeaderMap) -> bool {
    match headers.get(http::header::CONNECTION) {
        Some(value) if has_token(value, "close") => false,
        Some(value) if has_token(value, "keep-alive") => true,
        _ => version >= http::Version::HTTP_11,
    }
}

pub(crate) fn content_length(headers: &http::HeaderMap) -> Option<u64> {
    headers
        .get(http::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

pub(crate) fn is_chunked(headers: &http::HeaderMap) -> bool {
    headers
        .get_all(http::header::TRANSFER_ENCODING)
        .iter()
        .any(|value| has_token(value, "chunked"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    #[test]
    fn read_lines() {
        let mut input = Cursor::new(&b"first\r\nsecond\nthird"[..]);
        assert_eq!(
            read_line(&mut input, 64).unwrap().as_deref(),
            Some("first")
        );
        assert_eq!(
            read_line(&mut input, 64).unwrap().as_deref(),
            Some("second")
        );
        assert!(matches!(
            read_line(&mut input, 64),
            Err(ReadError::Parse(ParseError::Truncated))
        ));
        assert!(read_line(&mut input, 64).unwrap().is_none());
    }

    #[test]
    fn read_line_limit() {
        let mut input = Cursor::new(&b"0123456789\r\n"[..]);
        assert!(matches!(
            read_line(&mut input, 4),
            Err(ReadError::Parse(ParseError::LineTooLong))
        ));
    }

    #[test]
    fn connection_tokens() {
        let mut headers = http::HeaderMap::new();
        assert!(keep_alive(http::Version::HTTP_11, &headers));
        assert!(!keep_alive(http::Version::HTTP_10, &headers));

        headers.insert(
            http::header::CONNECTION,
            http::HeaderValue::from_static("Upgrade, Close"),
        );
        assert!(!keep_alive(http::Version::HTTP_11, &headers));

        headers.insert(
            http::header::CONNECTION,
            http::HeaderValue::from_static("Keep-Alive"),
        );
        assert!(keep_alive(http::Version::HTTP_10, &headers));
    }

    #[test]
    fn chunked_transfer_encoding() {
        let mut headers = http::HeaderMap::new();
        assert!(!is_chunked(&headers));
        headers.insert(
            http::header::TRANSFER_ENCODING,
            http::HeaderValue::from_static("gzip, chunked"),
        );
        assert!(is_chunked(&headers));
    }
}
