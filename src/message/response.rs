use std::fmt;
use std::io::BufRead;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode, Version};

use super::{read_line, read_raw_line, ParseError, ReadError, MAX_HEADER_FIELDS, MAX_LINE_LENGTH};

/// The head of an HTTP/1.x response: status line and header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    version: Version,
    status: StatusCode,
    reason: String,
    headers: HeaderMap,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            version: Version::HTTP_11,
            status: StatusCode::OK,
            reason: String::from("OK"),
            headers: HeaderMap::new(),
        }
    }
}

impl Response {
    /// Create a response head with the given status and its canonical reason phrase.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: status.canonical_reason().unwrap_or_default().to_owned(),
            ..Default::default()
        }
    }

    /// The protocol version of the response.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The reason phrase sent with the status.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// The header block.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the header block.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Check for the presence of a header.
    pub fn has(&self, name: &HeaderName) -> bool {
        self.headers.contains_key(name)
    }

    /// The declared body length, if any.
    pub fn content_length(&self) -> Option<u64> {
        super::content_length(&self.headers)
    }

    /// Whether the body is sent with chunked transfer encoding.
    pub fn chunked_transfer_encoding(&self) -> bool {
        super::is_chunked(&self.headers)
    }

    /// Whether the server allows the connection to persist after this response.
    pub fn keep_alive(&self) -> bool {
        super::keep_alive(self.version, &self.headers)
    }

    /// Reset to the default state so the head can be read again.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Read a response head from `reader`, replacing the contents of `self`.
    ///
    /// Leading empty lines are skipped. Folded header lines are joined to the
    /// preceding field with a single space.
    pub fn read<R: BufRead + ?Sized>(&mut self, reader: &mut R) -> Result<(), ReadError> {
        self.clear();

        let status_line = loop {
            match read_line(reader, MAX_LINE_LENGTH)? {
                None => return Err(ReadError::NoMessage),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line,
            }
        };

        self.parse_status_line(&status_line)?;

        let mut fields: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        loop {
            let line = read_raw_line(reader, MAX_LINE_LENGTH)?.ok_or(ParseError::Truncated)?;
            if line.is_empty() {
                break;
            }

            if line.starts_with(b" ") || line.starts_with(b"\t") {
                let (_, value) = fields.last_mut().ok_or_else(|| invalid_header(&line))?;
                value.push(b' ');
                value.extend_from_slice(trim(&line));
                continue;
            }

            if fields.len() >= MAX_HEADER_FIELDS {
                return Err(ParseError::TooManyHeaders.into());
            }

            let colon = line
                .iter()
                .position(|&b| b == b':')
                .ok_or_else(|| invalid_header(&line))?;
            fields.push((
                trim(&line[..colon]).to_vec(),
                trim(&line[colon + 1..]).to_vec(),
            ));
        }

        for (name, value) in fields {
            let name = HeaderName::from_bytes(&name).map_err(|_| invalid_header(&name))?;
            let value = HeaderValue::from_bytes(&value).map_err(|_| invalid_header(&value))?;
            self.headers.append(name, value);
        }

        Ok(())
    }

    fn parse_status_line(&mut self, line: &str) -> Result<(), ParseError> {
        let mut parts = line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        let code = parts
            .next()
            .ok_or_else(|| ParseError::StatusLine(line.to_owned()))?;
        let reason = parts.next().unwrap_or_default();

        self.version = match version {
            "HTTP/1.1" => Version::HTTP_11,
            "HTTP/1.0" => Version::HTTP_10,
            other if other.starts_with("HTTP/") => {
                return Err(ParseError::Version(other.to_owned()))
            }
            _ => return Err(ParseError::StatusLine(line.to_owned())),
        };

        self.status = StatusCode::from_bytes(code.trim().as_bytes())
            .map_err(|_| ParseError::StatusLine(line.to_owned()))?;
        self.reason = reason.trim().to_owned();

        Ok(())
    }
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

fn invalid_header(bytes: &[u8]) -> ParseError {
    ParseError::Header(String::from_utf8_lossy(bytes).into_owned())
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    fn parse(input: &[u8]) -> Result<Response, ReadError> {
        let mut response = Response::default();
        response.read(&mut Cursor::new(input))?;
        Ok(response)
    }

    #[test]
    fn parse_response_head() {
        let response = parse(
            b"\r\nHTTP/1.1 404 Not Found\r\nContent-Length: 12\r\nX-Folded: a\r\n  b\r\n\r\nbody",
        )
        .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.reason(), "Not Found");
        assert_eq!(response.content_length(), Some(12));
        assert_eq!(response.headers()["x-folded"], "a b");
        assert!(response.keep_alive());
    }

    #[test]
    fn parse_http10_without_reason() {
        let response = parse(b"HTTP/1.0 204\r\n\r\n").unwrap();
        assert_eq!(response.version(), Version::HTTP_10);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.reason(), "");
        assert!(!response.keep_alive());
    }

    #[test]
    fn empty_stream_is_no_message() {
        assert!(matches!(parse(b""), Err(ReadError::NoMessage)));
    }

    #[test]
    fn malformed_heads() {
        assert!(matches!(
            parse(b"SPDY/3 200 OK\r\n\r\n"),
            Err(ReadError::Parse(ParseError::StatusLine(_)))
        ));
        assert!(matches!(
            parse(b"HTTP/2.0 200 OK\r\n\r\n"),
            Err(ReadError::Parse(ParseError::Version(_)))
        ));
        assert!(matches!(
            parse(b"HTTP/1.1 200 OK\r\nno-colon\r\n\r\n"),
            Err(ReadError::Parse(ParseError::Header(_)))
        ));
        assert!(matches!(
            parse(b"HTTP/1.1 200 OK\r\nServer: x\r\n"),
            Err(ReadError::Parse(ParseError::Truncated))
        ));
    }

    #[test]
    fn header_field_limit() {
        let mut head = b"HTTP/1.1 200 OK\r\n".to_vec();
        for i in 0..=MAX_HEADER_FIELDS {
            head.extend_from_slice(format!("x-field-{i}: {i}\r\n").as_bytes());
        }
        head.extend_from_slice(b"\r\n");
        assert!(matches!(
            parse(&head),
            Err(ReadError::Parse(ParseError::TooManyHeaders))
        ));
    }

    #[test]
    fn header_values_keep_raw_bytes() {
        let response = parse(b"HTTP/1.1 200 OK\r\nX-Name: caf\xe9\r\n\r\n").unwrap();
        assert_eq!(response.headers()["x-name"].as_bytes(), b"caf\xe9");
    }

    #[test]
    fn clear_resets_head() {
        let mut response = parse(b"HTTP/1.1 500 Oops\r\nX: y\r\n\r\n").unwrap();
        response.clear();
        assert_eq!(response, Response::default());
    }
}
