use std::fmt;
use std::io;

use bytes::{BufMut as _, BytesMut};
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Version};

use crate::client::HTTP_PORT;

/// The head of an HTTP/1.x request: request line and header block.
///
/// The request target is kept as a string so that it can hold any of the
/// forms used on the wire: origin form (`/path?query`), absolute form when
/// talking to a forward proxy (`http://host:port/path`), or authority form for
/// `CONNECT` (`host:port`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    target: String,
    version: Version,
    headers: HeaderMap,
}

impl Default for Request {
    fn default() -> Self {
        Self::new(Method::GET, "/")
    }
}

impl Request {
    /// Create a new HTTP/1.1 request with no headers.
    pub fn new<S: Into<String>>(method: Method, target: S) -> Self {
        Self {
            method,
            target: target.into(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
        }
    }

    /// Set the protocol version for this request.
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Add a header to this request, replacing any previous value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request target, as it will be written in the request line.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Replace the request target.
    pub fn set_target<S: Into<String>>(&mut self, target: S) {
        self.target = target.into();
    }

    /// The protocol version.
    pub fn version(&self) -> Version {
        self.version
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

    /// Set a header, replacing any previous value.
    pub fn set(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// The declared body length, if any.
    pub fn content_length(&self) -> Option<u64> {
        super::content_length(&self.headers)
    }

    /// Declare the body length.
    pub fn set_content_length(&mut self, length: u64) {
        self.headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    /// Whether the body is sent with chunked transfer encoding.
    pub fn chunked_transfer_encoding(&self) -> bool {
        super::is_chunked(&self.headers)
    }

    /// Enable or disable chunked transfer encoding for the body.
    pub fn set_chunked_transfer_encoding(&mut self, chunked: bool) {
        if chunked {
            self.headers.insert(
                header::TRANSFER_ENCODING,
                HeaderValue::from_static("chunked"),
            );
        } else {
            self.headers.remove(header::TRANSFER_ENCODING);
        }
    }

    /// Whether this request asks for the connection to persist.
    pub fn keep_alive(&self) -> bool {
        super::keep_alive(self.version, &self.headers)
    }

    /// Ask for the connection to persist, or to be closed after the exchange.
    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        let value = if keep_alive { "keep-alive" } else { "close" };
        self.headers
            .insert(header::CONNECTION, HeaderValue::from_static(value));
    }

    /// Set the `Host` header. The port is omitted when it is the default HTTP port.
    pub fn set_host(&mut self, host: &str, port: u16) {
        let value = if port == HTTP_PORT {
            HeaderValue::from_str(host)
        } else {
            HeaderValue::from_str(&format!("{host}:{port}"))
        };

        match value {
            Ok(value) => {
                self.headers.insert(header::HOST, value);
            }
            Err(_) => tracing::warn!(%host, "host is not a valid header value"),
        }
    }

    /// Serialize the request head into `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_slice(self.method.as_str().as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(self.target.as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(version_str(self.version).as_bytes());
        dst.put_slice(b"\r\n");

        for (name, value) in self.headers.iter() {
            dst.put_slice(name.as_str().as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
    }

    /// Serialize the request head into a writer.
    pub fn write<W: io::Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        writer.write_all(&buf)
    }
}

impl From<http::request::Parts> for Request {
    fn from(parts: http::request::Parts) -> Self {
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| "/".to_owned());

        let mut request = Request {
            method: parts.method,
            target,
            version: parts.version,
            headers: parts.headers,
        };

        if let Some(host) = parts.uri.host() {
            if !request.has(&header::HOST) {
                request.set_host(host, parts.uri.port_u16().unwrap_or(HTTP_PORT));
            }
        }

        request
    }
}

impl<B> From<http::Request<B>> for Request {
    fn from(request: http::Request<B>) -> Self {
        let (parts, _) = request.into_parts();
        parts.into()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.target)
    }
}

pub(crate) fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        _ => "HTTP/1.1",
    }
}
