use std::fmt;

use bytes::{BufMut as _, BytesMut};
use thiserror::Error;

/// A length-delimited body was finished before all declared bytes were written.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("body finished after {written} of {expected} bytes")]
pub struct IncompleteBody {
    /// Bytes that were declared.
    pub expected: u64,
    /// Bytes that were actually written.
    pub written: u64,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Chunked { finished: bool },
    Length { total: u64, remaining: u64 },
    CloseDelimited,
}

/// Applies framing to an outgoing body.
#[derive(Clone, PartialEq, Eq)]
pub struct BodyWriter {
    kind: Kind,
}

impl BodyWriter {
    /// Frame the body with chunked transfer encoding.
    pub fn chunked() -> Self {
        Self {
            kind: Kind::Chunked { finished: false },
        }
    }

    /// Accept exactly `length` bytes, and nothing more.
    pub fn length(length: u64) -> Self {
        Self {
            kind: Kind::Length {
                total: length,
                remaining: length,
            },
        }
    }

    /// Pass bytes through unchanged; the end of the body is signalled by closing the connection.
    pub fn close_delimited() -> Self {
        Self {
            kind: Kind::CloseDelimited,
        }
    }

    /// Whether this writer uses chunked transfer encoding.
    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked { .. })
    }

    /// Bytes still accepted by a length-delimited writer.
    pub fn remaining(&self) -> Option<u64> {
        match self.kind {
            Kind::Length { remaining, .. } => Some(remaining),
            _ => None,
        }
    }

    /// Frame as much of `buf` as this writer accepts, appending the wire bytes to `dst`.
    ///
    /// Returns the number of bytes of `buf` consumed. A length-delimited writer
    /// stops at its boundary, and a finished chunked writer accepts nothing,
    /// so a return of zero for a non-empty `buf` means the body is full.
    pub fn encode(&mut self, buf: &[u8], dst: &mut BytesMut) -> usize {
        if buf.is_empty() {
            return 0;
        }

        match &mut self.kind {
            Kind::Chunked { finished: true } => 0,
            Kind::Chunked { finished: false } => {
                dst.reserve(buf.len() + 20);
                dst.put_slice(format!("{:X}\r\n", buf.len()).as_bytes());
                dst.put_slice(buf);
                dst.put_slice(b"\r\n");
                buf.len()
            }
            Kind::Length { remaining, .. } => {
                let n = usize::try_from(*remaining).map_or(buf.len(), |r| r.min(buf.len()));
                dst.put_slice(&buf[..n]);
                *remaining -= n as u64;
                n
            }
            Kind::CloseDelimited => {
                dst.put_slice(buf);
                buf.len()
            }
        }
    }

    /// Append any bytes which terminate the body to `dst`.
    ///
    /// Finishing a chunked body more than once writes the terminator only once.
    pub fn finish(&mut self, dst: &mut BytesMut) -> Result<(), IncompleteBody> {
        match &mut self.kind {
            Kind::Chunked { finished } => {
                if !*finished {
                    dst.put_slice(b"0\r\n\r\n");
                    *finished = true;
                }
                Ok(())
            }
            Kind::Length {
                total,
                remaining: 0,
            } => {
                tracing::trace!(bytes = *total, "length-delimited body complete");
                Ok(())
            }
            Kind::Length { total, remaining } => Err(IncompleteBody {
                expected: *total,
                written: *total - *remaining,
            }),
            Kind::CloseDelimited => Ok(()),
        }
    }
}

impl fmt::Debug for BodyWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Kind::Chunked { finished } => f
                .debug_struct("Chunked")
                .field("finished", &finished)
                .finish(),
            Kind::Length { total, remaining } => f
                .debug_struct("Length")
                .field("total", &total)
                .field("remaining", &remaining)
                .finish(),
            Kind::CloseDelimited => f.write_str("CloseDelimited"),
        }
    }
}
