use std::fmt;
use std::io::{self, BufRead};

use crate::message::{read_line, ReadError, MAX_LINE_LENGTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chunk {
    Size,
    Data(u64),
    DataEnd,
    Trailers,
    Done,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Length(u64),
    Chunked(Chunk),
    CloseDelimited { eof: bool },
}

/// Removes framing from an incoming body.
#[derive(Clone, PartialEq, Eq)]
pub struct BodyReader {
    kind: Kind,
}

impl BodyReader {
    /// A body with no bytes at all.
    pub fn empty() -> Self {
        Self::length(0)
    }

    /// A body of exactly `length` bytes.
    pub fn length(length: u64) -> Self {
        Self {
            kind: Kind::Length(length),
        }
    }

    /// A body sent with chunked transfer encoding.
    pub fn chunked() -> Self {
        Self {
            kind: Kind::Chunked(Chunk::Size),
        }
    }

    /// A body which ends when the connection does.
    pub fn close_delimited() -> Self {
        Self {
            kind: Kind::CloseDelimited { eof: false },
        }
    }

    /// Whether the body ends only when the connection is closed.
    pub fn is_close_delimited(&self) -> bool {
        matches!(self.kind, Kind::CloseDelimited { .. })
    }

    /// Whether every byte of the body, including any framing, has been consumed.
    pub fn is_done(&self) -> bool {
        matches!(
            self.kind,
            Kind::Length(0) | Kind::Chunked(Chunk::Done) | Kind::CloseDelimited { eof: true }
        )
    }

    /// Read body bytes from `src` into `buf`, consuming framing along the way.
    ///
    /// Returns `Ok(0)` once the body is complete. A length-delimited or chunked
    /// body whose source ends early fails with [`io::ErrorKind::UnexpectedEof`].
    pub fn read<R>(&mut self, src: &mut R, buf: &mut [u8]) -> io::Result<usize>
    where
        R: BufRead + ?Sized,
    {
        if buf.is_empty() {
            return Ok(0);
        }

        match &mut self.kind {
            Kind::Length(0) => Ok(0),
            Kind::Length(remaining) => {
                let n = copy_from(src, buf, *remaining)?;
                if n == 0 {
                    return Err(unexpected_eof("length-delimited body ended early"));
                }
                *remaining -= n as u64;
                Ok(n)
            }
            Kind::Chunked(state) => read_chunked(state, src, buf),
            Kind::CloseDelimited { eof: true } => Ok(0),
            Kind::CloseDelimited { eof } => {
                let n = copy_from(src, buf, u64::MAX)?;
                if n == 0 {
                    tracing::trace!("close-delimited body reached end of stream");
                    *eof = true;
                }
                Ok(n)
            }
        }
    }
}

impl fmt::Debug for BodyReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Kind::Length(remaining) => f.debug_tuple("Length").field(&remaining).finish(),
            Kind::Chunked(state) => f.debug_tuple("Chunked").field(&state).finish(),
            Kind::CloseDelimited { eof } => f
                .debug_struct("CloseDelimited")
                .field("eof", &eof)
                .finish(),
        }
    }
}

fn copy_from<R>(src: &mut R, buf: &mut [u8], limit: u64) -> io::Result<usize>
where
    R: BufRead + ?Sized,
{
    let available = src.fill_buf()?;
    let n = usize::try_from(limit)
        .map_or(buf.len(), |limit| limit.min(buf.len()))
        .min(available.len());
    buf[..n].copy_from_slice(&available[..n]);
    src.consume(n);
    Ok(n)
}

fn read_chunked<R>(state: &mut Chunk, src: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: BufRead + ?Sized,
{
    loop {
        match *state {
            Chunk::Size => {
                let line = framing_line(src)?
                    .ok_or_else(|| unexpected_eof("chunked body ended before chunk size"))?;
                let size = line.split(';').next().unwrap_or_default().trim();
                let size = u64::from_str_radix(size, 16).map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("invalid chunk size: {line:?}"),
                    )
                })?;
                tracing::trace!(size, "chunk");
                *state = if size == 0 {
                    Chunk::Trailers
                } else {
                    Chunk::Data(size)
                };
            }
            Chunk::Data(remaining) => {
                let n = copy_from(src, buf, remaining)?;
                if n == 0 {
                    return Err(unexpected_eof("chunked body ended inside a chunk"));
                }
                *state = if remaining == n as u64 {
                    Chunk::DataEnd
                } else {
                    Chunk::Data(remaining - n as u64)
                };
                return Ok(n);
            }
            Chunk::DataEnd => {
                match framing_line(src)? {
                    Some(line) if line.is_empty() => {}
                    Some(line) => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("expected CRLF after chunk data, found {line:?}"),
                        ))
                    }
                    None => return Err(unexpected_eof("chunked body ended after chunk data")),
                }
                *state = Chunk::Size;
            }
            Chunk::Trailers => match framing_line(src)? {
                Some(line) if !line.is_empty() => {
                    tracing::trace!(trailer = %line, "ignoring chunked trailer");
                }
                _ => *state = Chunk::Done,
            },
            Chunk::Done => return Ok(0),
        }
    }
}

fn framing_line<R>(src: &mut R) -> io::Result<Option<String>>
where
    R: BufRead + ?Sized,
{
    read_line(src, MAX_LINE_LENGTH).map_err(|error| match error {
        ReadError::Io(error) => error,
        ReadError::NoMessage => unexpected_eof("no chunk received"),
        ReadError::Parse(error) => io::Error::new(io::ErrorKind::InvalidData, error),
    })
}

fn unexpected_eof(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, message)
}
