//! Transport streams for connecting to remote servers.
//!
//! Transports are responsible for establishing a connection to a remote server and shuffling bytes back and
//! forth. A transport owns at most one connection at a time, and is exclusively owned by a single session.

use std::fmt;
use std::io;
use std::time::Duration;

#[cfg(any(test, feature = "mocks"))]
pub mod mock;
#[cfg(feature = "tcp")]
pub mod tcp;

/// A blocking, connection-oriented byte stream.
///
/// All I/O blocks the calling thread for at most [`timeout`][Transport::timeout].
/// Reading or writing while not connected fails with [`io::ErrorKind::NotConnected`].
pub trait Transport: fmt::Debug {
    /// The raw connection handed from one transport to another.
    type Connection: fmt::Debug;

    /// A new, unconnected transport with the same configuration as this one.
    fn fresh(&self) -> Self
    where
        Self: Sized;

    /// Open a connection to `host:port`. The transport must not already be connected.
    fn connect(&mut self, host: &str, port: u16) -> io::Result<()>;

    /// Whether a connection is currently open.
    fn is_connected(&self) -> bool;

    /// Close the current connection, if any. Closing an unconnected transport does nothing.
    fn close(&mut self);

    /// Read bytes from the connection. `Ok(0)` signals the end of the stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write bytes to the connection, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Flush any bytes buffered by the transport.
    fn flush(&mut self) -> io::Result<()>;

    /// The I/O timeout applied to reads, writes and connection attempts.
    fn timeout(&self) -> Duration;

    /// Set the I/O timeout.
    fn set_timeout(&mut self, timeout: Duration);

    /// Give up ownership of the current connection, leaving this transport unconnected.
    fn detach(&mut self) -> Option<Self::Connection>;

    /// Adopt a connection, closing any connection currently held.
    fn attach(&mut self, connection: Self::Connection);

    /// Write all of `buf`, retrying on interruption.
    fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole buffer",
                    ))
                }
                Ok(n) => buf = &buf[n..],
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

pub(crate) fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is not connected")
}
