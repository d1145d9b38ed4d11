//! Handles for the body of the current request and response.
//!
//! Both handles borrow the session exclusively, so at most one of them exists at a time and
//! neither can outlive the exchange it belongs to. Dropping a handle does not end the body: the
//! framing state stays with the session, and the body can be resumed with
//! [`ClientSession::request_body`] or [`ClientSession::response_body`].

use std::fmt;
use std::io;

use super::conn::Transport;
use super::{ClientSession, Error};

/// Writes the body of the request being sent.
///
/// Bytes are framed according to the request head: chunked, bounded by the declared
/// `Content-Length`, or passed through unchanged.
pub struct RequestBody<'s, T: Transport> {
    session: &'s mut ClientSession<T>,
}

impl<'s, T: Transport> RequestBody<'s, T> {
    pub(crate) fn new(session: &'s mut ClientSession<T>) -> Self {
        Self { session }
    }

    /// Finish the body, as [`ClientSession::flush_request`] does.
    pub fn finish(self) -> Result<(), Error> {
        self.session.flush_request()
    }
}

impl<T: Transport> io::Write for RequestBody<'_, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.session.write_body(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.session.flush_transport()
    }
}

impl<T: Transport> fmt::Debug for RequestBody<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBody").finish_non_exhaustive()
    }
}

/// Reads the body of the response being received.
///
/// `read` returns `Ok(0)` once the body is complete. A body which ends early fails with
/// [`io::ErrorKind::UnexpectedEof`], and closes the connection.
pub struct ResponseBody<'s, T: Transport> {
    session: &'s mut ClientSession<T>,
}

impl<'s, T: Transport> ResponseBody<'s, T> {
    pub(crate) fn new(session: &'s mut ClientSession<T>) -> Self {
        Self { session }
    }

    /// Whether the whole body has been read.
    pub fn is_done(&self) -> bool {
        self.session.body_done()
    }
}

impl<T: Transport> io::Read for ResponseBody<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.session.read_body(buf)
    }
}

impl<T: Transport> fmt::Debug for ResponseBody<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("done", &self.is_done())
            .finish()
    }
}
