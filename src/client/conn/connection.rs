//! The endpoint of a session: a transport, the bytes buffered from it, and
//! the routing needed to (re)open it.

use std::fmt;
use std::io::{self, BufRead, Read};

use bytes::{Buf as _, Bytes, BytesMut};
use tracing::{debug, trace};

use super::transport::Transport;
use crate::client::proxy::{self, ProxyConfig};
use crate::client::Error;

/// Size of each read issued to the transport when buffering input.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// A raw connection released by one session, together with any bytes that
/// session had already read from it but not consumed.
#[derive(Debug)]
pub struct Detached<C> {
    /// The raw connection.
    pub connection: C,
    /// Bytes received on the connection which have not been consumed yet.
    pub buffered: Bytes,
}

impl<C> Detached<C> {
    /// Wrap a raw connection with nothing buffered.
    pub fn new(connection: C) -> Self {
        Self {
            connection,
            buffered: Bytes::new(),
        }
    }
}

/// The transport of a session, together with its connection identity.
///
/// Host, port and proxy settings may only change while the transport is not connected.
pub struct Connection<T> {
    transport: T,
    input: BytesMut,
    host: String,
    port: u16,
    proxy: ProxyConfig,
    tunnel: bool,
}

impl<T: Transport> fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("transport", &self.transport)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("proxy", &self.proxy)
            .field("tunnel", &self.tunnel)
            .field("buffered", &self.input.len())
            .finish()
    }
}

impl<T: Transport> Connection<T> {
    /// Create a new, unconnected endpoint.
    pub fn new(transport: T, host: String, port: u16, proxy: ProxyConfig) -> Self {
        Self {
            transport,
            input: BytesMut::new(),
            host,
            port,
            proxy,
            tunnel: false,
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Whether the transport is connected.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// The target host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The target port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The proxy configuration.
    pub fn proxy(&self) -> &ProxyConfig {
        &self.proxy
    }

    /// Whether proxied connections are tunnelled with `CONNECT`.
    pub fn tunnel(&self) -> bool {
        self.tunnel
    }

    pub(crate) fn set_host(&mut self, host: String) -> Result<(), Error> {
        self.ensure_disconnected("cannot set the host for an already connected session")?;
        self.host = host;
        Ok(())
    }

    pub(crate) fn set_port(&mut self, port: u16) -> Result<(), Error> {
        self.ensure_disconnected("cannot set the port for an already connected session")?;
        self.port = port;
        Ok(())
    }

    pub(crate) fn set_tunnel(&mut self, tunnel: bool) -> Result<(), Error> {
        self.ensure_disconnected("cannot change tunnelling for an already connected session")?;
        self.tunnel = tunnel;
        Ok(())
    }

    /// Mutable access to the proxy configuration, only while disconnected.
    pub(crate) fn proxy_mut(&mut self, message: &'static str) -> Result<&mut ProxyConfig, Error> {
        self.ensure_disconnected(message)?;
        Ok(&mut self.proxy)
    }

    /// Mutable access to the proxy configuration, regardless of connection state.
    ///
    /// Only for settings which do not change where the connection goes.
    pub(crate) fn proxy_settings_mut(&mut self) -> &mut ProxyConfig {
        &mut self.proxy
    }

    fn ensure_disconnected(&self, message: &'static str) -> Result<(), Error> {
        if self.transport.is_connected() {
            Err(Error::State(message))
        } else {
            Ok(())
        }
    }

    /// Whether requests on this connection go to a forward proxy and must be rewritten.
    pub fn forwards_through_proxy(&self) -> bool {
        !self.tunnel && self.proxy.applies_to(&self.host)
    }

    /// Open the transport, following the routing rules.
    ///
    /// Without an applicable proxy the transport connects to the target. With one,
    /// it connects to the proxy, or tunnels through it when tunnelling is enabled.
    pub fn reconnect(&mut self) -> Result<(), Error> {
        self.input.clear();

        if !self.proxy.applies_to(&self.host) {
            debug!(host = %self.host, port = self.port, "connecting");
            self.transport.connect(&self.host, self.port)?;
        } else if self.tunnel {
            let detached = proxy::tunnel(&self.transport, &self.proxy, &self.host, self.port)?;
            self.attach(detached);
        } else {
            debug!(proxy = %self.proxy.host, port = self.proxy.port, "connecting to proxy");
            self.transport.connect(&self.proxy.host, self.proxy.port)?;
        }

        Ok(())
    }

    /// Close the transport and drop any buffered input.
    pub fn close(&mut self) {
        if self.transport.is_connected() {
            trace!(host = %self.host, "closing connection");
        }
        self.transport.close();
        self.input.clear();
    }

    /// Write all of `buf` to the transport.
    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        trace!(bytes = buf.len(), "write");
        self.transport.write_all(buf)
    }

    /// Flush the transport.
    pub fn flush(&mut self) -> io::Result<()> {
        self.transport.flush()
    }

    /// A buffered reader over the transport.
    pub fn input(&mut self) -> Input<'_, T> {
        Input { conn: self }
    }

    /// Release the raw connection and buffered input.
    pub fn detach(&mut self) -> Option<Detached<T::Connection>> {
        let connection = self.transport.detach()?;
        let buffered = self.input.split().freeze();
        Some(Detached {
            connection,
            buffered,
        })
    }

    /// Adopt a raw connection and its buffered input, closing the current one.
    pub fn attach(&mut self, detached: Detached<T::Connection>) {
        self.close();
        self.transport.attach(detached.connection);
        self.input.extend_from_slice(&detached.buffered);
    }

    fn fill(&mut self) -> io::Result<()> {
        if self.input.is_empty() {
            let mut chunk = [0u8; READ_BUFFER_SIZE];
            let n = self.transport.read(&mut chunk)?;
            trace!(bytes = n, "read");
            self.input.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }
}

/// Buffered reader over a [`Connection`].
#[derive(Debug)]
pub struct Input<'c, T: Transport> {
    conn: &'c mut Connection<T>,
}

impl<T: Transport> Read for Input<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.conn.input.is_empty() && buf.len() >= READ_BUFFER_SIZE {
            return self.conn.transport.read(buf);
        }

        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<T: Transport> BufRead for Input<'_, T> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.conn.fill()?;
        Ok(&self.conn.input[..])
    }

    fn consume(&mut self, amt: usize) {
        self.conn.input.advance(amt);
    }
}
