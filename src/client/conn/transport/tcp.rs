//! TCP transport implementation for client sessions.
//!
//! This module contains the [`TcpTransport`] type, which connects to remote addresses using blocking TCP
//! sockets. It also contains the [`TcpTransportConfig`] type, which is used to configure TCP connections.
//!
//! Host names are resolved with the system resolver, and each resolved address is tried in turn until one
//! accepts the connection.

use std::fmt;
use std::io::{self, Read as _, Write as _};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs as _};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, TcpKeepalive, Type};
use tracing::{trace, warn};

use super::{not_connected, Transport};
use crate::client::DEFAULT_TIMEOUT;

/// Configuration for TCP connections.
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// The timeout for connecting to a remote address. Falls back to the I/O timeout when unset.
    pub connect_timeout: Option<Duration>,

    /// The idle time before TCP keep-alive probes are sent.
    pub keep_alive_timeout: Option<Duration>,

    /// Whether to disable Nagle's algorithm.
    pub nodelay: bool,

    /// The size of the send buffer.
    pub send_buffer_size: Option<usize>,

    /// The size of the receive buffer.
    pub recv_buffer_size: Option<usize>,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            keep_alive_timeout: Some(Duration::from_secs(90)),
            nodelay: true,
            send_buffer_size: None,
            recv_buffer_size: None,
        }
    }
}

/// A blocking TCP transport.
///
/// # Example
/// ```no_run
/// # use hypersession::client::conn::transport::{Transport, tcp::TcpTransport};
/// # fn run() -> std::io::Result<()> {
/// let mut transport = TcpTransport::default();
/// transport.connect("example.com", 80)?;
/// transport.write_all(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n")?;
/// # Ok(())
/// # }
/// ```
pub struct TcpTransport {
    config: Arc<TcpTransportConfig>,
    stream: Option<TcpStream>,
    timeout: Duration,
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("peer", &self.stream.as_ref().and_then(|s| s.peer_addr().ok()))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(TcpTransportConfig::default())
    }
}

impl TcpTransport {
    /// Create a new, unconnected TCP transport.
    pub fn new(config: TcpTransportConfig) -> Self {
        Self {
            config: Arc::new(config),
            stream: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Get the configuration for this transport.
    pub fn config(&self) -> &TcpTransportConfig {
        &self.config
    }

    /// The address of the connected peer.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    fn apply_timeout(&self, stream: &TcpStream) -> io::Result<()> {
        let timeout = Some(self.timeout).filter(|t| !t.is_zero());
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)
    }
}

impl Transport for TcpTransport {
    type Connection = TcpStream;

    fn fresh(&self) -> Self {
        Self {
            config: self.config.clone(),
            stream: None,
            timeout: self.timeout,
        }
    }

    #[tracing::instrument(skip(self), level = "debug")]
    fn connect(&mut self, host: &str, port: u16) -> io::Result<()> {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let addrs = (host, port).to_socket_addrs()?;
        let connect_timeout = self.config.connect_timeout.unwrap_or(self.timeout);

        let mut last_error = None;
        for addr in addrs {
            match connect(&addr, connect_timeout, &self.config) {
                Ok(stream) => {
                    self.apply_timeout(&stream)?;
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(error) => {
                    trace!(%addr, %error, "connection attempt failed");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no addresses found for {host}"),
            )
        }))
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(error) = stream.shutdown(Shutdown::Both) {
                trace!(%error, "tcp shutdown error");
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.as_mut().ok_or_else(not_connected)?.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.as_mut().ok_or_else(not_connected)?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stream.as_mut() {
            Some(stream) => stream.flush(),
            None => Ok(()),
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        if let Some(stream) = self.stream.as_ref() {
            if let Err(error) = self.apply_timeout(stream) {
                warn!("tcp set_timeout error: {}", error);
            }
        }
    }

    fn detach(&mut self) -> Option<TcpStream> {
        self.stream.take()
    }

    fn attach(&mut self, connection: TcpStream) {
        self.close();
        if let Err(error) = self.apply_timeout(&connection) {
            warn!("tcp set_timeout error: {}", error);
        }
        self.stream = Some(connection);
    }
}

#[tracing::instrument(skip(connect_timeout, config), level = "debug")]
fn connect(
    addr: &SocketAddr,
    connect_timeout: Duration,
    config: &TcpTransportConfig,
) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(*addr), Type::STREAM, Some(Protocol::TCP))?;
    trace!("tcp socket opened");

    let guard = tracing::trace_span!("socket_options").entered();

    if let Some(dur) = config.keep_alive_timeout {
        let conf = TcpKeepalive::new().with_time(dur);
        if let Err(e) = socket.set_tcp_keepalive(&conf) {
            warn!("tcp set_keepalive error: {}", e);
        }
    }

    if let Err(e) = socket.set_nodelay(config.nodelay) {
        warn!("tcp set_nodelay error: {}", e);
    }

    if let Some(size) = config.send_buffer_size {
        if let Err(e) = socket.set_send_buffer_size(size) {
            warn!("tcp set_buffer_size error: {}", e);
        }
    }

    if let Some(size) = config.recv_buffer_size {
        if let Err(e) = socket.set_recv_buffer_size(size) {
            warn!("tcp set_recv_buffer_size error: {}", e);
        }
    }

    drop(guard);

    if connect_timeout.is_zero() {
        socket.connect(&(*addr).into())?;
    } else {
        socket.connect_timeout(&(*addr).into(), connect_timeout)?;
    }
    trace!("tcp connected");

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Read as _, Write as _};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn connect_write_read_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        let mut transport = TcpTransport::default();
        assert!(!transport.is_connected());
        transport.connect("127.0.0.1", port).unwrap();
        assert!(transport.is_connected());

        transport.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < 4 {
            filled += transport.read(&mut buf[filled..]).unwrap();
        }
        assert_eq!(&buf, b"ping");

        transport.close();
        assert!(!transport.is_connected());
        server.join().unwrap();
    }

    #[test]
    fn io_without_connection() {
        let mut transport = TcpTransport::default();
        let err = transport.write(b"nope").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert!(transport.detach().is_none());
    }

    #[test]
    fn fresh_transport_shares_config() {
        let mut transport = TcpTransport::new(TcpTransportConfig {
            nodelay: false,
            ..Default::default()
        });
        transport.set_timeout(Duration::from_secs(3));

        let fresh = transport.fresh();
        assert!(!fresh.config().nodelay);
        assert_eq!(fresh.timeout(), Duration::from_secs(3));
    }
}
