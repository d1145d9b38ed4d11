//! A scripted, in-memory transport, suitable for testing session behavior.
//!
//! Every connection made through a [`MockNetwork`] consumes the next [`MockScript`], which decides
//! whether the connection is refused, which bytes the "server" sends back, and how many writes fail
//! before bytes are accepted. Everything written is recorded per connection.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf as _, Bytes};
use parking_lot::Mutex;
use tracing::trace;

use super::{not_connected, Transport};
use crate::client::DEFAULT_TIMEOUT;

/// A unique identifier for a mock connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(usize);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The behavior of one scripted connection.
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    response: Bytes,
    failing_writes: usize,
    refuse: bool,
}

impl MockScript {
    /// A connection which sends back `response`, then signals end of stream.
    pub fn respond<B: Into<Bytes>>(response: B) -> Self {
        Self {
            response: response.into(),
            ..Default::default()
        }
    }

    /// A connection attempt which is refused.
    pub fn refuse() -> Self {
        Self {
            refuse: true,
            ..Default::default()
        }
    }

    /// Fail the first `count` writes on this connection with a broken pipe.
    pub fn fail_writes(mut self, count: usize) -> Self {
        self.failing_writes = count;
        self
    }
}

/// What happened on a connection made through a [`MockNetwork`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockConnectionLog {
    /// The connection identifier.
    pub id: ConnectionId,
    /// The host that was connected to.
    pub host: String,
    /// The port that was connected to.
    pub port: u16,
    /// Every byte accepted by the connection.
    pub written: Vec<u8>,
    /// Whether the connection was closed.
    pub closed: bool,
}

#[derive(Debug, Default)]
struct NetworkState {
    scripts: VecDeque<MockScript>,
    connections: Vec<MockConnectionLog>,
}

/// A shared set of scripted connections.
#[derive(Debug, Clone, Default)]
pub struct MockNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MockNetwork {
    /// Create an empty network. Connections are refused until scripts are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the behavior of the next connection.
    pub fn script(&self, script: MockScript) -> &Self {
        self.state.lock().scripts.push_back(script);
        self
    }

    /// A new, unconnected transport on this network.
    pub fn transport(&self) -> MockTransport {
        MockTransport {
            network: self.clone(),
            connection: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// All connections made so far, in order.
    pub fn connections(&self) -> Vec<MockConnectionLog> {
        self.state.lock().connections.clone()
    }

    /// The bytes written to the connection made `index`-th.
    pub fn written(&self, index: usize) -> Vec<u8> {
        self.state
            .lock()
            .connections
            .get(index)
            .map(|log| log.written.clone())
            .unwrap_or_default()
    }

    /// Scripts which have not been used by a connection yet.
    pub fn remaining_scripts(&self) -> usize {
        self.state.lock().scripts.len()
    }
}

/// A connection on a [`MockNetwork`], as handed between transports.
#[derive(Debug)]
pub struct MockConnection {
    id: ConnectionId,
    input: Bytes,
    failing_writes: usize,
}

impl MockConnection {
    /// The identifier of this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

/// A transport which connects through a [`MockNetwork`].
#[derive(Debug)]
pub struct MockTransport {
    network: MockNetwork,
    connection: Option<MockConnection>,
    timeout: Duration,
}

impl MockTransport {
    /// The identifier of the current connection.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(|c| c.id)
    }
}

impl Transport for MockTransport {
    type Connection = MockConnection;

    fn fresh(&self) -> Self {
        let mut transport = self.network.transport();
        transport.timeout = self.timeout;
        transport
    }

    fn connect(&mut self, host: &str, port: u16) -> io::Result<()> {
        if self.connection.is_some() {
            return Err(io::Error::other("mock transport is already connected"));
        }

        let mut state = self.network.state.lock();
        let script = match state.scripts.pop_front() {
            Some(script) if !script.refuse => script,
            _ => {
                trace!(%host, port, "mock connection refused");
                return Err(io::ErrorKind::ConnectionRefused.into());
            }
        };

        let id = ConnectionId(state.connections.len());
        state.connections.push(MockConnectionLog {
            id,
            host: host.to_owned(),
            port,
            written: Vec::new(),
            closed: false,
        });
        trace!(%id, %host, port, "mock connection opened");

        self.connection = Some(MockConnection {
            id,
            input: script.response,
            failing_writes: script.failing_writes,
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            trace!(id=%connection.id, "mock connection closed");
            if let Some(log) = self.network.state.lock().connections.get_mut(connection.id.0) {
                log.closed = true;
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let connection = self.connection.as_mut().ok_or_else(not_connected)?;
        let n = connection.input.len().min(buf.len());
        buf[..n].copy_from_slice(&connection.input[..n]);
        connection.input.advance(n);
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let connection = self.connection.as_mut().ok_or_else(not_connected)?;
        if connection.failing_writes > 0 {
            connection.failing_writes -= 1;
            trace!(id=%connection.id, "mock write failure");
            return Err(io::ErrorKind::BrokenPipe.into());
        }

        if let Some(log) = self.network.state.lock().connections.get_mut(connection.id.0) {
            log.written.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn detach(&mut self) -> Option<MockConnection> {
        self.connection.take()
    }

    fn attach(&mut self, connection: MockConnection) {
        self.close();
        self.connection = Some(connection);
    }
}
