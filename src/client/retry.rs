//! One-shot reconnect and retry for writes on reused connections.
//!
//! A persistent connection can be closed by the server while it sits idle, and the client only
//! learns about it when a write fails. When that happens to the first write of a request, nothing
//! has reached the server yet, so it is safe to reconnect and send the same bytes again. Later
//! writes are never retried, so a body is never partially sent twice.

use tracing::{debug, trace};

use super::conn::{Connection, Transport};
use super::Error;

/// How a guarded write reached the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Written {
    /// The bytes were written on the existing connection.
    Direct,

    /// The first attempt failed; the bytes were written on a new connection.
    Retried,
}

/// Allows the next write to be retried once on a fresh connection.
#[derive(Debug, Clone, Default)]
pub struct WriteRetryGuard {
    armed: bool,
}

impl WriteRetryGuard {
    /// A guard which does not retry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow (or forbid) a retry of the next write.
    pub fn arm(&mut self, retry: bool) {
        self.armed = retry;
    }

    /// Whether the next write may be retried.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Write all of `buf` to `conn`.
    ///
    /// If the write fails and the guard is armed, the connection is closed and re-established and
    /// `buf` is written again. A failure on the second attempt is returned as is. Either way the
    /// guard is disarmed afterwards.
    pub(crate) fn write<T: Transport>(
        &mut self,
        conn: &mut Connection<T>,
        buf: &[u8],
    ) -> Result<Written, Error> {
        let armed = std::mem::take(&mut self.armed);

        match conn.write_all(buf) {
            Ok(()) => Ok(Written::Direct),
            Err(error) if armed => {
                debug!(%error, "write failed, reconnecting to retry");
                conn.close();
                conn.reconnect()?;
                conn.write_all(buf)?;
                trace!(bytes = buf.len(), "retried write succeeded");
                Ok(Written::Retried)
            }
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::client::conn::transport::mock::{MockNetwork, MockScript, MockTransport};
    use crate::client::proxy::ProxyConfig;

    fn connected(network: &MockNetwork) -> Connection<MockTransport> {
        let mut conn = Connection::new(
            network.transport(),
            "example.com".into(),
            80,
            ProxyConfig::default(),
        );
        conn.reconnect().unwrap();
        conn
    }

    #[test]
    fn retries_once_when_armed() {
        let network = MockNetwork::new();
        network
            .script(MockScript::respond("").fail_writes(1))
            .script(MockScript::respond(""));

        let mut conn = connected(&network);
        let mut guard = WriteRetryGuard::new();
        guard.arm(true);

        assert_eq!(guard.write(&mut conn, b"GET").unwrap(), Written::Retried);
        assert!(!guard.is_armed());

        let logs = network.connections();
        assert_eq!(logs.len(), 2);
        assert!(logs[0].closed);
        assert!(logs[0].written.is_empty());
        assert_eq!(logs[1].written, b"GET");
    }

    #[test]
    fn second_failure_propagates() {
        let network = MockNetwork::new();
        network
            .script(MockScript::respond("").fail_writes(1))
            .script(MockScript::respond("").fail_writes(1));

        let mut conn = connected(&network);
        let mut guard = WriteRetryGuard::new();
        guard.arm(true);

        let err = guard.write(&mut conn, b"GET").unwrap_err();
        assert!(err.is_network());
        assert_eq!(network.connections().len(), 2);
    }

    #[test]
    fn unarmed_failure_propagates() {
        let network = MockNetwork::new();
        network.script(MockScript::respond("").fail_writes(1));

        let mut conn = connected(&network);
        let mut guard = WriteRetryGuard::new();

        assert!(guard.write(&mut conn, b"GET").is_err());
        assert_eq!(network.connections().len(), 1);
    }

    #[test]
    fn only_first_write_is_guarded() {
        let network = MockNetwork::new();
        network.script(MockScript::respond("").fail_writes(0));

        let mut conn = connected(&network);
        let mut guard = WriteRetryGuard::new();
        guard.arm(true);

        assert_eq!(guard.write(&mut conn, b"a").unwrap(), Written::Direct);
        assert!(!guard.is_armed());
    }
}
