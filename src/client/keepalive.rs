//! Persistent connection bookkeeping.

use std::time::{Duration, Instant};

/// Tracks when the last request was sent on a connection, and whether the
/// connection has to be re-established before the next one.
///
/// The check is lazy: nothing runs in the background, the clock is consulted
/// at the start of every request.
#[derive(Debug, Clone)]
pub struct KeepAliveClock {
    timeout: Duration,
    last_request: Instant,
    force_reconnect: bool,
}

impl KeepAliveClock {
    /// Create a clock which expires connections idle for `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_request: Instant::now(),
            force_reconnect: false,
        }
    }

    /// The idle timeout for persistent connections.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set the idle timeout for persistent connections.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// When the last request was sent.
    pub fn last_request(&self) -> Instant {
        self.last_request
    }

    /// Record that a request was sent now.
    pub fn touch(&mut self) {
        self.touch_at(Instant::now());
    }

    /// Record that a request was sent at `at`.
    pub fn touch_at(&mut self, at: Instant) {
        self.last_request = at;
    }

    /// Whether the next request is forced onto a new connection.
    pub fn is_forced(&self) -> bool {
        self.force_reconnect
    }

    /// Force (or stop forcing) the next request onto a new connection.
    pub fn force_reconnect(&mut self, force: bool) {
        self.force_reconnect = force;
    }

    /// Whether the connection must be re-established before the next request.
    pub fn must_reconnect(&self) -> bool {
        self.must_reconnect_at(Instant::now())
    }

    /// As [`must_reconnect`][Self::must_reconnect], evaluated at `now`.
    pub fn must_reconnect_at(&self, now: Instant) -> bool {
        self.force_reconnect || now.saturating_duration_since(self.last_request) >= self.timeout
    }
}
