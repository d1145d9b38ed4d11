use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use super::conn::Transport;
use super::proxy::ProxyConfig;
use super::{ClientSession, DEFAULT_KEEP_ALIVE_TIMEOUT, HTTP_PORT};

/// A builder for a client session.
#[derive(Debug, Clone)]
pub struct Builder {
    host: String,
    port: u16,
    proxy: ProxyConfig,
    keep_alive: bool,
    keep_alive_timeout: Duration,
    timeout: Option<Duration>,
    tunnel: bool,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: HTTP_PORT,
            proxy: ProxyConfig::default(),
            keep_alive: false,
            keep_alive_timeout: DEFAULT_KEEP_ALIVE_TIMEOUT,
            timeout: None,
            tunnel: false,
        }
    }
}

impl Builder {
    /// Create a new builder, for port 80 and without a proxy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to this host.
    pub fn with_host<H: Into<String>>(mut self, host: H) -> Self {
        self.host = host.into();
        self
    }

    /// The configured host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Connect to this port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// The configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Use the provided proxy configuration.
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = proxy;
        self
    }

    /// Proxy configuration.
    pub fn proxy(&mut self) -> &mut ProxyConfig {
        &mut self.proxy
    }

    /// Ask for persistent connections.
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Set how long an idle persistent connection is reused.
    pub fn with_keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.keep_alive_timeout = timeout;
        self
    }

    /// Set the transport I/O timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Keep the transport's own I/O timeout.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// The configured I/O timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Reach the target through a `CONNECT` tunnel when a proxy applies.
    pub fn with_tunnel(mut self, tunnel: bool) -> Self {
        self.tunnel = tunnel;
        self
    }

    /// Build a session over `transport`.
    pub fn build<T: Transport>(self, mut transport: T) -> ClientSession<T> {
        if let Some(timeout) = self.timeout {
            transport.set_timeout(timeout);
        }

        let mut session = ClientSession::new(transport, self.host, self.port, self.proxy);
        session.set_keep_alive(self.keep_alive);
        session.set_keep_alive_timeout(self.keep_alive_timeout);
        if session.set_tunnel(self.tunnel).is_err() {
            tracing::warn!("transport was already connected, tunnelling not configured");
        }
        session
    }
}

/// Builds sessions which share a default proxy configuration.
///
/// Each session gets a copy of the default proxy configuration as it is when the session is
/// built. Changing the default afterwards does not affect sessions which already exist.
/// Factories are cheap to clone, and clones share the same default.
#[derive(Debug, Clone, Default)]
pub struct SessionFactory {
    default_proxy: Arc<RwLock<ProxyConfig>>,
}

impl SessionFactory {
    /// A factory whose default is no proxy.
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory with the given default proxy configuration.
    pub fn with_proxy(proxy: ProxyConfig) -> Self {
        Self {
            default_proxy: Arc::new(RwLock::new(proxy)),
        }
    }

    /// A copy of the current default proxy configuration.
    pub fn default_proxy(&self) -> ProxyConfig {
        self.default_proxy.read().clone()
    }

    /// Replace the default proxy configuration for sessions built from now on.
    pub fn set_default_proxy(&self, proxy: ProxyConfig) {
        *self.default_proxy.write() = proxy;
    }

    /// A builder for `host:port` which carries the current default proxy configuration.
    pub fn builder<H: Into<String>>(&self, host: H, port: u16) -> Builder {
        Builder::new()
            .with_host(host)
            .with_port(port)
            .with_proxy(self.default_proxy())
    }

    /// A session for `host:port` over `transport`, using the current default proxy configuration.
    pub fn session<T: Transport, H: Into<String>>(
        &self,
        transport: T,
        host: H,
        port: u16,
    ) -> ClientSession<T> {
        self.builder(host, port).build(transport)
    }
}
