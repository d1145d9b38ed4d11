//! Forward proxies and `CONNECT` tunnels.
//!
//! A session reaches its target through a proxy in one of two ways:
//!
//! - By connecting to the proxy and sending every request with an absolute-form target
//!   (`http://host:port/path`), carrying `Proxy-Authorization` when credentials are configured.
//! - By asking the proxy to open a tunnel with `CONNECT host:port`, after which the connection
//!   is an opaque byte stream to the target. See [`tunnel`].
//!
//! Hosts matching the [`NonProxyHosts`] pattern are always reached directly.

use std::fmt;

use http::header::{HeaderName, HeaderValue, HOST};
use http::{Method, StatusCode, Version};
use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::{debug, warn};

use super::conn::{Detached, Transport};
use super::{ClientSession, Error, HTTP_PORT};
use crate::auth::{BasicCredentials, Credentials as _};
use crate::message::{Request, Response};

/// The non-proxy host pattern could not be compiled.
#[derive(Debug, Error)]
#[error("invalid non-proxy host pattern: {0}")]
pub struct PatternError(#[from] regex::Error);

/// A pattern of hosts which are reached without the proxy.
///
/// The pattern is a regular expression matched against the whole host name, ignoring case.
#[derive(Clone)]
pub struct NonProxyHosts {
    pattern: String,
    regex: Regex,
}

impl NonProxyHosts {
    /// Compile a non-proxy host pattern.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let regex = RegexBuilder::new(&format!("^(?:{pattern})$"))
            .case_insensitive(true)
            .build()?;
        Ok(Self {
            pattern: pattern.to_owned(),
            regex,
        })
    }

    /// The pattern, as it was given.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Whether `host` matches the pattern.
    pub fn matches(&self, host: &str) -> bool {
        self.regex.is_match(host)
    }
}

impl fmt::Debug for NonProxyHosts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NonProxyHosts").field(&self.pattern).finish()
    }
}

impl PartialEq for NonProxyHosts {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for NonProxyHosts {}

/// Proxy settings for a session.
///
/// An empty `host` disables the proxy.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy host name or address.
    pub host: String,
    /// Proxy port.
    pub port: u16,
    /// Username for proxy authentication. No credentials are sent when empty.
    pub username: String,
    /// Password for proxy authentication.
    pub password: String,
    /// Hosts reached without the proxy.
    pub non_proxy_hosts: Option<NonProxyHosts>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: HTTP_PORT,
            username: String::new(),
            password: String::new(),
            non_proxy_hosts: None,
        }
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("non_proxy_hosts", &self.non_proxy_hosts)
            .finish()
    }
}

impl ProxyConfig {
    /// A proxy at `host:port`, without credentials.
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Authenticate to the proxy with these credentials.
    pub fn with_credentials<U: Into<String>, P: Into<String>>(
        mut self,
        username: U,
        password: P,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Reach hosts matching `pattern` without the proxy. An empty pattern bypasses nothing.
    pub fn with_non_proxy_hosts(mut self, pattern: &str) -> Result<Self, PatternError> {
        self.non_proxy_hosts = if pattern.is_empty() {
            None
        } else {
            Some(NonProxyHosts::new(pattern)?)
        };
        Ok(self)
    }

    /// Whether a proxy host is configured.
    pub fn is_enabled(&self) -> bool {
        !self.host.is_empty()
    }

    /// Whether `host` is reached without the proxy.
    pub fn bypass(&self, host: &str) -> bool {
        self.non_proxy_hosts
            .as_ref()
            .is_some_and(|pattern| pattern.matches(host))
    }

    /// Whether connections to `host` go through the proxy.
    pub fn applies_to(&self, host: &str) -> bool {
        self.is_enabled() && !self.bypass(host)
    }

    /// The credentials to present to the proxy, if a username is configured.
    pub fn credentials(&self) -> Option<BasicCredentials> {
        if self.username.is_empty() {
            None
        } else {
            Some(BasicCredentials::new(&*self.username, &*self.password))
        }
    }

    /// Add proxy authentication to `request`, if credentials are configured.
    pub fn authenticate(&self, request: &mut Request) {
        if let Some(credentials) = self.credentials() {
            credentials.proxy_authenticate(request);
        }
    }
}

/// The prefix which turns an origin-form target into an absolute-form target for `host:port`.
pub fn request_prefix(host: &str, port: u16) -> String {
    format!("http://{host}:{port}")
}

/// Rewrite `request` for a forward proxy: absolute-form target and proxy credentials.
pub(crate) fn rewrite(proxy: &ProxyConfig, request: &mut Request, host: &str, port: u16) {
    let target = format!("{}{}", request_prefix(host, port), request.target());
    debug!(%target, proxy = %proxy.host, "rewriting request for proxy");
    request.set_target(target);
    proxy.authenticate(request);
}

/// Open a `CONNECT` tunnel to `host:port` through `proxy`.
///
/// A throwaway session on a fresh transport connects directly to the proxy and asks for the
/// tunnel. When the proxy answers `200`, the session's connection and any bytes it already
/// buffered are released so that another session can adopt them. Any other status fails with
/// [`Error::Proxy`], and the throwaway connection is dropped.
#[tracing::instrument(level = "debug", skip(transport, proxy), fields(proxy = %proxy.host))]
pub fn tunnel<T: Transport>(
    transport: &T,
    proxy: &ProxyConfig,
    host: &str,
    port: u16,
) -> Result<Detached<T::Connection>, Error> {
    let mut session = ClientSession::new(
        transport.fresh(),
        proxy.host.clone(),
        proxy.port,
        ProxyConfig::default(),
    );
    session.set_keep_alive(true);

    let mut request =
        Request::new(Method::CONNECT, format!("{host}:{port}")).with_version(Version::HTTP_11);
    request.set(
        HeaderName::from_static("proxy-connection"),
        HeaderValue::from_static("keep-alive"),
    );
    match HeaderValue::from_str(host) {
        Ok(value) => request.set(HOST, value),
        Err(_) => warn!(%host, "host is not a valid header value"),
    }
    proxy.authenticate(&mut request);

    session.send_request(&mut request)?;
    let mut response = Response::default();
    session.receive_response(&mut response)?;

    if response.status() != StatusCode::OK {
        debug!(status = %response.status(), "proxy refused tunnel");
        return Err(Error::Proxy {
            status: response.status(),
            reason: response.reason().to_owned(),
        });
    }

    debug!("tunnel established");
    session
        .detach()
        .ok_or_else(|| Error::Network(super::conn::transport::not_connected()))
}
