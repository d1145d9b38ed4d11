use std::fmt;
use std::io;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use http::{header, Method, StatusCode};
use tracing::{debug, trace, warn};

use super::body::{RequestBody, ResponseBody};
use super::conn::{Connection, Detached, Transport};
use super::error::duplicate;
use super::framing::{InputFraming, OutputFraming};
use super::keepalive::KeepAliveClock;
use super::proxy::{self, ProxyConfig};
use super::retry::{WriteRetryGuard, Written};
use super::{Error, DEFAULT_KEEP_ALIVE_TIMEOUT, MAX_INFORMATIONAL_RESPONSES};
use crate::body::{BodyReader, BodyWriter};
use crate::message::{Request, Response};

/// Where a session is in its request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No exchange is in progress.
    Idle,

    /// A request head has been sent and its body may be written.
    Sending,

    /// The request is complete and the response head has not been read yet.
    AwaitingResponse,

    /// A final response head was read before the request was finished.
    ResponsePending,

    /// The response head has been read and its body may be read.
    Receiving,
}

enum Phase {
    Idle,
    Sending(BodyWriter),
    AwaitingResponse,
    ResponsePending {
        writer: Option<BodyWriter>,
        response: Box<Response>,
    },
    Receiving(BodyReader),
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Phase::Idle => SessionState::Idle,
            Phase::Sending(_) => SessionState::Sending,
            Phase::AwaitingResponse => SessionState::AwaitingResponse,
            Phase::ResponsePending { .. } => SessionState::ResponsePending,
            Phase::Receiving(_) => SessionState::Receiving,
        }
    }
}

/// A blocking HTTP/1.1 client session over a single connection.
///
/// The session sends one request and receives one response at a time. The connection is
/// opened on demand, reused between exchanges when keep-alive is enabled and the server agrees,
/// and re-established when the keep-alive timeout has passed since the last request.
///
/// ```no_run
/// # use std::io::{Read, Write};
/// # use hypersession::client::{ClientSession, ProxyConfig};
/// # use hypersession::client::conn::transport::tcp::TcpTransport;
/// # use hypersession::message::{Request, Response};
/// # fn run() -> Result<(), hypersession::BoxError> {
/// let mut session = ClientSession::new(TcpTransport::default(), "example.com", 80, ProxyConfig::default());
///
/// let mut request = Request::new(http::Method::POST, "/upload");
/// request.set_content_length(5);
/// session.send_request(&mut request)?.write_all(b"hello")?;
///
/// let mut response = Response::default();
/// let mut body = String::new();
/// session.receive_response(&mut response)?.read_to_string(&mut body)?;
/// # Ok(())
/// # }
/// ```
pub struct ClientSession<T: Transport> {
    conn: Connection<T>,
    clock: KeepAliveClock,
    retry: WriteRetryGuard,
    keep_alive: bool,
    expect_body: bool,
    phase: Phase,
    deferred: Option<io::Error>,
}

impl<T: Transport> fmt::Debug for ClientSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("conn", &self.conn)
            .field("state", &self.phase.state())
            .field("keep_alive", &self.keep_alive)
            .field("keep_alive_timeout", &self.clock.timeout())
            .field("retry_armed", &self.retry.is_armed())
            .field(
                "deferred",
                &self.deferred.as_ref().map(crate::DebugLiteral),
            )
            .finish()
    }
}

impl<T: Transport> ClientSession<T> {
    /// Create a session for `host:port`, which is not connected yet.
    pub fn new<H: Into<String>>(transport: T, host: H, port: u16, proxy: ProxyConfig) -> Self {
        Self {
            conn: Connection::new(transport, host.into(), port, proxy),
            clock: KeepAliveClock::new(DEFAULT_KEEP_ALIVE_TIMEOUT),
            retry: WriteRetryGuard::new(),
            keep_alive: false,
            expect_body: true,
            phase: Phase::Idle,
            deferred: None,
        }
    }

    /// Where the session is in its request/response cycle.
    pub fn state(&self) -> SessionState {
        self.phase.state()
    }

    /// Whether the transport is connected.
    pub fn connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Always `false`: plain sessions do not encrypt their connection.
    pub fn secure(&self) -> bool {
        false
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        self.conn.transport()
    }

    /// The target host.
    pub fn host(&self) -> &str {
        self.conn.host()
    }

    /// Set the target host. Fails while connected.
    pub fn set_host<H: Into<String>>(&mut self, host: H) -> Result<(), Error> {
        self.conn.set_host(host.into())
    }

    /// The target port.
    pub fn port(&self) -> u16 {
        self.conn.port()
    }

    /// Set the target port. Fails while connected.
    pub fn set_port(&mut self, port: u16) -> Result<(), Error> {
        self.conn.set_port(port)
    }

    /// The proxy configuration.
    pub fn proxy_config(&self) -> &ProxyConfig {
        self.conn.proxy()
    }

    /// Replace the proxy configuration. Fails while connected.
    pub fn set_proxy_config(&mut self, config: ProxyConfig) -> Result<(), Error> {
        *self
            .conn
            .proxy_mut("cannot set the proxy configuration for an already connected session")? =
            config;
        Ok(())
    }

    /// Use the proxy at `host:port`. Fails while connected.
    pub fn set_proxy<H: Into<String>>(&mut self, host: H, port: u16) -> Result<(), Error> {
        let proxy = self
            .conn
            .proxy_mut("cannot set the proxy for an already connected session")?;
        proxy.host = host.into();
        proxy.port = port;
        Ok(())
    }

    /// The proxy host, empty when no proxy is used.
    pub fn proxy_host(&self) -> &str {
        &self.conn.proxy().host
    }

    /// Set the proxy host. Fails while connected.
    pub fn set_proxy_host<H: Into<String>>(&mut self, host: H) -> Result<(), Error> {
        self.conn
            .proxy_mut("cannot set the proxy host for an already connected session")?
            .host = host.into();
        Ok(())
    }

    /// The proxy port.
    pub fn proxy_port(&self) -> u16 {
        self.conn.proxy().port
    }

    /// Set the proxy port. Fails while connected.
    pub fn set_proxy_port(&mut self, port: u16) -> Result<(), Error> {
        self.conn
            .proxy_mut("cannot set the proxy port for an already connected session")?
            .port = port;
        Ok(())
    }

    /// Set the username and password presented to the proxy.
    pub fn set_proxy_credentials<U: Into<String>, P: Into<String>>(
        &mut self,
        username: U,
        password: P,
    ) {
        let proxy = self.conn.proxy_settings_mut();
        proxy.username = username.into();
        proxy.password = password.into();
    }

    /// The username presented to the proxy.
    pub fn proxy_username(&self) -> &str {
        &self.conn.proxy().username
    }

    /// Set the username presented to the proxy.
    pub fn set_proxy_username<U: Into<String>>(&mut self, username: U) {
        self.conn.proxy_settings_mut().username = username.into();
    }

    /// The password presented to the proxy.
    pub fn proxy_password(&self) -> &str {
        &self.conn.proxy().password
    }

    /// Set the password presented to the proxy.
    pub fn set_proxy_password<P: Into<String>>(&mut self, password: P) {
        self.conn.proxy_settings_mut().password = password.into();
    }

    /// Whether the session asks for persistent connections.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Ask for persistent connections, or close the connection after every exchange.
    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        self.keep_alive = keep_alive;
    }

    /// How long an idle persistent connection is trusted to still be open.
    pub fn keep_alive_timeout(&self) -> Duration {
        self.clock.timeout()
    }

    /// Set how long an idle persistent connection is trusted to still be open.
    pub fn set_keep_alive_timeout(&mut self, timeout: Duration) {
        self.clock.set_timeout(timeout);
    }

    /// The transport I/O timeout.
    pub fn timeout(&self) -> Duration {
        self.conn.transport().timeout()
    }

    /// Set the transport I/O timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.conn.transport_mut().set_timeout(timeout);
    }

    /// Whether proxied connections are tunnelled with `CONNECT`.
    pub fn tunnel(&self) -> bool {
        self.conn.tunnel()
    }

    /// Tunnel proxied connections with `CONNECT` instead of rewriting requests. Fails while connected.
    pub fn set_tunnel(&mut self, tunnel: bool) -> Result<(), Error> {
        self.conn.set_tunnel(tunnel)
    }

    /// When the last request was sent.
    pub fn last_request(&self) -> Instant {
        self.clock.last_request()
    }

    /// Whether the next request must open a new connection.
    pub fn must_reconnect(&self) -> bool {
        self.clock.must_reconnect()
    }

    /// The absolute-form prefix used for requests sent to a forward proxy.
    pub fn proxy_request_prefix(&self) -> String {
        proxy::request_prefix(self.conn.host(), self.conn.port())
    }

    /// Whether the target host is reached without the proxy.
    pub fn bypass_proxy(&self) -> bool {
        self.conn.proxy().bypass(self.conn.host())
    }

    /// Open a `CONNECT` tunnel to the target through the proxy and adopt its connection.
    ///
    /// On failure the session's current connection is left as it was.
    pub fn proxy_tunnel(&mut self) -> Result<(), Error> {
        let detached = proxy::tunnel(
            self.conn.transport(),
            self.conn.proxy(),
            self.conn.host(),
            self.conn.port(),
        )?;
        self.phase = Phase::Idle;
        self.conn.attach(detached);
        Ok(())
    }

    /// Release the connection, with any bytes received but not yet consumed.
    pub fn detach(&mut self) -> Option<Detached<T::Connection>> {
        self.phase = Phase::Idle;
        self.conn.detach()
    }

    /// Adopt a connection released by another session, closing the current one.
    pub fn attach(&mut self, detached: Detached<T::Connection>) {
        self.phase = Phase::Idle;
        self.conn.attach(detached);
    }

    /// Close the connection and forget any exchange in progress.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.conn.close();
    }

    /// Send the head of `request`, returning a handle for writing its body.
    ///
    /// Any previous exchange is abandoned. The connection is re-established first when it is
    /// not open, when keep-alive is off, or when [`must_reconnect`][Self::must_reconnect] says
    /// so. The request is completed with `Connection`, `Host`, and proxy fields as needed.
    ///
    /// On failure the connection is closed.
    pub fn send_request(&mut self, request: &mut Request) -> Result<RequestBody<'_, T>, Error> {
        debug!(method = %request.method(), target = %request.target(), "sending request");
        self.phase = Phase::Idle;
        self.deferred = None;

        let keep_alive = self.keep_alive;
        if ((self.conn.is_connected() && !keep_alive) || self.clock.must_reconnect())
            && !self.conn.host().is_empty()
        {
            if self.conn.is_connected() {
                debug!(host = %self.conn.host(), "closing connection before request");
            }
            self.conn.close();
            self.clock.force_reconnect(false);
        }

        match self.start_request(request, keep_alive) {
            Ok(writer) => {
                self.phase = Phase::Sending(writer);
                Ok(RequestBody::new(self))
            }
            Err(error) => {
                self.conn.close();
                Err(error)
            }
        }
    }

    fn start_request(
        &mut self,
        request: &mut Request,
        keep_alive: bool,
    ) -> Result<BodyWriter, Error> {
        if !self.conn.is_connected() {
            self.conn.reconnect()?;
        }

        if !keep_alive {
            request.set_keep_alive(false);
        }

        if !request.has(&header::HOST) && !self.conn.host().is_empty() {
            request.set_host(self.conn.host(), self.conn.port());
        }

        if self.conn.forwards_through_proxy() {
            proxy::rewrite(
                self.conn.proxy(),
                request,
                self.conn.host(),
                self.conn.port(),
            );
        }

        self.retry.arm(keep_alive);
        self.expect_body = request.method() != Method::HEAD;

        let framing = OutputFraming::select(request);
        let mut head = BytesMut::new();
        request.encode(&mut head);
        let mut writer = framing.writer(head.len() as u64);
        debug!(?framing, head = head.len(), "request framing");

        if framing.bounds_head() {
            let mut framed = BytesMut::with_capacity(head.len());
            writer.encode(&head, &mut framed);
            self.write(&framed)?;
        } else {
            self.write(&head)?;
        }

        self.clock.touch();
        Ok(writer)
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        if self.retry.write(&mut self.conn, buf)? == Written::Retried {
            self.deferred = None;
        }
        Ok(())
    }

    /// A handle for writing the body of the request in progress.
    pub fn request_body(&mut self) -> Result<RequestBody<'_, T>, Error> {
        if matches!(
            self.phase,
            Phase::Sending(_) | Phase::ResponsePending { writer: Some(_), .. }
        ) {
            Ok(RequestBody::new(self))
        } else {
            Err(Error::State("no request body is being sent"))
        }
    }

    pub(crate) fn write_body(&mut self, buf: &[u8]) -> io::Result<usize> {
        let writer = match &mut self.phase {
            Phase::Sending(writer)
            | Phase::ResponsePending {
                writer: Some(writer),
                ..
            } => writer,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "no request body is being sent",
                ))
            }
        };

        let mut framed = BytesMut::new();
        let n = writer.encode(buf, &mut framed);
        if n == 0 && !buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "request body exceeds its declared length",
            ));
        }

        match self.retry.write(&mut self.conn, &framed) {
            Ok(Written::Direct) => {}
            Ok(Written::Retried) => self.deferred = None,
            Err(Error::Network(error)) => {
                trace!(%error, "request body write failed");
                self.deferred = Some(duplicate(&error));
                return Err(error);
            }
            Err(error) => return Err(io::Error::other(error)),
        }
        Ok(n)
    }

    pub(crate) fn flush_transport(&mut self) -> io::Result<()> {
        self.conn.flush()
    }

    /// Finish the request body and raise any network failure recorded while writing it.
    ///
    /// A length-delimited body which is short of its declared length fails with
    /// [`Error::IncompleteBody`], unless the server already sent a final response, in which case
    /// the connection is simply not reused.
    pub fn flush_request(&mut self) -> Result<(), Error> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Sending(mut writer) => {
                let mut trailer = BytesMut::new();
                if let Err(incomplete) = writer.finish(&mut trailer) {
                    self.conn.close();
                    return Err(incomplete.into());
                }
                if let Err(error) = self.finish_write(&trailer) {
                    self.conn.close();
                    return Err(error);
                }
                self.phase = Phase::AwaitingResponse;
            }
            Phase::ResponsePending {
                writer: Some(mut writer),
                response,
            } => {
                let mut trailer = BytesMut::new();
                let finished = writer
                    .finish(&mut trailer)
                    .map_err(Error::from)
                    .and_then(|()| self.finish_write(&trailer));
                if let Err(error) = finished {
                    debug!(%error, "request abandoned after early response");
                    self.clock.force_reconnect(true);
                }
                self.phase = Phase::ResponsePending {
                    writer: None,
                    response,
                };
            }
            phase => self.phase = phase,
        }

        if let Some(error) = &self.deferred {
            self.phase = Phase::Idle;
            self.conn.close();
            return Err(Error::Network(duplicate(error)));
        }
        Ok(())
    }

    fn finish_write(&mut self, trailer: &[u8]) -> Result<(), Error> {
        if !trailer.is_empty() {
            self.write(trailer)?;
        }
        self.conn.flush()?;
        Ok(())
    }

    /// Read the response head into `response`, returning a handle for reading its body.
    ///
    /// The request is finished first. Informational heads other than `101` are skipped. If a final response
    /// was already seen by [`peek_response`][Self::peek_response], it is returned without
    /// reading again.
    ///
    /// On failure the connection is closed.
    pub fn receive_response(
        &mut self,
        response: &mut Response,
    ) -> Result<ResponseBody<'_, T>, Error> {
        self.flush_request()?;

        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::ResponsePending {
                response: peeked, ..
            } => *response = *peeked,
            Phase::AwaitingResponse => self.read_final_head(response)?,
            phase => {
                self.phase = phase;
                return Err(Error::State("no request is awaiting a response"));
            }
        }

        debug!(status = %response.status(), "received response");
        let framing = InputFraming::select(self.expect_body, response);
        trace!(?framing, "response framing");

        if (self.keep_alive && !response.keep_alive()) || framing == InputFraming::CloseDelimited {
            self.clock.force_reconnect(true);
        }

        self.phase = Phase::Receiving(framing.reader());
        Ok(ResponseBody::new(self))
    }

    /// Check whether the server has already answered the request in progress.
    ///
    /// Reads response heads, skipping interim ones such as `103 Early Hints`. Returns `true` if
    /// a final response arrived, which is kept and returned by the next
    /// [`receive_response`][Self::receive_response]. Returns `false` for `100 Continue`, after
    /// which the body should be sent.
    ///
    /// Only allowed while a request is being sent and before any final response was seen.
    pub fn peek_response(&mut self, response: &mut Response) -> Result<bool, Error> {
        let writer = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Sending(writer) => writer,
            phase => {
                self.phase = phase;
                return Err(Error::State(
                    "a response can only be peeked while a request is being sent",
                ));
            }
        };

        if let Err(error) = self.conn.flush() {
            self.conn.close();
            return Err(error.into());
        }
        if let Some(error) = &self.deferred {
            self.conn.close();
            return Err(Error::Network(duplicate(error)));
        }

        self.read_head_until(response, |status| status == StatusCode::CONTINUE)?;
        if response.status() == StatusCode::CONTINUE {
            trace!("peeked 100 continue");
            self.phase = Phase::Sending(writer);
            Ok(false)
        } else {
            debug!(status = %response.status(), "peeked final response");
            self.phase = Phase::ResponsePending {
                writer: Some(writer),
                response: Box::new(response.clone()),
            };
            Ok(true)
        }
    }

    fn read_final_head(&mut self, response: &mut Response) -> Result<(), Error> {
        self.read_head_until(response, |_| false)
    }

    /// Read heads, skipping interim responses unless `stop` accepts their status.
    fn read_head_until<F>(&mut self, response: &mut Response, stop: F) -> Result<(), Error>
    where
        F: Fn(StatusCode) -> bool,
    {
        for _ in 0..MAX_INFORMATIONAL_RESPONSES {
            self.read_head(response)?;
            let status = response.status();
            if !is_interim(status) || stop(status) {
                return Ok(());
            }
            trace!(%status, "skipping informational response");
        }

        warn!("peer sent too many informational responses");
        self.conn.close();
        Err(Error::Protocol(
            crate::message::ParseError::TooManyInformational,
        ))
    }

    fn read_head(&mut self, response: &mut Response) -> Result<(), Error> {
        response.clear();
        let result = response.read(&mut self.conn.input());
        if let Err(error) = result {
            self.conn.close();
            return Err(match &self.deferred {
                Some(deferred) => Error::Network(duplicate(deferred)),
                None => error.into(),
            });
        }
        Ok(())
    }

    /// A handle for reading the body of the response being received.
    pub fn response_body(&mut self) -> Result<ResponseBody<'_, T>, Error> {
        if matches!(self.phase, Phase::Receiving(_)) {
            Ok(ResponseBody::new(self))
        } else {
            Err(Error::State("no response body is being received"))
        }
    }

    pub(crate) fn read_body(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Phase::Receiving(reader) = &mut self.phase else {
            return Ok(0);
        };

        let result = reader.read(&mut self.conn.input(), buf);
        match result {
            Ok(n) => Ok(n),
            Err(error) => {
                trace!(%error, "response body read failed");
                self.conn.close();
                Err(error)
            }
        }
    }

    pub(crate) fn body_done(&self) -> bool {
        match &self.phase {
            Phase::Receiving(reader) => reader.is_done(),
            _ => true,
        }
    }
}

/// 1xx heads which precede the final response. `101` ends the exchange instead.
fn is_interim(status: StatusCode) -> bool {
    status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS
}
