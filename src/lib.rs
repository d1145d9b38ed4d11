//! Hypersession
//!
//! Blocking HTTP/1.1 client sessions over a single, reusable connection.
//!
//! A [`ClientSession`] maps a sequence of request/response exchanges onto one
//! byte-stream [`Transport`][client::conn::Transport]. It decides when the
//! connection may be reused and when it has to be re-established, interposes
//! a proxy (either by rewriting request targets or by tunnelling with
//! `CONNECT`), and selects the message framing for every request and response
//! body.
//!
//! ```no_run
//! # use std::io::{Read, Write};
//! # use hypersession::client::{Builder, conn::transport::tcp::TcpTransport};
//! # use hypersession::message::{Request, Response};
//! # fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let mut session = Builder::new()
//!     .with_host("example.com")
//!     .with_port(80)
//!     .with_keep_alive(true)
//!     .build(TcpTransport::default());
//!
//! let mut request = Request::new(http::Method::GET, "/");
//! session.send_request(&mut request)?;
//!
//! let mut response = Response::default();
//! let mut body = Vec::new();
//! session.receive_response(&mut response)?.read_to_end(&mut body)?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

use std::fmt;

pub mod auth;
pub mod body;
pub mod client;
pub mod message;

pub use client::{ClientSession, Error};

/// A boxed error type, used where the concrete error is not important.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub(crate) struct DebugLiteral<T: fmt::Display>(T);

impl<T: fmt::Display> fmt::Debug for DebugLiteral<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
