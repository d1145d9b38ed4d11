//! Client connection types.
//!
//! A session talks to the network through a [`Transport`]: a blocking byte stream which can be
//! opened to a host and port, closed, and handed from one owner to another with
//! [`detach`][Transport::detach] and [`attach`][Transport::attach].
//!
//! Two builtin transports are provided:
//! - [`TcpTransport`][transport::tcp::TcpTransport]: Connects to a remote server over TCP/IP. This is
//!   the default transport, and what usually powers HTTP sessions.
//! - [`MockTransport`][transport::mock::MockTransport]: A scripted, in-memory transport, which records
//!   everything written to it. Available with the `mocks` feature.
//!
//! The session wraps its transport in a connection endpoint, which buffers incoming bytes and knows
//! where the transport must connect: directly to the target, to a forward proxy, or through a
//! `CONNECT` tunnel.

mod connection;
pub mod transport;

pub(crate) use self::connection::Connection;
pub use self::connection::{Detached, Input};
pub use self::transport::Transport;
