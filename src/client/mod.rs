//! Blocking HTTP/1.1 client sessions.
//!
//! There are three levels of available APIs in this module:
//!
//! 1. The [`ClientSession`] API, which sends requests and receives responses over one
//!    persistent connection. It handles keep-alive, proxies and body framing, and is usually
//!    configured with a [`Builder`] or a [`SessionFactory`].
//! 2. The building blocks the session is made of: [`OutputFraming`] and [`InputFraming`] choose
//!    how bodies are delimited, [`KeepAliveClock`] decides when a connection is stale, and
//!    [`proxy`] rewrites requests and opens `CONNECT` tunnels.
//! 3. The [connection][self::conn] API, which is the lowest-level API and defines the
//!    [`Transport`][conn::Transport] a session runs on. This API is useful for implementing
//!    custom transports.

use std::time::Duration;

mod body;
mod builder;
pub mod conn;
mod error;
pub mod framing;
pub mod keepalive;
pub mod proxy;
mod retry;
mod session;

pub use self::body::{RequestBody, ResponseBody};
pub use self::builder::{Builder, SessionFactory};
pub use self::error::Error;
pub use self::framing::{InputFraming, OutputFraming};
pub use self::keepalive::KeepAliveClock;
pub use self::proxy::{NonProxyHosts, PatternError, ProxyConfig};
pub use self::session::{ClientSession, SessionState};

/// The default HTTP port.
pub const HTTP_PORT: u16 = 80;

/// How long an idle persistent connection is reused by default.
pub const DEFAULT_KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(8);

/// The default transport I/O timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How many informational heads are skipped before a response is considered malformed.
pub const MAX_INFORMATIONAL_RESPONSES: usize = 32;
