use std::io;

use http::StatusCode;
use thiserror::Error;

use crate::body::IncompleteBody;
use crate::message::{ParseError, ReadError};

/// Client session error type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The operation is not allowed in the session's current state, such as
    /// changing the host of a connected session.
    #[error("invalid state: {0}")]
    State(&'static str),

    /// Error occured with the underlying transport.
    #[error("network: {0}")]
    Network(#[source] io::Error),

    /// The proxy refused to open a `CONNECT` tunnel.
    #[error("cannot establish proxy connection: {} {reason}", .status.as_u16())]
    Proxy {
        /// Status returned by the proxy.
        status: StatusCode,
        /// Reason phrase returned by the proxy.
        reason: String,
    },

    /// The response head was malformed.
    #[error("protocol: {0}")]
    Protocol(#[source] ParseError),

    /// A length-delimited request was finished before all declared bytes were written.
    #[error("incomplete request: {0}")]
    IncompleteBody(#[source] IncompleteBody),
}

impl Error {
    /// Whether this error originated in the transport.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_))
    }

    /// Whether this error is a proxy rejection.
    pub fn is_proxy(&self) -> bool {
        matches!(self, Error::Proxy { .. })
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Network(error)
    }
}

impl From<ReadError> for Error {
    fn from(error: ReadError) -> Self {
        match error {
            ReadError::Io(error) => Error::Network(error),
            ReadError::NoMessage => Error::Network(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before a response was received",
            )),
            ReadError::Parse(error) => Error::Protocol(error),
        }
    }
}

impl From<IncompleteBody> for Error {
    fn from(error: IncompleteBody) -> Self {
        Error::IncompleteBody(error)
    }
}

/// Copy an I/O error so it can be both returned and kept for later.
pub(crate) fn duplicate(error: &io::Error) -> io::Error {
    io::Error::new(error.kind(), error.to_string())
}

#[cfg(test)]
mod tests {

    use super::*;

    use static_assertions::assert_impl_all;

    assert_impl_all!(Error: std::error::Error, Send, Sync, Into<crate::BoxError>);

    #[test]
    fn no_message_is_network_error() {
        let error: Error = ReadError::NoMessage.into();
        assert!(error.is_network());
        match error {
            Error::Network(error) => assert_eq!(error.kind(), io::ErrorKind::UnexpectedEof),
            _ => unreachable!(),
        }
    }

    #[test]
    fn proxy_error_display() {
        let error = Error::Proxy {
            status: StatusCode::PROXY_AUTHENTICATION_REQUIRED,
            reason: "Proxy Authentication Required".into(),
        };
        assert!(error.is_proxy());
        assert_eq!(
            error.to_string(),
            "cannot establish proxy connection: 407 Proxy Authentication Required"
        );
    }
}
