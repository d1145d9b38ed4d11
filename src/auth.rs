//! Proxy credentials.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http::header::{HeaderValue, PROXY_AUTHORIZATION};

use crate::message::Request;

/// Something which can mark a request as authenticated to a proxy.
pub trait Credentials {
    /// Add proxy authentication to `request`.
    fn proxy_authenticate(&self, request: &mut Request);
}

/// HTTP Basic credentials, sent in the `Proxy-Authorization` header.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    username: String,
    password: String,
}

impl BasicCredentials {
    /// Create credentials from a username and password.
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The username.
    pub fn username(&self) -> &str {
        &self.username
    }

    fn header_value(&self) -> Option<HeaderValue> {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        let mut value = HeaderValue::from_str(&format!("Basic {token}")).ok()?;
        value.set_sensitive(true);
        Some(value)
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials for BasicCredentials {
    fn proxy_authenticate(&self, request: &mut Request) {
        if let Some(value) = self.header_value() {
            request.set(PROXY_AUTHORIZATION, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_proxy_authorization() {
        let mut request = Request::default();
        BasicCredentials::new("Aladdin", "open sesame").proxy_authenticate(&mut request);
        assert_eq!(
            request.headers()[PROXY_AUTHORIZATION],
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
        );
        assert!(request.headers()[PROXY_AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn debug_redacts_password() {
        let creds = BasicCredentials::new("user", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
