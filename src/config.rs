//! Session configuration.
//!
//! A [`ServerAddr`] is parsed from a single `"host[:port]"` string; the
//! port defaults to 6667 when omitted. [`ClientConfig`] carries everything
//! fixed at connect time: the endpoint, the TLS flags, identity fields for
//! registration, and the optional outbound message prefix.

use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Default IRC port used when the address string omits one.
pub const DEFAULT_PORT: u16 = 6667;

/// A server endpoint: hostname plus port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerAddr {
    /// Hostname or IP address literal.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ServerAddr {
    /// Create an endpoint from explicit parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for ServerAddr {
    type Err = EngineError;

    /// Parse `"host[:port]"`. More than one colon-separated segment after
    /// the host, an empty host, or an unparseable port are rejected
    /// synchronously.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let host = parts.next().unwrap_or("");
        if host.is_empty() {
            return Err(EngineError::InvalidAddress(s.to_string()));
        }

        let port = match parts.next() {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| EngineError::InvalidAddress(s.to_string()))?,
            None => DEFAULT_PORT,
        };

        if parts.next().is_some() {
            return Err(EngineError::InvalidAddress(s.to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Configuration for one client session, fixed at connect time.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Server endpoint.
    pub server: ServerAddr,
    /// Wrap the connection in TLS.
    pub use_tls: bool,
    /// Skip certificate validation entirely.
    ///
    /// **Insecure.** Every certificate is accepted, including expired,
    /// self-signed, and wrong-host certificates. Only meaningful together
    /// with `use_tls`, and only for servers you have no other way to reach.
    pub danger_accept_invalid_certs: bool,
    /// Desired nickname.
    pub nickname: String,
    /// Username (ident).
    pub username: String,
    /// Real name / GECOS.
    pub realname: String,
    /// Server password, sent as `PASS` before registration if present.
    pub password: Option<String>,
    /// Text encoding for decoding incoming frames, as an `encoding_rs`
    /// label. Defaults to `"utf-8"`.
    pub encoding: String,
    /// Prefix prepended to user-originated chat messages.
    pub message_prefix: Option<String>,
}

impl ClientConfig {
    /// Plain-TCP config with the given endpoint and nickname; username and
    /// realname default to the nickname.
    pub fn new(server: ServerAddr, nickname: impl Into<String>) -> Self {
        let nickname = nickname.into();
        Self {
            server,
            use_tls: false,
            danger_accept_invalid_certs: false,
            username: nickname.clone(),
            realname: nickname.clone(),
            nickname,
            password: None,
            encoding: "utf-8".to_string(),
            message_prefix: None,
        }
    }
}
