//! Session parameters and their validation

use std::fmt;

use crate::error::ConfigError;

/// Identifier assigned once per start attempt, for logging and correlation only.
pub type ConnectionId = u64;

/// Everything a session worker needs to reach a server.
///
/// Immutable once handed to a worker. Never persisted by the core.
///
/// Only [`SessionParameters::new`] and [`SessionParameters::parse`] build one,
/// so every value has a non-empty address and secret and a non-zero port.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionParameters {
    address: String,
    port: u16,
    secret: Vec<u8>,
}

impl SessionParameters {
    /// Build validated parameters from an already-numeric port.
    pub fn new(
        address: impl Into<String>,
        port: u16,
        secret: impl Into<Vec<u8>>,
    ) -> Result<Self, ConfigError> {
        let address = address.into();
        let secret = secret.into();

        if address.trim().is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        if port == 0 {
            return Err(ConfigError::InvalidPort(port.to_string()));
        }
        if secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }

        Ok(Self {
            address,
            port,
            secret,
        })
    }

    /// Build parameters from textual configuration, where the port may be malformed.
    pub fn parse(address: &str, port: &str, secret: &str) -> Result<Self, ConfigError> {
        let port = parse_port(port)?;
        Self::new(address, port, secret.as_bytes().to_vec())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// `address:port`, suitable for socket connection.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

// The secret must never show up in logs.
impl fmt::Debug for SessionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParameters")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("secret", &format_args!("<{} bytes>", self.secret.len()))
            .finish()
    }
}

/// Parse a port the way the fallback configuration stores it: as text.
pub fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(port) if (1..=u16::MAX as u32).contains(&port) => Ok(port as u16),
        _ => Err(ConfigError::InvalidPort(raw.to_string())),
    }
}
