//! Server directory model
//!
//! The directory is a JSON document listing the servers a user can pick:
//!
//! ```json
//! { "servers": [ { "name": "Frankfurt", "address": "10.0.0.1", "port": 8000, "secret": "test" } ] }
//! ```
//!
//! Fetching and caching the document is someone else's job; this module only
//! parses it and turns the selected entry into [`SessionParameters`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::params::SessionParameters;

/// One selectable server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerEntry {
    pub name: String,
    pub address: String,
    pub port: u32,
    pub secret: String,
}

impl ServerEntry {
    /// Convert into validated session parameters.
    pub fn parameters(&self) -> Result<SessionParameters, ConfigError> {
        let port = u16::try_from(self.port)
            .map_err(|_| ConfigError::InvalidPort(self.port.to_string()))?;
        SessionParameters::new(&self.address, port, self.secret.as_bytes().to_vec())
    }
}

/// Parsed server directory
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerDirectory {
    pub servers: Vec<ServerEntry>,
}

impl ServerDirectory {
    /// Parse a directory document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a directory file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Names in document order, as a picker would show them.
    pub fn names(&self) -> Vec<&str> {
        self.servers.iter().map(|s| s.name.as_str()).collect()
    }

    /// Select an entry by name, or the first entry when no name is given.
    pub fn select(&self, name: Option<&str>) -> Result<&ServerEntry, ConfigError> {
        match name {
            Some(name) => self
                .servers
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| ConfigError::UnknownServer(name.to_string())),
            None => self.servers.first().ok_or(ConfigError::EmptyDirectory),
        }
    }
}
