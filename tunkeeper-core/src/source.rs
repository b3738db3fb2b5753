//! Where the parameters for an explicit start come from

use crate::config::FallbackServer;
use crate::directory::ServerEntry;
use crate::error::ConfigError;
use crate::params::SessionParameters;

/// Resolves the parameters for the next explicit start
pub trait ParameterSource: Send + Sync {
    fn resolve(&self) -> Result<SessionParameters, ConfigError>;
}

impl ParameterSource for SessionParameters {
    fn resolve(&self) -> Result<SessionParameters, ConfigError> {
        Ok(self.clone())
    }
}

impl ParameterSource for FallbackServer {
    fn resolve(&self) -> Result<SessionParameters, ConfigError> {
        SessionParameters::parse(&self.address, &self.port, &self.secret)
    }
}

impl ParameterSource for ServerEntry {
    fn resolve(&self) -> Result<SessionParameters, ConfigError> {
        self.parameters()
    }
}

/// The selected directory entry if there is one, otherwise the static fallback
#[derive(Debug, Clone)]
pub struct SelectionOrFallback {
    pub selected: Option<ServerEntry>,
    pub fallback: FallbackServer,
}

impl SelectionOrFallback {
    pub fn new(selected: Option<ServerEntry>, fallback: FallbackServer) -> Self {
        Self { selected, fallback }
    }
}

impl ParameterSource for SelectionOrFallback {
    fn resolve(&self) -> Result<SessionParameters, ConfigError> {
        match &self.selected {
            Some(entry) => entry.resolve(),
            None => self.fallback.resolve(),
        }
    }
}
