//! Host-service intents
//!
//! The host delivers start requests as loosely typed action strings. Only an
//! explicit disconnect stops the session; anything else, including no action
//! at all, is a connect.

use std::str::FromStr;

use tracing::debug;

use crate::lifecycle::ConnectionManager;
use crate::source::ParameterSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Connect,
    Disconnect,
}

/// Whether the host should restart the service after it is killed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stickiness {
    Sticky,
    NotSticky,
}

impl Intent {
    /// Map an optional action string to an intent; unknown actions connect
    pub fn from_action(action: Option<&str>) -> Self {
        action
            .and_then(|a| a.parse().ok())
            .unwrap_or(Intent::Connect)
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Namespaced actions such as "net.example.vpn.STOP" match on the last segment
        let verb = s.rsplit('.').next().unwrap_or(s);
        match verb.to_ascii_lowercase().as_str() {
            "connect" | "start" => Ok(Intent::Connect),
            "disconnect" | "stop" => Ok(Intent::Disconnect),
            _ => Err(format!("unknown action: {s}")),
        }
    }
}

/// Apply an intent to the manager.
///
/// A connect that fails on bad configuration has already been reported to the
/// status sink by the manager; it is still sticky.
pub fn dispatch(
    intent: Intent,
    manager: &ConnectionManager,
    source: &dyn ParameterSource,
) -> Stickiness {
    debug!(?intent, "Dispatching intent");
    match intent {
        Intent::Disconnect => {
            manager.stop();
            Stickiness::NotSticky
        }
        Intent::Connect => {
            let _ = manager.start_from_source(source);
            Stickiness::Sticky
        }
    }
}
