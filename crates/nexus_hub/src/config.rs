//! Hub configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the hub core. Embedded as the `[hub]` section of the
/// binary's configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Logical name of this hub on the message bus
    pub hub_name: String,
    /// How long a conversation session may stay open, in milliseconds
    pub session_timeout_ms: u64,
    /// Backend that receives logins no other placement rule covers
    pub default_server: Option<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            hub_name: "nexus".to_string(),
            session_timeout_ms: 5_000,
            default_server: None,
        }
    }
}

impl HubConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    /// Checks the configuration for values the hub cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.hub_name.is_empty() {
            return Err("hub_name must not be empty".to_string());
        }
        if self.session_timeout_ms == 0 {
            return Err("session_timeout_ms must be greater than zero".to_string());
        }
        Ok(())
    }
}
