//! Configuration management for the Nexus hub binary.
//!
//! Loads the TOML configuration file, writing a default one on first run,
//! and validates it before the hub starts.

use nexus_hub::HubConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Hub core settings
    pub hub: HubConfig,
    /// Extension settings
    pub plugins: PluginSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Extension configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    /// Directory under which each extension gets a data directory
    pub data_directory: String,
    /// Per-extension option tables, keyed by extension name
    pub options: HashMap<String, toml::Value>,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            data_directory: "plugin_data".to_string(),
            options: HashMap::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter
    pub level: String,
    /// JSON formatting
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a file, creating a default one if absent.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.hub.validate()?;
        if self.plugins.data_directory.is_empty() {
            return Err("plugins.data_directory must not be empty".to_string());
        }
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(format!("Unknown log level: {}", other)),
        }
    }

    /// Options for one extension as JSON, `Null` when not configured.
    pub fn plugin_options(&self, name: &str) -> serde_json::Value {
        self.plugins
            .options
            .get(name)
            .and_then(|value| serde_json::to_value(value).ok())
            .unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.hub.hub_name, "nexus");
        assert_eq!(config.hub.session_timeout_ms, 5_000);
        assert!(config.hub.default_server.is_none());

        assert_eq!(config.plugins.data_directory, "plugin_data");
        assert!(config.plugins.options.is_empty());

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.json_format, false);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.hub.session_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.plugins.data_directory.clear();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let file = NamedTempFile::new().unwrap();
        let content = r#"
[hub]
hub_name = "nexus-eu"
session_timeout_ms = 2500
default_server = "world-1"

[plugins]
data_directory = "data"

[plugins.options.maintenance]
enabled = true
message = "Back soon"

[logging]
level = "debug"
json_format = true
"#;
        tokio::fs::write(file.path(), content).await.unwrap();

        let config = AppConfig::load_from_file(&file.path().to_path_buf())
            .await
            .unwrap();
        assert_eq!(config.hub.hub_name, "nexus-eu");
        assert_eq!(config.hub.session_timeout_ms, 2500);
        assert_eq!(config.hub.default_server.as_deref(), Some("world-1"));
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);

        let options = config.plugin_options("maintenance");
        assert_eq!(options["enabled"], true);
        assert_eq!(options["message"], "Back soon");
        assert!(config.plugin_options("absent").is_null());
    }

    #[tokio::test]
    async fn test_missing_file_creates_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.hub.hub_name, "nexus");
        assert!(path.exists());

        // The written file parses back to the same defaults
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.hub.hub_name, config.hub.hub_name);
        assert_eq!(reloaded.logging.level, config.logging.level);
    }

    #[tokio::test]
    async fn test_partial_file_fills_in_defaults() {
        let file = NamedTempFile::new().unwrap();
        tokio::fs::write(file.path(), "[hub]\ndefault_server = \"world-1\"\n")
            .await
            .unwrap();

        let config = AppConfig::load_from_file(&file.path().to_path_buf())
            .await
            .unwrap();
        assert_eq!(config.hub.default_server.as_deref(), Some("world-1"));
        assert_eq!(config.hub.session_timeout_ms, 5_000);
        assert_eq!(config.logging.level, "info");
    }
}
