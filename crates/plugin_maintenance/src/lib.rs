//! Maintenance-mode extension.
//!
//! While the switch is on, every login decision broadcast by the hub is
//! vetoed with a configurable message. Demonstrates the policy-extension
//! pattern: register a listener on the decision bus at activation, flip
//! the outcome in place, let the hub turn the cancelled event into a
//! `login_rejected` reply.

use async_trait::async_trait;
use nexus_event_system::{
    NexusPlugin, PlayerLoginDecision, PluginContext, PluginDescriptor, PluginError,
    PLAYER_LOGIN_EVENT,
};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Options read from the `[plugins.options.maintenance]` config table.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct MaintenanceOptions {
    enabled: bool,
    message: String,
}

impl Default for MaintenanceOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            message: "The server is down for maintenance".to_string(),
        }
    }
}

pub struct MaintenancePlugin {
    enabled: Arc<AtomicBool>,
}

impl MaintenancePlugin {
    pub fn new() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for flipping maintenance mode at runtime.
    pub fn switch(&self) -> Arc<AtomicBool> {
        self.enabled.clone()
    }
}

impl Default for MaintenancePlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NexusPlugin for MaintenancePlugin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor::new("maintenance", env!("CARGO_PKG_VERSION"))
    }

    async fn activate(&mut self, ctx: PluginContext) -> Result<(), PluginError> {
        let options: MaintenanceOptions = match &ctx.options {
            serde_json::Value::Null => MaintenanceOptions::default(),
            value => serde_json::from_value(value.clone())
                .map_err(|e| PluginError::ActivationFailed(format!("Bad options: {}", e)))?,
        };

        self.enabled.store(options.enabled, Ordering::SeqCst);
        info!(
            "🚧 Maintenance mode starts {}",
            if options.enabled { "ON" } else { "OFF" }
        );

        let enabled = self.enabled.clone();
        let message = options.message;
        ctx.events
            .on(PLAYER_LOGIN_EVENT, move |decision: &mut PlayerLoginDecision| {
                if enabled.load(Ordering::SeqCst) {
                    info!("🚧 Turning away {}: maintenance", decision.player());
                    decision.deny(message.clone());
                }
                Ok(())
            })
            .await;

        Ok(())
    }

    async fn deactivate(&mut self) -> Result<(), PluginError> {
        self.enabled.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_event_system::{create_event_bus, PlayerId};
    use std::path::PathBuf;

    async fn activated(options: serde_json::Value) -> (MaintenancePlugin, PluginContext) {
        let ctx = PluginContext::new(PathBuf::from("plugin_data"), options, create_event_bus());
        let mut plugin = MaintenancePlugin::new();
        plugin.activate(ctx.clone()).await.unwrap();
        (plugin, ctx)
    }

    #[tokio::test]
    async fn enabled_maintenance_denies_logins() {
        let (_plugin, ctx) = activated(serde_json::json!({
            "enabled": true,
            "message": "Back at 06:00 UTC"
        }))
        .await;

        let mut decision = PlayerLoginDecision::new(PlayerId::new(), None, None, None);
        ctx.events.broadcast(PLAYER_LOGIN_EVENT, &mut decision).await;

        assert!(decision.is_cancelled());
        assert_eq!(decision.deny_message(), Some("Back at 06:00 UTC"));
    }

    #[tokio::test]
    async fn disabled_maintenance_leaves_logins_alone() {
        let (_plugin, ctx) = activated(serde_json::json!({ "enabled": false })).await;

        let mut decision = PlayerLoginDecision::new(PlayerId::new(), None, None, None);
        ctx.events.broadcast(PLAYER_LOGIN_EVENT, &mut decision).await;
        assert!(!decision.is_cancelled());
    }

    #[tokio::test]
    async fn missing_options_default_to_off() {
        let (_plugin, ctx) = activated(serde_json::Value::Null).await;

        let mut decision = PlayerLoginDecision::new(PlayerId::new(), None, None, None);
        ctx.events.broadcast(PLAYER_LOGIN_EVENT, &mut decision).await;
        assert!(!decision.is_cancelled());
    }

    #[tokio::test]
    async fn switch_flips_mode_at_runtime() {
        let (plugin, ctx) = activated(serde_json::json!({ "enabled": false })).await;

        plugin.switch().store(true, Ordering::SeqCst);
        let mut decision = PlayerLoginDecision::new(PlayerId::new(), None, None, None);
        ctx.events.broadcast(PLAYER_LOGIN_EVENT, &mut decision).await;
        assert!(decision.is_cancelled());

        plugin.switch().store(false, Ordering::SeqCst);
        let mut decision = PlayerLoginDecision::new(PlayerId::new(), None, None, None);
        ctx.events.broadcast(PLAYER_LOGIN_EVENT, &mut decision).await;
        assert!(!decision.is_cancelled());
    }

    #[tokio::test]
    async fn deactivation_clears_the_switch() {
        let (mut plugin, ctx) = activated(serde_json::json!({ "enabled": true })).await;
        plugin.deactivate().await.unwrap();

        let mut decision = PlayerLoginDecision::new(PlayerId::new(), None, None, None);
        ctx.events.broadcast(PLAYER_LOGIN_EVENT, &mut decision).await;
        assert!(!decision.is_cancelled());
    }
}
