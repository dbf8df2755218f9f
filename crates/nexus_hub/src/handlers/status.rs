//! `server_status`: backend liveness and world-coverage announcements.
//!
//! Backends send this periodically and on state changes. The hub records
//! the announcement in the [`BackendDirectory`], registers the sender for
//! any fan-out commands it subscribes to, and fans out a
//! `server_status_changed` frame to every server that asked for them.
//!
//! [`BackendDirectory`]: crate::placement::BackendDirectory

use crate::dispatch::{HubCommand, HubContext};
use crate::envelope::Envelope;
use crate::error::HubError;
use crate::sessions::HubSession;
use async_trait::async_trait;
use nexus_event_system::ServerId;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

pub const SERVER_STATUS: &str = "server_status";
pub const SERVER_STATUS_CHANGED: &str = "server_status_changed";

pub struct ServerStatusCommand;

#[async_trait]
impl HubCommand for ServerStatusCommand {
    fn name(&self) -> &'static str {
        SERVER_STATUS
    }

    async fn handle(
        &self,
        _session: Option<Arc<dyn HubSession>>,
        envelope: &Envelope,
        ctx: &HubContext,
    ) -> Result<bool, HubError> {
        let live = envelope.bool_field("live")?;
        let worlds: HashSet<String> = envelope
            .payload
            .get("worlds")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let server = ServerId::new(envelope.source_server.clone());

        // Optional fan-out subscriptions ride along on the announcement
        if let Some(subscriptions) = envelope.payload.get("subscribe").and_then(Value::as_array) {
            for command in subscriptions.iter().filter_map(Value::as_str) {
                ctx.broadcasts.register(command, server.clone());
            }
        }

        ctx.directory.update(server.clone(), live, worlds.clone());
        if !live {
            ctx.broadcasts.unregister_all(&server);
        }

        let mut worlds: Vec<String> = worlds.into_iter().collect();
        worlds.sort();
        let notice = Envelope::new(
            SERVER_STATUS_CHANGED,
            envelope.transaction_id.clone(),
            ctx.hub_name.clone(),
        )
        .with_field("server", server.as_str())
        .with_field("live", live)
        .with_field("worlds", worlds);
        ctx.broadcasts.fan_out(ctx.sender.as_ref(), &notice).await;

        Ok(true)
    }
}
