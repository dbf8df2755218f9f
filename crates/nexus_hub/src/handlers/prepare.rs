//! `prepare_login`: check a player's state out to a backend.
//!
//! Sent by a backend that is about to instantiate a player. On success
//! the reply carries the stored blob (base64) and whether the player is
//! fresh; the zero-length blob is the fresh sentinel on the wire. If
//! another backend owns the player, or the store is unreachable, the
//! reply is `prepare_rejected` and the backend must not spawn the player.

use crate::dispatch::{HubCommand, HubContext};
use crate::envelope::Envelope;
use crate::error::HubError;
use crate::ownership::PrepareOutcome;
use crate::sessions::HubSession;
use async_trait::async_trait;
use nexus_event_system::ServerId;
use std::sync::Arc;
use tracing::{info, warn};

pub const PREPARE_LOGIN: &str = "prepare_login";
pub const PREPARE_RESULT: &str = "prepare_result";
pub const PREPARE_REJECTED: &str = "prepare_rejected";

pub struct PrepareLoginCommand;

#[async_trait]
impl HubCommand for PrepareLoginCommand {
    fn name(&self) -> &'static str {
        PREPARE_LOGIN
    }

    async fn handle(
        &self,
        _session: Option<Arc<dyn HubSession>>,
        envelope: &Envelope,
        ctx: &HubContext,
    ) -> Result<bool, HubError> {
        let player = envelope.player_field("player")?;
        let server = ServerId::new(envelope.source_server.clone());

        let reply = match ctx.store.prepare_login(player, &server).await {
            Ok(PrepareOutcome::Fresh) => {
                info!("Prepared fresh player {} for {}", player, server);
                envelope
                    .reply(PREPARE_RESULT, ctx.hub_name.clone())
                    .with_blob("data", b"")
                    .with_field("fresh", true)
            }
            Ok(PrepareOutcome::Existing(data)) => {
                info!(
                    "Prepared player {} for {} ({} bytes)",
                    player,
                    server,
                    data.len()
                );
                envelope
                    .reply(PREPARE_RESULT, ctx.hub_name.clone())
                    .with_blob("data", &data)
                    .with_field("fresh", false)
            }
            Ok(PrepareOutcome::AlreadyOwned(owner)) => {
                info!(
                    "Denied prepare of {} for {}: owned by {}",
                    player, server, owner
                );
                envelope
                    .reply(PREPARE_REJECTED, ctx.hub_name.clone())
                    .with_field("reason", format!("Player is owned by {}", owner))
            }
            Err(e) => {
                // Fail closed: an unreachable store must never let a
                // second copy of the player spawn
                warn!("Prepare of {} for {} failed closed: {}", player, server, e);
                envelope
                    .reply(PREPARE_REJECTED, ctx.hub_name.clone())
                    .with_field("reason", "Ownership store unavailable")
            }
        };

        ctx.reply(&envelope.source_server, reply).await?;
        Ok(true)
    }
}
