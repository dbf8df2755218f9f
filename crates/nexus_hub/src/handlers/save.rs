//! `commit_save`: write a player's state back and release ownership.
//!
//! Sent by the owning backend when the player logs out or transfers.
//! Conflicts are answered explicitly with `save_rejected`; a backend that
//! lost ownership must learn about it rather than believe its save
//! landed.

use crate::dispatch::{HubCommand, HubContext};
use crate::envelope::Envelope;
use crate::error::HubError;
use crate::ownership::{CommitOutcome, StoreError};
use crate::sessions::HubSession;
use async_trait::async_trait;
use nexus_event_system::ServerId;
use std::sync::Arc;
use tracing::{info, warn};

pub const COMMIT_SAVE: &str = "commit_save";
pub const SAVE_CONFIRMED: &str = "save_confirmed";
pub const SAVE_REJECTED: &str = "save_rejected";

pub struct CommitSaveCommand;

#[async_trait]
impl HubCommand for CommitSaveCommand {
    fn name(&self) -> &'static str {
        COMMIT_SAVE
    }

    async fn handle(
        &self,
        _session: Option<Arc<dyn HubSession>>,
        envelope: &Envelope,
        ctx: &HubContext,
    ) -> Result<bool, HubError> {
        let player = envelope.player_field("player")?;
        let data = envelope.blob_field("data")?;
        let location = envelope.location_field("location")?;
        let server = ServerId::new(envelope.source_server.clone());

        let reply = match ctx.store.commit_save(player, &server, data, location).await {
            Ok(CommitOutcome::Committed) => {
                info!("💾 Committed save of {} from {}", player, server);
                envelope.reply(SAVE_CONFIRMED, ctx.hub_name.clone())
            }
            Ok(CommitOutcome::NotPrepared) => {
                warn!("Rejected save of {} from {}: not prepared", player, server);
                envelope
                    .reply(SAVE_REJECTED, ctx.hub_name.clone())
                    .with_field("reason", "Player is not checked out")
            }
            Ok(CommitOutcome::OwnershipMismatch(owner)) => {
                warn!(
                    "Rejected save of {} from {}: owned by {}",
                    player, server, owner
                );
                envelope
                    .reply(SAVE_REJECTED, ctx.hub_name.clone())
                    .with_field("reason", format!("Player is owned by {}", owner))
            }
            Err(StoreError::ReservedSentinel) => {
                warn!("Rejected empty save of {} from {}", player, server);
                envelope
                    .reply(SAVE_REJECTED, ctx.hub_name.clone())
                    .with_field("reason", "Empty state blobs are reserved")
            }
            Err(e) => {
                warn!("Save of {} from {} failed closed: {}", player, server, e);
                envelope
                    .reply(SAVE_REJECTED, ctx.hub_name.clone())
                    .with_field("reason", "Ownership store unavailable")
            }
        };

        ctx.reply(&envelope.source_server, reply).await?;
        Ok(true)
    }
}
