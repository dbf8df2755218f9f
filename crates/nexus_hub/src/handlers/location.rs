//! `location_query`: where was a player last committed?

use crate::dispatch::{HubCommand, HubContext};
use crate::envelope::Envelope;
use crate::error::HubError;
use crate::sessions::HubSession;
use async_trait::async_trait;
use nexus_event_system::{PlayerId, ServerId};
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, warn};

pub const LOCATION_QUERY: &str = "location_query";
pub const LOCATION_RESULT: &str = "location_result";

/// Conversation state for one location query.
pub struct LocationQuerySession {
    player: PlayerId,
    source: ServerId,
}

impl LocationQuerySession {
    pub fn player(&self) -> PlayerId {
        self.player
    }
}

#[async_trait]
impl HubSession for LocationQuerySession {
    fn source_server(&self) -> &ServerId {
        &self.source
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn handle_timeout(&self, transaction_id: &str) {
        // The reply was already lost; nothing left to unwind
        warn!(
            "Location query {} for {} expired",
            transaction_id, self.player
        );
    }
}

pub struct LocationQueryCommand;

#[async_trait]
impl HubCommand for LocationQueryCommand {
    fn name(&self) -> &'static str {
        LOCATION_QUERY
    }

    fn wants_session(&self) -> bool {
        true
    }

    fn open_session(
        &self,
        envelope: &Envelope,
        _ctx: &HubContext,
    ) -> Result<Arc<dyn HubSession>, HubError> {
        Ok(Arc::new(LocationQuerySession {
            player: envelope.player_field("player")?,
            source: ServerId::new(envelope.source_server.clone()),
        }))
    }

    async fn handle(
        &self,
        session: Option<Arc<dyn HubSession>>,
        envelope: &Envelope,
        ctx: &HubContext,
    ) -> Result<bool, HubError> {
        let session = session
            .as_deref()
            .and_then(|s| s.as_any().downcast_ref::<LocationQuerySession>())
            .ok_or_else(|| HubError::internal("location_query session has the wrong type"))?;

        let reply = match ctx.store.query_location(session.player).await? {
            Some(location) => {
                debug!("Location of {}: {}", session.player, location.world);
                envelope
                    .reply(LOCATION_RESULT, ctx.hub_name.clone())
                    .with_field("found", true)
                    .with_location("location", &location)
            }
            None => {
                debug!("Location of {}: unknown", session.player);
                envelope
                    .reply(LOCATION_RESULT, ctx.hub_name.clone())
                    .with_field("found", false)
            }
        };

        ctx.reply(&envelope.source_server, reply).await?;
        Ok(false)
    }
}
