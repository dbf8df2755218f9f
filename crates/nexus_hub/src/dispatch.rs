//! Command dispatch.
//!
//! Every inbound envelope is routed by its command identifier to a
//! registered [`HubCommand`]. Session-bearing commands get their
//! conversation session opened on the first frame and handed back on
//! every later frame of the same transaction; the handler's return value
//! decides whether the session stays open.
//!
//! Unknown commands and malformed payloads are logged and dropped. The
//! bus redelivers and duplicates at will, so a NACK would only add
//! traffic without adding information.

use crate::envelope::Envelope;
use crate::error::HubError;
use crate::ownership::OwnershipStore;
use crate::placement::{BackendDirectory, PlacementResolver};
use crate::sessions::{HubSession, SessionError, SessionRegistry};
use crate::transport::{BroadcastInterestTracker, MessageSender};
use async_trait::async_trait;
use nexus_event_system::EventBus;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Shared hub state handed to every command handler.
pub struct HubContext {
    /// Logical name of this hub on the bus, used as the source of replies
    pub hub_name: String,
    pub store: Arc<dyn OwnershipStore>,
    pub sessions: SessionRegistry,
    pub sender: Arc<dyn MessageSender>,
    pub broadcasts: Arc<BroadcastInterestTracker>,
    pub events: Arc<EventBus>,
    pub directory: Arc<BackendDirectory>,
    pub placement: Arc<PlacementResolver>,
    /// Expiry applied to every session the dispatcher opens
    pub session_timeout: Duration,
}

impl HubContext {
    /// Sends a point-to-point reply back to the server named in `target`.
    pub async fn reply(&self, target: &str, envelope: Envelope) -> Result<(), HubError> {
        self.sender
            .send_to(&nexus_event_system::ServerId::new(target), &envelope)
            .await
    }
}

/// One command the hub understands.
#[async_trait]
pub trait HubCommand: Send + Sync {
    /// Command identifier matched against [`Envelope::command`].
    fn name(&self) -> &'static str;

    /// Whether this command correlates frames into a session.
    fn wants_session(&self) -> bool {
        false
    }

    /// Builds the session from a conversation's first frame.
    ///
    /// Only called when [`wants_session`](Self::wants_session) is true
    /// and no session exists for the frame's transaction id.
    fn open_session(
        &self,
        envelope: &Envelope,
        ctx: &HubContext,
    ) -> Result<Arc<dyn HubSession>, HubError> {
        let _ = (envelope, ctx);
        Err(HubError::internal(format!(
            "Command {} does not open sessions",
            self.name()
        )))
    }

    /// Handles one frame.
    ///
    /// `session` is `Some` exactly when [`wants_session`](Self::wants_session)
    /// is true. Returning `Ok(false)` closes the session; `Ok(true)`
    /// leaves it open for the conversation's next frame.
    async fn handle(
        &self,
        session: Option<Arc<dyn HubSession>>,
        envelope: &Envelope,
        ctx: &HubContext,
    ) -> Result<bool, HubError>;
}

/// Routes envelopes to their handlers.
pub struct CommandDispatcher {
    commands: HashMap<String, Arc<dyn HubCommand>>,
    ctx: Arc<HubContext>,
}

impl CommandDispatcher {
    pub fn new(ctx: Arc<HubContext>) -> Self {
        Self {
            commands: HashMap::new(),
            ctx,
        }
    }

    pub fn register(&mut self, command: Arc<dyn HubCommand>) {
        debug!("Registered command handler {}", command.name());
        self.commands.insert(command.name().to_string(), command);
    }

    pub fn context(&self) -> Arc<HubContext> {
        self.ctx.clone()
    }

    /// Dispatches one envelope to completion.
    pub async fn dispatch(&self, envelope: Envelope) {
        let Some(command) = self.commands.get(&envelope.command) else {
            debug!(
                "Dropping unknown command {} from {}",
                envelope.command, envelope.source_server
            );
            return;
        };

        let session = if command.wants_session() {
            match self.session_for(command.as_ref(), &envelope) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!(
                        "Dropping {} frame from {}: {}",
                        envelope.command, envelope.source_server, e
                    );
                    return;
                }
            }
        } else {
            None
        };

        match command.handle(session, &envelope, &self.ctx).await {
            Ok(true) => {}
            Ok(false) => {
                self.ctx.sessions.close(&envelope.transaction_id);
            }
            Err(e) => match e {
                HubError::Decode(_) | HubError::Payload(_) => {
                    // Malformed traffic is noise, not an incident
                    warn!(
                        "Dropping malformed {} frame from {}: {}",
                        envelope.command, envelope.source_server, e
                    );
                }
                other => {
                    // The session, if any, is left to its timeout
                    error!(
                        "❌ Handler for {} (transaction {}) failed: {}",
                        envelope.command, envelope.transaction_id, other
                    );
                }
            },
        }
    }

    /// Finds or opens the session for a session-bearing frame.
    fn session_for(
        &self,
        command: &dyn HubCommand,
        envelope: &Envelope,
    ) -> Result<Arc<dyn HubSession>, HubError> {
        if let Some(existing) = self.ctx.sessions.lookup(&envelope.transaction_id) {
            return Ok(existing);
        }
        let session = command.open_session(envelope, &self.ctx)?;
        match self.ctx.sessions.open(
            envelope.transaction_id.clone(),
            session.clone(),
            self.ctx.session_timeout,
        ) {
            Ok(()) => Ok(session),
            // Lost a race against another frame of the same conversation;
            // the session that made it into the registry is authoritative
            Err(SessionError::DuplicateTransaction(_)) => self
                .ctx
                .sessions
                .lookup(&envelope.transaction_id)
                .ok_or_else(|| {
                    HubError::internal(format!(
                        "Session for {} vanished during open",
                        envelope.transaction_id
                    ))
                }),
        }
    }
}
