//! `login_request`: route a player's initial login to a backend.
//!
//! Sent by a frontend when a player connects. The hub looks up the
//! player's last committed location, asks the placement resolver for a
//! default target, then broadcasts a [`PlayerLoginDecision`] so policy
//! extensions can re-target or veto the login. The reply is either
//! `login_confirmed` with the chosen backend or `login_rejected` with a
//! human-readable reason.

use crate::dispatch::{HubCommand, HubContext};
use crate::envelope::Envelope;
use crate::error::HubError;
use crate::sessions::HubSession;
use async_trait::async_trait;
use nexus_event_system::{PlayerId, PlayerLoginDecision, ServerId, PLAYER_LOGIN_EVENT};
use std::any::Any;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};

pub const LOGIN_REQUEST: &str = "login_request";
pub const LOGIN_CONFIRMED: &str = "login_confirmed";
pub const LOGIN_REJECTED: &str = "login_rejected";

/// Conversation state for one login attempt.
pub struct LoginSession {
    player: PlayerId,
    ip: Option<IpAddr>,
    source: ServerId,
    sender: Arc<dyn crate::transport::MessageSender>,
    hub_name: String,
}

impl LoginSession {
    pub fn player(&self) -> PlayerId {
        self.player
    }
}

#[async_trait]
impl HubSession for LoginSession {
    fn source_server(&self) -> &ServerId {
        &self.source
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn handle_timeout(&self, transaction_id: &str) {
        warn!(
            "Login conversation {} for {} expired, rejecting",
            transaction_id, self.player
        );
        let reply = Envelope::new(LOGIN_REJECTED, transaction_id, self.hub_name.clone())
            .with_field("reason", "Login timed out");
        if let Err(e) = self.sender.send_to(&self.source, &reply).await {
            warn!("Could not deliver login timeout rejection: {}", e);
        }
    }
}

pub struct LoginRequestCommand;

#[async_trait]
impl HubCommand for LoginRequestCommand {
    fn name(&self) -> &'static str {
        LOGIN_REQUEST
    }

    fn wants_session(&self) -> bool {
        true
    }

    fn open_session(
        &self,
        envelope: &Envelope,
        ctx: &HubContext,
    ) -> Result<Arc<dyn HubSession>, HubError> {
        let player = envelope.player_field("player")?;
        // An unreadable address only costs ip-based policy its input,
        // never the login itself
        let ip = envelope.opt_str_field("ip").and_then(|raw| {
            match raw.parse::<IpAddr>() {
                Ok(ip) => Some(ip),
                Err(e) => {
                    warn!("Ignoring unparseable ip {:?} in login_request: {}", raw, e);
                    None
                }
            }
        });
        Ok(Arc::new(LoginSession {
            player,
            ip,
            source: ServerId::new(envelope.source_server.clone()),
            sender: ctx.sender.clone(),
            hub_name: ctx.hub_name.clone(),
        }))
    }

    async fn handle(
        &self,
        session: Option<Arc<dyn HubSession>>,
        envelope: &Envelope,
        ctx: &HubContext,
    ) -> Result<bool, HubError> {
        // Single narrowing point for this conversation's session type
        let session = session
            .as_deref()
            .and_then(|s| s.as_any().downcast_ref::<LoginSession>())
            .ok_or_else(|| HubError::internal("login_request session has the wrong type"))?;

        let location = ctx.store.query_location(session.player).await?;
        let target = ctx.placement.resolve(location.as_ref());

        let mut decision =
            PlayerLoginDecision::new(session.player, session.ip, target, location);
        ctx.events.broadcast(PLAYER_LOGIN_EVENT, &mut decision).await;

        let reply = if decision.is_cancelled() {
            let reason = decision.deny_message().unwrap_or("Login denied").to_string();
            info!("🚫 Login of {} denied: {}", session.player, reason);
            envelope
                .reply(LOGIN_REJECTED, ctx.hub_name.clone())
                .with_field("reason", reason)
        } else if let Some(target) = decision.target() {
            info!("✅ Login of {} routed to {}", session.player, target);
            let mut reply = envelope
                .reply(LOGIN_CONFIRMED, ctx.hub_name.clone())
                .with_field("target", target.as_str());
            if let Some(location) = decision.location() {
                reply = reply.with_location("location", location);
            }
            reply
        } else {
            info!("🚫 Login of {} rejected: no target found", session.player);
            envelope
                .reply(LOGIN_REJECTED, ctx.hub_name.clone())
                .with_field("reason", "No target found")
        };

        ctx.reply(&envelope.source_server, reply).await?;
        Ok(false)
    }
}
