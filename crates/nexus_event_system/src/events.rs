//! Decision events published by the hub core.
//!
//! These are the mutable values handed to policy extensions through the
//! [`EventBus`](crate::EventBus). Extensions may overwrite the routing
//! outcome in place; the publisher reads the final state back after the
//! last listener has run.

use crate::types::{Location, PlayerId, ServerId};
use std::net::IpAddr;

/// Name under which [`PlayerLoginDecision`] is broadcast.
pub const PLAYER_LOGIN_EVENT: &str = "player_login";

/// Broadcast while a player's initial login is being routed.
///
/// The hub pre-populates the event with the default placement outcome.
/// Listeners may re-target the login or veto it entirely; if the event
/// comes back cancelled the player is rejected with the recorded message.
#[derive(Debug)]
pub struct PlayerLoginDecision {
    player: PlayerId,
    ip: Option<IpAddr>,
    location: Option<Location>,
    target: Option<ServerId>,
    deny_message: Option<String>,
    cancelled: bool,
}

impl PlayerLoginDecision {
    pub fn new(
        player: PlayerId,
        ip: Option<IpAddr>,
        target: Option<ServerId>,
        location: Option<Location>,
    ) -> Self {
        Self {
            player,
            ip,
            location,
            target,
            deny_message: None,
            cancelled: false,
        }
    }

    /// Player attempting to log in.
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// IP the player is connecting from, v4 or v6. Absent if the frontend
    /// could not report one.
    pub fn player_ip(&self) -> Option<IpAddr> {
        self.ip
    }

    /// Location the player will be sent to.
    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// Backend server the player will be sent to. May be `None` if no
    /// target could be determined; if that is still the case after the
    /// broadcast, the login is rejected.
    pub fn target(&self) -> Option<&ServerId> {
        self.target.as_ref()
    }

    /// Redirects the login to a different backend server and location.
    pub fn set_target(&mut self, target: ServerId, location: Option<Location>) {
        self.target = Some(target);
        self.location = location;
    }

    /// Message shown to the player if the login is denied.
    pub fn deny_message(&self) -> Option<&str> {
        self.deny_message.as_deref()
    }

    /// Sets the message shown to the player and marks the login cancelled.
    pub fn deny(&mut self, message: impl Into<String>) {
        self.deny_message = Some(message.into());
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}
