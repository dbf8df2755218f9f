//! Outbound message delivery.
//!
//! The broker itself is external; the hub only needs a way to hand a
//! reply envelope to a named server. [`MessageSender`] is that seam, and
//! [`ChannelTransport`] is the in-process implementation the standalone
//! binary and the tests run on.
//!
//! Fan-out replies go through the [`BroadcastInterestTracker`]: servers
//! register interest in a command identifier and receive every envelope
//! published under it.

use crate::envelope::Envelope;
use crate::error::HubError;
use async_trait::async_trait;
use dashmap::DashMap;
use nexus_event_system::ServerId;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Hands an envelope to a single named server.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_to(&self, target: &ServerId, envelope: &Envelope) -> Result<(), HubError>;
}

/// Tracks which servers want which fan-out commands.
pub struct BroadcastInterestTracker {
    interests: DashMap<String, HashSet<ServerId>>,
}

impl BroadcastInterestTracker {
    pub fn new() -> Self {
        Self {
            interests: DashMap::new(),
        }
    }

    /// Registers a server's interest in a command identifier.
    pub fn register(&self, command: impl Into<String>, server: ServerId) {
        let command = command.into();
        debug!("Server {} registered for {} fan-out", server, command);
        self.interests.entry(command).or_default().insert(server);
    }

    /// Drops one server's interest in a command identifier.
    pub fn unregister(&self, command: &str, server: &ServerId) {
        if let Some(mut entry) = self.interests.get_mut(command) {
            entry.remove(server);
        }
    }

    /// Drops a server from every command it registered for. Used when a
    /// backend goes away.
    pub fn unregister_all(&self, server: &ServerId) {
        for mut entry in self.interests.iter_mut() {
            entry.remove(server);
        }
    }

    /// Servers currently registered for a command identifier.
    pub fn interested(&self, command: &str) -> Vec<ServerId> {
        self.interests
            .get(command)
            .map(|servers| servers.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Sends an envelope to every server registered for its command.
    ///
    /// A failed delivery is logged and skipped; one dead subscriber never
    /// starves the rest.
    pub async fn fan_out(&self, sender: &dyn MessageSender, envelope: &Envelope) {
        for server in self.interested(&envelope.command) {
            if let Err(e) = sender.send_to(&server, envelope).await {
                warn!(
                    "⚠️  Fan-out of {} to {} failed: {}",
                    envelope.command, server, e
                );
            }
        }
    }
}

impl Default for BroadcastInterestTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// In-process transport backed by per-server unbounded channels.
pub struct ChannelTransport {
    inboxes: DashMap<ServerId, mpsc::UnboundedSender<Envelope>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self {
            inboxes: DashMap::new(),
        }
    }

    /// Creates an inbox for a server and returns its receiving end.
    ///
    /// Registering the same server again replaces the previous inbox.
    pub fn register(&self, server: ServerId) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.insert(server, tx);
        rx
    }

    pub fn unregister(&self, server: &ServerId) {
        self.inboxes.remove(server);
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageSender for ChannelTransport {
    async fn send_to(&self, target: &ServerId, envelope: &Envelope) -> Result<(), HubError> {
        let Some(inbox) = self.inboxes.get(target) else {
            return Err(HubError::transport(format!("No inbox for {}", target)));
        };
        inbox
            .send(envelope.clone())
            .map_err(|_| HubError::transport(format!("Inbox for {} is closed", target)))
    }
}
