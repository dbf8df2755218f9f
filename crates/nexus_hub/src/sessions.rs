//! Conversation session registry.
//!
//! Multi-message conversations are correlated by a caller-chosen
//! transaction id. The registry keeps one session object per open
//! conversation, arms a one-shot timeout when the session opens, and
//! guarantees the timeout handler runs at most once: removal from the
//! session map is the single arbiter of the close-vs-timeout race, so
//! whichever side removes the entry wins and the other side does nothing.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use nexus_event_system::ServerId;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Errors raised by the session registry.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session with this transaction id is already open
    #[error("Transaction {0} already has an open session")]
    DuplicateTransaction(String),
}

/// One open conversation.
///
/// Concrete session types carry whatever per-conversation state their
/// command needs; the handler narrows back to the concrete type through
/// `as_any` at its single call site.
#[async_trait]
pub trait HubSession: Send + Sync {
    /// Server that opened the conversation.
    fn source_server(&self) -> &ServerId;

    fn as_any(&self) -> &dyn Any;

    /// Runs when the session expires without being closed.
    ///
    /// Called at most once, after the session has already been removed
    /// from the registry.
    async fn handle_timeout(&self, transaction_id: &str);
}

struct SessionEntry {
    session: Arc<dyn HubSession>,
    timer: JoinHandle<()>,
}

/// Keeps the open sessions and their expiry timers.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Opens a session for a transaction id and arms its expiry timer.
    ///
    /// A duplicate id is rejected and the original session stays
    /// authoritative; duplicated frames on the bus must never displace a
    /// conversation already in flight.
    pub fn open(
        &self,
        transaction_id: impl Into<String>,
        session: Arc<dyn HubSession>,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        let transaction_id = transaction_id.into();
        match self.sessions.entry(transaction_id.clone()) {
            Entry::Occupied(_) => {
                warn!(
                    "⚠️  Duplicate session open for transaction {}, keeping the original",
                    transaction_id
                );
                Err(SessionError::DuplicateTransaction(transaction_id))
            }
            Entry::Vacant(slot) => {
                // The timer is spawned while the shard entry is still
                // held, so its removal attempt cannot run before the
                // insert below completes.
                let sessions = self.sessions.clone();
                let timer_id = transaction_id.clone();
                let timer = tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    // Removal decides the race against close(): only the
                    // side that takes the entry out acts on the session.
                    if let Some((_, entry)) = sessions.remove(&timer_id) {
                        debug!("⏱️  Session {} timed out", timer_id);
                        entry.session.handle_timeout(&timer_id).await;
                    }
                });
                slot.insert(SessionEntry { session, timer });
                debug!("Opened session for transaction {}", transaction_id);
                Ok(())
            }
        }
    }

    /// Looks up the session for a transaction id, if still open.
    pub fn lookup(&self, transaction_id: &str) -> Option<Arc<dyn HubSession>> {
        self.sessions
            .get(transaction_id)
            .map(|entry| entry.session.clone())
    }

    /// Closes a session, disarming its timer. Idempotent: closing an
    /// unknown or already-closed id is a no-op.
    ///
    /// Returns whether a session was actually closed.
    pub fn close(&self, transaction_id: &str) -> bool {
        match self.sessions.remove(transaction_id) {
            Some((_, entry)) => {
                entry.timer.abort();
                debug!("Closed session for transaction {}", transaction_id);
                true
            }
            None => false,
        }
    }

    /// Number of currently open sessions.
    pub fn open_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
