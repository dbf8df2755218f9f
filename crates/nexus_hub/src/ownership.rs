//! Authoritative player-ownership store.
//!
//! At most one backend server may hold a player's saved state checked out
//! at any instant. The store enforces this with a per-player lock held
//! only for the duration of each call, never across messages: message
//! order on the bus is untrusted, the lock is the sole arbiter.
//!
//! Saved state is an opaque blob. The zero-length blob is reserved as the
//! fresh sentinel, the wire-level answer for "this player has never been
//! saved", so commits of an empty blob are rejected outright.

use async_trait::async_trait;
use dashmap::DashMap;
use nexus_event_system::{Location, PlayerId, ServerId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Errors surfaced by an ownership store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A commit tried to write the reserved zero-length blob
    #[error("Empty state blobs are reserved as the fresh sentinel")]
    ReservedSentinel,
    /// The backing store is unreachable; callers must fail closed
    #[error("Ownership store unavailable: {0}")]
    Unavailable(String),
}

/// Result of [`OwnershipStore::prepare_login`].
#[derive(Debug, Clone, PartialEq)]
pub enum PrepareOutcome {
    /// Player has never been saved; the requester now owns the record
    Fresh,
    /// Stored state, returned verbatim; the requester now owns the record
    Existing(Vec<u8>),
    /// Another server holds the player; the record was not touched
    AlreadyOwned(ServerId),
}

/// Result of [`OwnershipStore::commit_save`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// State and location stored, ownership released
    Committed,
    /// No server had the player checked out
    NotPrepared,
    /// A different server has the player checked out
    OwnershipMismatch(ServerId),
}

/// One player's stored state.
///
/// `owner` is `Some` exactly while a backend has the player checked out.
#[derive(Debug, Default)]
struct OwnershipRecord {
    data: Option<Vec<u8>>,
    owner: Option<ServerId>,
    location: Option<Location>,
}

/// Storage backend for player ownership.
///
/// The semantics are the contract; implementations may keep records in
/// memory or in a database, but every call must hold the per-player lock
/// for the duration of that call only.
#[async_trait]
pub trait OwnershipStore: Send + Sync {
    /// Checks a player's state out to `server`.
    async fn prepare_login(
        &self,
        player: PlayerId,
        server: &ServerId,
    ) -> Result<PrepareOutcome, StoreError>;

    /// Writes back a player's state and releases ownership.
    ///
    /// Succeeds only when `server` is the current owner. `data` must be
    /// non-empty.
    async fn commit_save(
        &self,
        player: PlayerId,
        server: &ServerId,
        data: Vec<u8>,
        location: Location,
    ) -> Result<CommitOutcome, StoreError>;

    /// Last committed location, if any. Read-only; never blocks a
    /// concurrent prepare or commit for long.
    async fn query_location(&self, player: PlayerId) -> Result<Option<Location>, StoreError>;
}

/// In-memory ownership store used by the standalone hub and tests.
///
/// Records live in a sharded map; each record carries its own async mutex
/// so operations on distinct players never serialize against each other.
pub struct MemoryOwnershipStore {
    records: DashMap<PlayerId, Arc<Mutex<OwnershipRecord>>>,
}

impl MemoryOwnershipStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Fetches or creates the locked record for a player.
    ///
    /// The shard lock is released before the record mutex is taken, so a
    /// slow operation on one player never stalls the map.
    fn record(&self, player: PlayerId) -> Arc<Mutex<OwnershipRecord>> {
        self.records
            .entry(player)
            .or_insert_with(|| Arc::new(Mutex::new(OwnershipRecord::default())))
            .clone()
    }

    /// Number of players with a record, owned or not.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl Default for MemoryOwnershipStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OwnershipStore for MemoryOwnershipStore {
    async fn prepare_login(
        &self,
        player: PlayerId,
        server: &ServerId,
    ) -> Result<PrepareOutcome, StoreError> {
        let record = self.record(player);
        let mut record = record.lock().await;

        if let Some(owner) = &record.owner {
            debug!("Prepare for {} denied, owned by {}", player, owner);
            return Ok(PrepareOutcome::AlreadyOwned(owner.clone()));
        }

        record.owner = Some(server.clone());
        match &record.data {
            None => {
                debug!("Prepare for {} by {}: fresh player", player, server);
                Ok(PrepareOutcome::Fresh)
            }
            Some(data) => {
                debug!(
                    "Prepare for {} by {}: {} byte snapshot",
                    player,
                    server,
                    data.len()
                );
                Ok(PrepareOutcome::Existing(data.clone()))
            }
        }
    }

    async fn commit_save(
        &self,
        player: PlayerId,
        server: &ServerId,
        data: Vec<u8>,
        location: Location,
    ) -> Result<CommitOutcome, StoreError> {
        if data.is_empty() {
            return Err(StoreError::ReservedSentinel);
        }

        let record = self.record(player);
        let mut record = record.lock().await;

        match &record.owner {
            None => Ok(CommitOutcome::NotPrepared),
            Some(owner) if owner != server => {
                Ok(CommitOutcome::OwnershipMismatch(owner.clone()))
            }
            Some(_) => {
                record.data = Some(data);
                record.location = Some(location);
                record.owner = None;
                debug!("Committed save for {} from {}", player, server);
                Ok(CommitOutcome::Committed)
            }
        }
    }

    async fn query_location(&self, player: PlayerId) -> Result<Option<Location>, StoreError> {
        let Some(record) = self.records.get(&player).map(|r| r.clone()) else {
            return Ok(None);
        };
        let record = record.lock().await;
        Ok(record.location.clone())
    }
}
