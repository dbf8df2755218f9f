//! Backend directory and login placement.
//!
//! Backends announce themselves through `server_status` frames. The
//! directory keeps the latest announcement per backend; the resolver
//! turns a player's last known location into the backend that should
//! receive them.

use dashmap::DashMap;
use nexus_event_system::{current_timestamp, Location, ServerId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Latest status announcement from one backend.
#[derive(Debug, Clone)]
pub struct BackendServer {
    pub id: ServerId,
    /// Whether the backend is accepting players
    pub live: bool,
    /// Worlds this backend hosts
    pub worlds: HashSet<String>,
    /// Milliseconds since epoch of the last announcement
    pub last_seen: u64,
}

/// Current view of the cluster's backends.
pub struct BackendDirectory {
    backends: DashMap<ServerId, BackendServer>,
}

impl BackendDirectory {
    pub fn new() -> Self {
        Self {
            backends: DashMap::new(),
        }
    }

    /// Records a status announcement, replacing any previous one.
    pub fn update(&self, id: ServerId, live: bool, worlds: HashSet<String>) {
        info!(
            "🗺️  Backend {} is {} hosting {:?}",
            id,
            if live { "live," } else { "down," },
            worlds
        );
        self.backends.insert(
            id.clone(),
            BackendServer {
                id,
                live,
                worlds,
                last_seen: current_timestamp(),
            },
        );
    }

    pub fn get(&self, id: &ServerId) -> Option<BackendServer> {
        self.backends.get(id).map(|b| b.clone())
    }

    /// Live backends hosting the named world, sorted by id so placement
    /// is deterministic.
    pub fn live_hosts(&self, world: &str) -> Vec<ServerId> {
        let mut hosts: Vec<ServerId> = self
            .backends
            .iter()
            .filter(|b| b.live && b.worlds.contains(world))
            .map(|b| b.id.clone())
            .collect();
        hosts.sort();
        hosts
    }

    pub fn is_live(&self, id: &ServerId) -> bool {
        self.backends.get(id).map(|b| b.live).unwrap_or(false)
    }

    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }
}

impl Default for BackendDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// Chooses the backend a login should land on.
pub struct PlacementResolver {
    directory: Arc<BackendDirectory>,
    default_server: Option<ServerId>,
}

impl PlacementResolver {
    pub fn new(directory: Arc<BackendDirectory>, default_server: Option<ServerId>) -> Self {
        Self {
            directory,
            default_server,
        }
    }

    /// Resolves a placement target.
    ///
    /// Prefers a live backend hosting the world of the player's last
    /// location; falls back to the configured default if it is live;
    /// otherwise returns `None` and the caller rejects the login
    /// explicitly rather than guessing.
    pub fn resolve(&self, location: Option<&Location>) -> Option<ServerId> {
        if let Some(location) = location {
            if let Some(host) = self.directory.live_hosts(&location.world).into_iter().next() {
                return Some(host);
            }
        }
        match &self.default_server {
            Some(default) if self.directory.is_live(default) => Some(default.clone()),
            _ => None,
        }
    }
}
