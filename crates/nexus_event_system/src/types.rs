//! # Core Type Definitions
//!
//! Fundamental types shared by every component of the Nexus hub: player
//! identity, server identity and last-known world positions.
//!
//! ## Design Principles
//!
//! - **Type Safety**: Wrapper types prevent ID confusion (PlayerId vs ServerId)
//! - **Serialization**: All types support JSON serialization for bus transmission
//! - **Stability**: Identifiers are immutable once minted

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a player across the whole cluster.
///
/// This is a wrapper around UUID that provides type safety and ensures
/// player IDs cannot be confused with other kinds of IDs in the system.
///
/// # Examples
///
/// ```rust
/// use nexus_event_system::PlayerId;
///
/// // Mint a new random player ID
/// let player_id = PlayerId::new();
///
/// // Parse from the wire representation
/// let parsed: PlayerId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Creates a new random player ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::str::FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a connected server (frontend proxy or backend world server).
///
/// Server identities are operator-assigned strings, stable across restarts,
/// unlike the randomly minted [`PlayerId`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerId(pub String);

impl ServerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A player's last known position: world name plus three coordinates.
///
/// Uses double precision because world coordinates in large worlds lose
/// noticeable accuracy in single precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Name of the world the player was last seen in
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }
}
