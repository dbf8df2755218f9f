//! # Nexus Event System
//!
//! Type-safe, synchronous decision-event bus for the Nexus hub, plus the
//! extension (plugin) lifecycle plumbing built on top of it.
//!
//! ## Features
//!
//! - **Mutable events**: listeners receive `&mut T` and may rewrite the
//!   event in place, so later listeners and the broadcasting code observe
//!   the changes
//! - **Deterministic ordering**: listeners run synchronously in
//!   registration order, one at a time
//! - **Fault isolation**: a panicking or failing listener is logged and
//!   skipped; the remaining listeners still run
//! - **Explicit extensions**: plugins declare identity and dependencies
//!   through [`PluginDescriptor`], no reflection or scanning
//!
//! ## Quick Start
//!
//! ```rust
//! use nexus_event_system::{create_event_bus, PlayerLoginDecision, PLAYER_LOGIN_EVENT};
//! use nexus_event_system::{PlayerId, ServerId};
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = create_event_bus();
//!
//!     bus.on(PLAYER_LOGIN_EVENT, |decision: &mut PlayerLoginDecision| {
//!         decision.set_target(ServerId::new("lobby-1"), None);
//!         Ok(())
//!     })
//!     .await;
//!
//!     let mut decision = PlayerLoginDecision::new(PlayerId::new(), None, None, None);
//!     bus.broadcast(PLAYER_LOGIN_EVENT, &mut decision).await;
//!     assert!(!decision.is_cancelled());
//! }
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod bus;
pub mod events;
pub mod plugin;
pub mod types;

// ============================================================================
// Public Re-exports
// ============================================================================

pub use bus::{create_event_bus, BusEvent, EventBus, EventBusStats, EventError, TypedListener};
pub use events::{PlayerLoginDecision, PLAYER_LOGIN_EVENT};
pub use plugin::{NexusPlugin, PluginContext, PluginDescriptor, PluginError, PluginManager};
pub use types::{Location, PlayerId, ServerId};

/// Current time as milliseconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
