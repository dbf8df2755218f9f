//! The synchronous, cancellable event bus.
//!
//! Unlike a fire-and-forget pub/sub system, this bus exists so that policy
//! extensions can *influence* a decision before the publisher acts on it:
//! every listener receives mutable access to the event, listeners run one
//! after another in registration order, and the publisher does not proceed
//! until the last listener has returned. The publisher then reads the
//! (possibly rewritten) event back and acts on its final state.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Errors that can occur during event bus operations.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// A listener was invoked with an event of a type it does not expect
    #[error("Event type mismatch for listener {0}")]
    TypeMismatch(String),
    /// Listener execution failed while processing an event
    #[error("Listener execution error: {0}")]
    ListenerExecution(String),
}

/// Marker trait for values that can travel over the bus.
///
/// Events are plain in-process values; they are never serialized. The only
/// requirements are dynamic typing support (for the single downcast inside
/// the typed listener wrapper) and thread safety.
pub trait BusEvent: Send + Sync + Any + std::fmt::Debug {
    /// Returns a reference to this event as `&dyn Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns a mutable reference for listeners that rewrite the event.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> BusEvent for T
where
    T: Send + Sync + Any + std::fmt::Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Type-erased listener interface stored by the bus.
///
/// Most code never implements this directly; [`TypedListener`] bridges a
/// plain closure over a concrete event type to this trait.
pub trait EventListener: Send + Sync {
    /// Handles one event, with mutable access to it.
    fn handle(&self, event: &mut dyn BusEvent) -> Result<(), EventError>;

    /// The event type this listener expects, used for the downcast check.
    fn expected_type_id(&self) -> TypeId;

    /// Human-readable name for logging.
    fn listener_name(&self) -> &str;
}

/// Type-safe wrapper binding a closure over a concrete event type to the
/// type-erased [`EventListener`] interface.
pub struct TypedListener<T, F>
where
    T: BusEvent,
    F: Fn(&mut T) -> Result<(), EventError> + Send + Sync,
{
    listener: F,
    name: String,
    _phantom: std::marker::PhantomData<fn(&mut T)>,
}

impl<T, F> TypedListener<T, F>
where
    T: BusEvent,
    F: Fn(&mut T) -> Result<(), EventError> + Send + Sync,
{
    pub fn new(name: String, listener: F) -> Self {
        Self {
            listener,
            name,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F> EventListener for TypedListener<T, F>
where
    T: BusEvent + 'static,
    F: Fn(&mut T) -> Result<(), EventError> + Send + Sync,
{
    fn handle(&self, event: &mut dyn BusEvent) -> Result<(), EventError> {
        let event = event
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| EventError::TypeMismatch(self.name.clone()))?;
        (self.listener)(event)
    }

    fn expected_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn listener_name(&self) -> &str {
        &self.name
    }
}

/// Statistics about bus usage, for monitoring.
#[derive(Debug, Clone, Default)]
pub struct EventBusStats {
    /// Number of listeners currently registered across all event names
    pub total_listeners: usize,
    /// Number of events broadcast since startup
    pub events_broadcast: u64,
    /// Number of listener invocations that returned an error
    pub listener_faults: u64,
}

/// The cancellable decision-event bus.
///
/// Listener lists are keyed by event name and preserve registration order.
/// The lists are only mutated at extension activation/deactivation time, so
/// the read lock taken during a broadcast is effectively uncontended.
///
/// # Fault Isolation
///
/// A listener that returns an error or panics is logged and counted but
/// never stops delivery to the remaining listeners, and never aborts the
/// publishing operation itself.
pub struct EventBus {
    /// Map of event names to their listeners, in registration order
    listeners: RwLock<HashMap<String, Vec<Arc<dyn EventListener>>>>,
    /// Usage statistics for monitoring
    stats: RwLock<EventBusStats>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &"[listeners]")
            .finish()
    }
}

impl EventBus {
    /// Creates a new bus with no registered listeners.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            stats: RwLock::new(EventBusStats::default()),
        }
    }

    /// Registers a listener for the named event.
    ///
    /// Listeners run in registration order on every broadcast of that event
    /// name, each with mutable access to the event value.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// events.on("player_login", |decision: &mut PlayerLoginDecision| {
    ///     if maintenance_mode {
    ///         decision.deny("The cluster is down for maintenance");
    ///     }
    ///     Ok(())
    /// }).await;
    /// ```
    pub async fn on<T, F>(&self, event_name: &str, listener: F)
    where
        T: BusEvent + 'static,
        F: Fn(&mut T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let listener_name = format!("{}::{}", event_name, std::any::type_name::<T>());
        let typed = TypedListener::new(listener_name, listener);
        let listener_arc: Arc<dyn EventListener> = Arc::new(typed);

        let mut listeners = self.listeners.write().await;
        listeners
            .entry(event_name.to_string())
            .or_default()
            .push(listener_arc);

        let mut stats = self.stats.write().await;
        stats.total_listeners += 1;

        info!("📝 Registered listener for {}", event_name);
    }

    /// Broadcasts an event to every registered listener, in registration
    /// order, then returns control to the publisher.
    ///
    /// The publisher is expected to inspect the final state of `event`
    /// after this call: listeners may have overwritten the outcome or
    /// marked it cancelled. Listener faults are isolated per listener.
    pub async fn broadcast<T>(&self, event_name: &str, event: &mut T)
    where
        T: BusEvent + 'static,
    {
        let listeners = self.listeners.read().await;

        let Some(event_listeners) = listeners.get(event_name) else {
            debug!("No listeners for event: {}", event_name);
            return;
        };

        debug!(
            "📤 Broadcasting {} to {} listeners",
            event_name,
            event_listeners.len()
        );

        let mut faults = 0u64;
        for listener in event_listeners {
            // A torn event after a panic is the listener's problem, not
            // ours; the remaining listeners still get their turn
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.handle(event)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("❌ Listener {} failed: {}", listener.listener_name(), e);
                    faults += 1;
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(
                        "❌ Listener {} panicked: {}",
                        listener.listener_name(),
                        message
                    );
                    faults += 1;
                }
            }
        }
        drop(listeners);

        let mut stats = self.stats.write().await;
        stats.events_broadcast += 1;
        stats.listener_faults += faults;
        if faults > 0 {
            warn!(
                "⚠️ {} listener(s) faulted while delivering {}",
                faults, event_name
            );
        }
    }

    /// Returns current bus statistics.
    pub async fn get_stats(&self) -> EventBusStats {
        self.stats.read().await.clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates a new shared event bus instance.
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Counter {
        value: u64,
        trail: Vec<&'static str>,
    }

    #[tokio::test]
    async fn listeners_run_in_registration_order() {
        let bus = EventBus::new();
        bus.on("count", |e: &mut Counter| {
            e.trail.push("first");
            e.value += 1;
            Ok(())
        })
        .await;
        bus.on("count", |e: &mut Counter| {
            e.trail.push("second");
            e.value *= 10;
            Ok(())
        })
        .await;

        let mut event = Counter {
            value: 1,
            trail: Vec::new(),
        };
        bus.broadcast("count", &mut event).await;

        // (1 + 1) * 10 proves ordering, not just delivery
        assert_eq!(event.value, 20);
        assert_eq!(event.trail, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn faulting_listener_does_not_stop_delivery() {
        let bus = EventBus::new();
        let reached = Arc::new(AtomicUsize::new(0));

        bus.on("count", |_: &mut Counter| {
            Err(EventError::ListenerExecution("boom".to_string()))
        })
        .await;
        let reached_clone = reached.clone();
        bus.on("count", move |e: &mut Counter| {
            reached_clone.fetch_add(1, Ordering::SeqCst);
            e.value += 1;
            Ok(())
        })
        .await;

        let mut event = Counter {
            value: 0,
            trail: Vec::new(),
        };
        bus.broadcast("count", &mut event).await;

        assert_eq!(reached.load(Ordering::SeqCst), 1);
        assert_eq!(event.value, 1);
        assert_eq!(bus.get_stats().await.listener_faults, 1);
    }

    #[tokio::test]
    async fn panicking_listener_does_not_stop_delivery() {
        let bus = EventBus::new();
        let reached = Arc::new(AtomicUsize::new(0));

        bus.on("count", |_: &mut Counter| -> Result<(), EventError> {
            panic!("listener blew up");
        })
        .await;
        let reached_clone = reached.clone();
        bus.on("count", move |e: &mut Counter| {
            reached_clone.fetch_add(1, Ordering::SeqCst);
            e.value += 1;
            Ok(())
        })
        .await;

        let mut event = Counter {
            value: 0,
            trail: Vec::new(),
        };
        bus.broadcast("count", &mut event).await;

        assert_eq!(reached.load(Ordering::SeqCst), 1);
        assert_eq!(event.value, 1);
        assert_eq!(bus.get_stats().await.listener_faults, 1);
    }

    #[tokio::test]
    async fn broadcast_without_listeners_is_a_no_op() {
        let bus = EventBus::new();
        let mut event = Counter {
            value: 7,
            trail: Vec::new(),
        };
        bus.broadcast("nobody_home", &mut event).await;
        assert_eq!(event.value, 7);
    }

    #[tokio::test]
    async fn listeners_are_scoped_to_their_event_name() {
        let bus = EventBus::new();
        bus.on("a", |e: &mut Counter| {
            e.value += 1;
            Ok(())
        })
        .await;

        let mut event = Counter {
            value: 0,
            trail: Vec::new(),
        };
        bus.broadcast("b", &mut event).await;
        assert_eq!(event.value, 0);

        bus.broadcast("a", &mut event).await;
        assert_eq!(event.value, 1);
    }
}
