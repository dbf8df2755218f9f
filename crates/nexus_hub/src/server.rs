//! Hub orchestration.
//!
//! [`HubServer`] wires the store, session registry, event bus, backend
//! directory and command set into one dispatcher and pumps inbound
//! frames through it, one tokio task per envelope. Ordering guarantees
//! come from the store's per-player lock, never from the pump.

use crate::config::HubConfig;
use crate::dispatch::{CommandDispatcher, HubCommand, HubContext};
use crate::envelope::Envelope;
use crate::handlers;
use crate::ownership::OwnershipStore;
use crate::placement::{BackendDirectory, PlacementResolver};
use crate::sessions::SessionRegistry;
use crate::transport::{BroadcastInterestTracker, MessageSender};
use nexus_event_system::{EventBus, ServerId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// Counters for operational visibility.
#[derive(Debug, Default)]
pub struct HubStats {
    pub frames_received: AtomicU64,
    pub frames_rejected: AtomicU64,
}

/// The assembled hub.
pub struct HubServer {
    dispatcher: Arc<CommandDispatcher>,
    stats: Arc<HubStats>,
    hub_name: String,
}

impl HubServer {
    /// Builds a hub with the full built-in command set registered.
    pub fn new(
        config: &HubConfig,
        store: Arc<dyn OwnershipStore>,
        sender: Arc<dyn MessageSender>,
        events: Arc<EventBus>,
    ) -> Self {
        let directory = Arc::new(BackendDirectory::new());
        let placement = Arc::new(PlacementResolver::new(
            directory.clone(),
            config.default_server.clone().map(ServerId::new),
        ));
        let ctx = Arc::new(HubContext {
            hub_name: config.hub_name.clone(),
            store,
            sessions: SessionRegistry::new(),
            sender,
            broadcasts: Arc::new(BroadcastInterestTracker::new()),
            events,
            directory,
            placement,
            session_timeout: config.session_timeout(),
        });

        let mut dispatcher = CommandDispatcher::new(ctx);
        handlers::register_all(&mut dispatcher);

        Self {
            dispatcher: Arc::new(dispatcher),
            stats: Arc::new(HubStats::default()),
            hub_name: config.hub_name.clone(),
        }
    }

    /// Builds a hub with custom commands instead of the built-in set.
    pub fn with_commands(
        config: &HubConfig,
        ctx: Arc<HubContext>,
        commands: Vec<Arc<dyn HubCommand>>,
    ) -> Self {
        let mut dispatcher = CommandDispatcher::new(ctx);
        for command in commands {
            dispatcher.register(command);
        }
        Self {
            dispatcher: Arc::new(dispatcher),
            stats: Arc::new(HubStats::default()),
            hub_name: config.hub_name.clone(),
        }
    }

    pub fn context(&self) -> Arc<HubContext> {
        self.dispatcher.context()
    }

    pub fn stats(&self) -> Arc<HubStats> {
        self.stats.clone()
    }

    /// Pumps frames until the inbound channel closes or shutdown fires.
    ///
    /// Each decoded envelope is dispatched on its own task; a slow
    /// conversation never blocks the pump.
    pub async fn run(
        &self,
        mut inbound: mpsc::UnboundedReceiver<Vec<u8>>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        info!("🚀 Hub {} accepting traffic", self.hub_name);
        loop {
            tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(bytes) => self.ingest(bytes),
                    None => {
                        info!("Inbound channel closed");
                        break;
                    }
                },
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }
        info!("✅ Hub {} stopped", self.hub_name);
    }

    /// Decodes one frame and spawns its dispatch.
    pub fn ingest(&self, bytes: Vec<u8>) {
        self.stats.frames_received.fetch_add(1, Ordering::Relaxed);
        match Envelope::decode(&bytes) {
            Ok(envelope) => {
                let dispatcher = self.dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher.dispatch(envelope).await;
                });
            }
            Err(e) => {
                self.stats.frames_rejected.fetch_add(1, Ordering::Relaxed);
                warn!("⚠️  Dropping undecodable frame: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ownership::MemoryOwnershipStore;
    use crate::transport::ChannelTransport;
    use nexus_event_system::create_event_bus;
    use std::time::Duration;

    fn hub(transport: Arc<ChannelTransport>) -> HubServer {
        HubServer::new(
            &HubConfig::default(),
            Arc::new(MemoryOwnershipStore::new()),
            transport,
            create_event_bus(),
        )
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let transport = Arc::new(ChannelTransport::new());
        let server = Arc::new(hub(transport));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let runner = {
            let server = server.clone();
            tokio::spawn(async move { server.run(inbound_rx, shutdown_rx).await })
        };
        shutdown_tx.send(()).ok();
        tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .expect("run did not stop")
            .unwrap();
        drop(inbound_tx);
    }

    #[tokio::test]
    async fn undecodable_frames_are_counted_and_dropped() {
        let transport = Arc::new(ChannelTransport::new());
        let server = hub(transport);

        server.ingest(b"not json".to_vec());
        assert_eq!(server.stats.frames_received.load(Ordering::Relaxed), 1);
        assert_eq!(server.stats.frames_rejected.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn ingested_frames_reach_their_handler() {
        let transport = Arc::new(ChannelTransport::new());
        let mut inbox = transport.register(ServerId::new("world-1"));
        let server = hub(transport);

        let frame = Envelope::new("prepare_login", "tx-1", "world-1")
            .with_field("player", nexus_event_system::PlayerId::new().to_string())
            .encode()
            .unwrap();
        server.ingest(frame);

        let reply = tokio::time::timeout(Duration::from_secs(1), inbox.recv())
            .await
            .expect("no reply")
            .unwrap();
        assert_eq!(reply.command, "prepare_result");
        assert_eq!(reply.bool_field("fresh").unwrap(), true);
    }
}
