//! # Nexus Hub
//!
//! Coordination hub for a multiplayer game-server cluster. Frontend
//! proxies accept player connections, backend world servers run
//! gameplay, and the hub owns the one piece of state that keeps them
//! honest: which backend currently holds each player's saved state.
//!
//! The message bus between servers is unordered, at-least-once and free
//! to duplicate, so nothing here trusts message order. The single-owner
//! guarantee comes entirely from the ownership store's per-player lock.
//!
//! ## Architecture
//!
//! - [`ownership`] — locked player-state store (`prepare_login` /
//!   `commit_save` / `query_location`)
//! - [`sessions`] — transaction-correlated conversation sessions with
//!   exactly-once timeout handling
//! - [`dispatch`] — command routing, per-conversation session lifecycle
//! - [`handlers`] — the wire command set
//! - [`placement`] — backend directory and login placement
//! - [`transport`] — outbound delivery seam plus fan-out interest
//!   tracking
//! - [`server`] — the assembled hub and its frame pump

pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod ownership;
pub mod placement;
pub mod server;
pub mod sessions;
pub mod transport;

pub use config::HubConfig;
pub use dispatch::{CommandDispatcher, HubCommand, HubContext};
pub use envelope::{Envelope, PayloadError};
pub use error::HubError;
pub use ownership::{
    CommitOutcome, MemoryOwnershipStore, OwnershipStore, PrepareOutcome, StoreError,
};
pub use placement::{BackendDirectory, BackendServer, PlacementResolver};
pub use server::{HubServer, HubStats};
pub use sessions::{HubSession, SessionError, SessionRegistry};
pub use transport::{BroadcastInterestTracker, ChannelTransport, MessageSender};

#[cfg(test)]
mod tests {
    //! End-to-end conversations over the in-process transport.

    use super::*;
    use nexus_event_system::{
        create_event_bus, PlayerId, PlayerLoginDecision, ServerId, PLAYER_LOGIN_EVENT,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        server: HubServer,
        transport: Arc<ChannelTransport>,
    }

    impl Harness {
        fn new() -> Self {
            let transport = Arc::new(ChannelTransport::new());
            let server = HubServer::new(
                &HubConfig {
                    default_server: Some("world-1".to_string()),
                    ..Default::default()
                },
                Arc::new(MemoryOwnershipStore::new()),
                transport.clone(),
                create_event_bus(),
            );
            Self { server, transport }
        }

        fn inbox(&self, name: &str) -> mpsc::UnboundedReceiver<Envelope> {
            self.transport.register(ServerId::new(name))
        }

        fn send(&self, envelope: Envelope) {
            self.server.ingest(envelope.encode().unwrap());
        }

        async fn recv(&self, inbox: &mut mpsc::UnboundedReceiver<Envelope>) -> Envelope {
            tokio::time::timeout(Duration::from_secs(1), inbox.recv())
                .await
                .expect("no reply within deadline")
                .expect("inbox closed")
        }

        /// Announces a live backend hosting the given worlds.
        fn announce(&self, name: &str, worlds: &[&str]) {
            self.send(
                Envelope::new("server_status", format!("status-{}", name), name)
                    .with_field("live", true)
                    .with_field(
                        "worlds",
                        worlds.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
                    ),
            );
        }
    }

    fn overworld_spot() -> nexus_event_system::Location {
        nexus_event_system::Location {
            world: "overworld".to_string(),
            x: 100.0,
            y: 64.0,
            z: -40.0,
        }
    }

    #[tokio::test]
    async fn fresh_player_full_login_and_logout_cycle() {
        let harness = Harness::new();
        let mut proxy = harness.inbox("proxy-1");
        let mut world = harness.inbox("world-1");
        let player = PlayerId::new();

        harness.announce("world-1", &["overworld"]);
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Frontend asks where the player should go
        harness.send(
            Envelope::new("login_request", "tx-login", "proxy-1")
                .with_field("player", player.to_string())
                .with_field("ip", "203.0.113.7"),
        );
        let reply = harness.recv(&mut proxy).await;
        assert_eq!(reply.command, "login_confirmed");
        assert_eq!(reply.str_field("target").unwrap(), "world-1");

        // The chosen backend checks the player out: fresh sentinel
        harness.send(
            Envelope::new("prepare_login", "tx-prep", "world-1")
                .with_field("player", player.to_string()),
        );
        let reply = harness.recv(&mut world).await;
        assert_eq!(reply.command, "prepare_result");
        assert!(reply.bool_field("fresh").unwrap());
        assert!(reply.blob_field("data").unwrap().is_empty());

        // Logout: the backend writes the state back
        harness.send(
            Envelope::new("commit_save", "tx-save", "world-1")
                .with_field("player", player.to_string())
                .with_blob("data", b"level 3, 12 hearts")
                .with_location("location", &overworld_spot()),
        );
        let reply = harness.recv(&mut world).await;
        assert_eq!(reply.command, "save_confirmed");

        // Next login sees the committed blob, not the fresh sentinel
        harness.send(
            Envelope::new("prepare_login", "tx-prep-2", "world-1")
                .with_field("player", player.to_string()),
        );
        let reply = harness.recv(&mut world).await;
        assert_eq!(reply.command, "prepare_result");
        assert!(!reply.bool_field("fresh").unwrap());
        assert_eq!(reply.blob_field("data").unwrap(), b"level 3, 12 hearts");
    }

    #[tokio::test]
    async fn second_backend_is_refused_while_player_is_checked_out() {
        let harness = Harness::new();
        let mut world_1 = harness.inbox("world-1");
        let mut world_2 = harness.inbox("world-2");
        let player = PlayerId::new();

        harness.send(
            Envelope::new("prepare_login", "tx-a", "world-1")
                .with_field("player", player.to_string()),
        );
        assert_eq!(harness.recv(&mut world_1).await.command, "prepare_result");

        harness.send(
            Envelope::new("prepare_login", "tx-b", "world-2")
                .with_field("player", player.to_string()),
        );
        let reply = harness.recv(&mut world_2).await;
        assert_eq!(reply.command, "prepare_rejected");
        assert!(reply.str_field("reason").unwrap().contains("world-1"));
    }

    #[tokio::test]
    async fn stale_save_is_rejected_explicitly() {
        let harness = Harness::new();
        let mut world_2 = harness.inbox("world-2");
        let player = PlayerId::new();

        // world-2 never prepared this player
        harness.send(
            Envelope::new("commit_save", "tx-stale", "world-2")
                .with_field("player", player.to_string())
                .with_blob("data", b"stale snapshot")
                .with_location("location", &overworld_spot()),
        );
        let reply = harness.recv(&mut world_2).await;
        assert_eq!(reply.command, "save_rejected");
        assert_eq!(
            reply.str_field("reason").unwrap(),
            "Player is not checked out"
        );
    }

    #[tokio::test]
    async fn location_query_follows_the_last_commit() {
        let harness = Harness::new();
        let mut world = harness.inbox("world-1");
        let mut proxy = harness.inbox("proxy-1");
        let player = PlayerId::new();

        // Before any commit the location is unknown
        harness.send(
            Envelope::new("location_query", "tx-q1", "proxy-1")
                .with_field("player", player.to_string()),
        );
        let reply = harness.recv(&mut proxy).await;
        assert_eq!(reply.command, "location_result");
        assert!(!reply.bool_field("found").unwrap());

        harness.send(
            Envelope::new("prepare_login", "tx-p", "world-1")
                .with_field("player", player.to_string()),
        );
        harness.recv(&mut world).await;
        harness.send(
            Envelope::new("commit_save", "tx-s", "world-1")
                .with_field("player", player.to_string())
                .with_blob("data", b"snapshot")
                .with_location("location", &overworld_spot()),
        );
        harness.recv(&mut world).await;

        harness.send(
            Envelope::new("location_query", "tx-q2", "proxy-1")
                .with_field("player", player.to_string()),
        );
        let reply = harness.recv(&mut proxy).await;
        assert!(reply.bool_field("found").unwrap());
        assert_eq!(
            reply.location_field("location").unwrap(),
            overworld_spot()
        );
    }

    #[tokio::test]
    async fn returning_player_routes_to_the_backend_hosting_their_world() {
        let harness = Harness::new();
        let mut proxy = harness.inbox("proxy-1");
        let mut nether_host = harness.inbox("world-9");
        let player = PlayerId::new();

        harness.announce("world-1", &["overworld"]);
        harness.announce("world-9", &["nether"]);
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Commit the player into the nether from its host
        harness.send(
            Envelope::new("prepare_login", "tx-p", "world-9")
                .with_field("player", player.to_string()),
        );
        harness.recv(&mut nether_host).await;
        harness.send(
            Envelope::new("commit_save", "tx-s", "world-9")
                .with_field("player", player.to_string())
                .with_blob("data", b"snapshot")
                .with_location(
                    "location",
                    &nexus_event_system::Location {
                        world: "nether".to_string(),
                        x: 3.0,
                        y: 40.0,
                        z: 3.0,
                    },
                ),
        );
        harness.recv(&mut nether_host).await;

        harness.send(
            Envelope::new("login_request", "tx-login", "proxy-1")
                .with_field("player", player.to_string()),
        );
        let reply = harness.recv(&mut proxy).await;
        assert_eq!(reply.command, "login_confirmed");
        assert_eq!(reply.str_field("target").unwrap(), "world-9");
    }

    #[tokio::test]
    async fn unparseable_ip_does_not_sink_the_login() {
        let harness = Harness::new();
        let mut proxy = harness.inbox("proxy-1");

        harness.announce("world-1", &["overworld"]);
        tokio::time::sleep(Duration::from_millis(20)).await;

        harness.send(
            Envelope::new("login_request", "tx-login", "proxy-1")
                .with_field("player", PlayerId::new().to_string())
                .with_field("ip", "definitely.not.an.ip"),
        );
        let reply = harness.recv(&mut proxy).await;
        assert_eq!(reply.command, "login_confirmed");
        assert_eq!(reply.str_field("target").unwrap(), "world-1");
    }

    #[tokio::test]
    async fn login_with_no_live_backend_is_rejected() {
        let harness = Harness::new();
        let mut proxy = harness.inbox("proxy-1");

        // Default server configured but never announced
        harness.send(
            Envelope::new("login_request", "tx-login", "proxy-1")
                .with_field("player", PlayerId::new().to_string()),
        );
        let reply = harness.recv(&mut proxy).await;
        assert_eq!(reply.command, "login_rejected");
        assert_eq!(reply.str_field("reason").unwrap(), "No target found");
    }

    #[tokio::test]
    async fn policy_listener_can_veto_a_login() {
        let transport = Arc::new(ChannelTransport::new());
        let events = create_event_bus();
        events
            .on(PLAYER_LOGIN_EVENT, |decision: &mut PlayerLoginDecision| {
                decision.deny("Server is in maintenance");
                Ok(())
            })
            .await;

        let server = HubServer::new(
            &HubConfig {
                default_server: Some("world-1".to_string()),
                ..Default::default()
            },
            Arc::new(MemoryOwnershipStore::new()),
            transport.clone(),
            events,
        );
        let harness = Harness { server, transport };
        let mut proxy = harness.inbox("proxy-1");

        harness.announce("world-1", &["overworld"]);
        tokio::time::sleep(Duration::from_millis(20)).await;

        harness.send(
            Envelope::new("login_request", "tx-login", "proxy-1")
                .with_field("player", PlayerId::new().to_string()),
        );
        let reply = harness.recv(&mut proxy).await;
        assert_eq!(reply.command, "login_rejected");
        assert_eq!(
            reply.str_field("reason").unwrap(),
            "Server is in maintenance"
        );
    }

    #[tokio::test]
    async fn status_changes_fan_out_to_subscribers() {
        let harness = Harness::new();
        let mut proxy = harness.inbox("proxy-1");

        // The proxy subscribes by announcing itself
        harness.send(
            Envelope::new("server_status", "tx-sub", "proxy-1")
                .with_field("live", true)
                .with_field("worlds", Vec::<String>::new())
                .with_field("subscribe", vec!["server_status_changed"]),
        );
        // Its own announcement fans out first
        let own = harness.recv(&mut proxy).await;
        assert_eq!(own.command, "server_status_changed");
        assert_eq!(own.str_field("server").unwrap(), "proxy-1");

        harness.announce("world-1", &["overworld"]);
        let notice = harness.recv(&mut proxy).await;
        assert_eq!(notice.command, "server_status_changed");
        assert_eq!(notice.str_field("server").unwrap(), "world-1");
        assert!(notice.bool_field("live").unwrap());
    }
}
