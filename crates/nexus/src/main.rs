//! Main application entry point for the Nexus hub.
//!
//! Provides CLI parsing, configuration loading, logging setup and the
//! hub run loop with graceful shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nexus_event_system::{create_event_bus, EventBus, PluginManager};
use nexus_hub::{ChannelTransport, HubServer, MemoryOwnershipStore};
use plugin_maintenance::MaintenancePlugin;

mod cli;
mod config;
mod signals;

use cli::CliArgs;
use config::{AppConfig, LoggingSettings};

// ============================================================================
// Logging Setup
// ============================================================================

/// Initialize logging system
fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if json_format || config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .init();
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

// ============================================================================
// Application
// ============================================================================

/// The assembled hub application.
pub struct Application {
    config: AppConfig,
    server: Arc<HubServer>,
    plugins: PluginManager,
    events: Arc<EventBus>,
    inbound_tx: mpsc::UnboundedSender<Vec<u8>>,
    inbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Application {
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        // Configuration first, so CLI overrides land before validation
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(hub_name) = args.hub_name {
            config.hub.hub_name = hub_name;
        }
        if let Some(default_server) = args.default_server {
            config.hub.default_server = Some(default_server);
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {}", e).into());
        }

        setup_logging(&config.logging, config.logging.json_format)?;

        let events = create_event_bus();
        let transport = Arc::new(ChannelTransport::new());
        let server = Arc::new(HubServer::new(
            &config.hub,
            Arc::new(MemoryOwnershipStore::new()),
            transport,
            events.clone(),
        ));

        let plugins = PluginManager::new(
            events.clone(),
            PathBuf::from(&config.plugins.data_directory),
        );
        plugins
            .register(
                Box::new(MaintenancePlugin::new()),
                config.plugin_options("maintenance"),
            )
            .await?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        info!("🚀 Nexus Hub v0.1.0");
        info!(
            "📂 Config: {} | Hub name: {} | Default server: {}",
            args.config_path.display(),
            config.hub.hub_name,
            config.hub.default_server.as_deref().unwrap_or("(none)")
        );

        Ok(Self {
            config,
            server,
            plugins,
            events,
            inbound_tx,
            inbound_rx,
        })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Nexus Hub");
        info!("📋 Configuration Summary:");
        info!("  🏷️  Hub name: {}", self.config.hub.hub_name);
        info!(
            "  ⏱️  Session timeout: {}ms",
            self.config.hub.session_timeout_ms
        );
        info!(
            "  🗺️  Default server: {}",
            self.config.hub.default_server.as_deref().unwrap_or("(none)")
        );

        let activated = self.plugins.activate_all().await;
        info!("🔌 Extensions active: {:?}", activated);

        let bus_stats = self.events.get_stats().await;
        info!(
            "📊 Event bus: {} listeners registered",
            bus_stats.total_listeners
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let server_handle = {
            let server = self.server.clone();
            let inbound_rx = self.inbound_rx;
            tokio::spawn(async move {
                server.run(inbound_rx, shutdown_rx).await;
            })
        };

        // The pump's sender stays alive until shutdown; broker adapters
        // clone it to feed frames in
        let _inbound = self.inbound_tx;

        signals::setup_signal_handlers().await?;

        info!("🛑 Shutting down");
        shutdown_tx.send(()).ok();
        if let Err(e) = server_handle.await {
            error!("❌ Hub task failed: {}", e);
        }
        self.plugins.deactivate_all().await;

        let stats = self.server.stats();
        info!(
            "📊 Final stats: {} frames received, {} rejected",
            stats
                .frames_received
                .load(std::sync::atomic::Ordering::Relaxed),
            stats
                .frames_rejected
                .load(std::sync::atomic::Ordering::Relaxed)
        );
        info!("✅ Nexus Hub stopped cleanly");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let app = Application::new(args).await?;
    app.run().await
}
