//! Extension (plugin) lifecycle management.
//!
//! Extensions are compiled into the hub binary and registered explicitly:
//! each constructs a [`PluginDescriptor`] naming itself, its version and
//! the extensions it depends on. The [`PluginManager`] activates plugins
//! in dependency order and deactivates them in reverse, handing each a
//! [`PluginContext`] with its private data directory, its options from the
//! hub configuration, and the shared event bus.

use crate::bus::EventBus;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Errors that can occur during extension lifecycle management.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Extension activation failed during startup
    #[error("Plugin activation failed: {0}")]
    ActivationFailed(String),
    /// An extension with the same name is already registered
    #[error("Plugin {0} is already registered")]
    AlreadyRegistered(String),
    /// A declared dependency is not registered or failed to activate
    #[error("Plugin {0} depends on {1}, which is not active")]
    MissingDependency(String, String),
    /// Requested extension was not found
    #[error("Plugin not found: {0}")]
    NotFound(String),
    /// Runtime error during extension execution
    #[error("Plugin runtime error: {0}")]
    Runtime(String),
}

/// Identity and dependency declaration of an extension.
///
/// Constructed explicitly by each extension; there is no metadata scanning
/// or reflection involved. Dependencies are the `name`s of other
/// extensions that must be active before this one activates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    /// Unique identifying name
    pub name: String,
    /// Version string, semantic versioning recommended
    pub version: String,
    /// Names of extensions that must be active before this one
    pub dependencies: Vec<String>,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            dependencies: Vec::new(),
        }
    }

    /// Adds a dependency on another extension by name.
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }
}

/// Everything an extension receives at activation time.
#[derive(Clone)]
pub struct PluginContext {
    /// Directory in which this extension keeps its data
    pub data_dir: PathBuf,
    /// Extension options from the hub configuration
    pub options: serde_json::Value,
    /// Shared decision-event bus
    pub events: Arc<EventBus>,
}

impl PluginContext {
    pub fn new(data_dir: PathBuf, options: serde_json::Value, events: Arc<EventBus>) -> Self {
        Self {
            data_dir,
            options,
            events,
        }
    }
}

/// Trait implemented by every hub extension.
///
/// # Lifecycle
///
/// 1. The extension is registered with the [`PluginManager`]
/// 2. `activate()` runs once all declared dependencies are active;
///    listeners should be registered here
/// 3. `deactivate()` runs at shutdown, in reverse activation order
#[async_trait]
pub trait NexusPlugin: Send + Sync {
    /// Returns this extension's identity and dependency declaration.
    fn descriptor(&self) -> PluginDescriptor;

    /// Activates the extension. Called at most once per registration.
    async fn activate(&mut self, ctx: PluginContext) -> Result<(), PluginError>;

    /// Deactivates the extension. Errors are logged but never block
    /// shutdown of the remaining extensions.
    async fn deactivate(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// One registered extension and its lifecycle state.
struct RegisteredPlugin {
    plugin: Box<dyn NexusPlugin>,
    descriptor: PluginDescriptor,
    options: serde_json::Value,
    active: bool,
}

/// Registers extensions and drives their lifecycle in dependency order.
pub struct PluginManager {
    /// Event bus handed to every extension at activation
    events: Arc<EventBus>,
    /// Root directory under which each extension gets a data directory
    data_root: PathBuf,
    /// Registered extensions, in registration order
    plugins: Mutex<Vec<RegisteredPlugin>>,
}

impl PluginManager {
    pub fn new(events: Arc<EventBus>, data_root: impl AsRef<Path>) -> Self {
        Self {
            events,
            data_root: data_root.as_ref().to_path_buf(),
            plugins: Mutex::new(Vec::new()),
        }
    }

    /// Registers an extension without activating it.
    ///
    /// Duplicate names are rejected; the first registration stays
    /// authoritative.
    pub async fn register(
        &self,
        plugin: Box<dyn NexusPlugin>,
        options: serde_json::Value,
    ) -> Result<(), PluginError> {
        let descriptor = plugin.descriptor();
        let mut plugins = self.plugins.lock().await;
        if plugins.iter().any(|p| p.descriptor.name == descriptor.name) {
            return Err(PluginError::AlreadyRegistered(descriptor.name));
        }
        info!(
            "🔌 Registered extension {} v{}",
            descriptor.name, descriptor.version
        );
        plugins.push(RegisteredPlugin {
            plugin,
            descriptor,
            options,
            active: false,
        });
        Ok(())
    }

    /// Activates every registered extension, honouring dependency order.
    ///
    /// Repeatedly sweeps the registration list, activating each extension
    /// whose declared dependencies are all active, until a sweep makes no
    /// progress. Extensions left over at that point have unresolvable
    /// dependencies and are skipped with an error log; a failed extension
    /// never prevents unrelated ones from activating.
    ///
    /// Returns the names of the extensions that activated, in activation
    /// order.
    pub async fn activate_all(&self) -> Vec<String> {
        let mut plugins = self.plugins.lock().await;
        let mut activated = Vec::new();
        let mut failed: HashSet<String> = HashSet::new();

        loop {
            let mut progressed = false;

            for idx in 0..plugins.len() {
                if plugins[idx].active || failed.contains(&plugins[idx].descriptor.name) {
                    continue;
                }
                let deps_ready = plugins[idx].descriptor.dependencies.iter().all(|dep| {
                    plugins
                        .iter()
                        .any(|p| p.active && p.descriptor.name == *dep)
                });
                if !deps_ready {
                    continue;
                }

                let name = plugins[idx].descriptor.name.clone();
                let version = plugins[idx].descriptor.version.clone();
                let ctx = PluginContext::new(
                    self.data_root.join(&name),
                    plugins[idx].options.clone(),
                    self.events.clone(),
                );
                match plugins[idx].plugin.activate(ctx).await {
                    Ok(()) => {
                        plugins[idx].active = true;
                        info!("✅ Extension {} v{} activated", name, version);
                        activated.push(name);
                    }
                    Err(e) => {
                        error!("Extension {} failed to activate: {}", name, e);
                        failed.insert(name);
                    }
                }
                progressed = true;
            }

            if !progressed {
                break;
            }
        }

        for p in plugins.iter() {
            if !p.active && !failed.contains(&p.descriptor.name) {
                let missing: Vec<&String> = p
                    .descriptor
                    .dependencies
                    .iter()
                    .filter(|dep| {
                        !plugins
                            .iter()
                            .any(|q| q.active && q.descriptor.name == **dep)
                    })
                    .collect();
                error!(
                    "Extension {} skipped, unresolved dependencies: {:?}",
                    p.descriptor.name, missing
                );
            }
        }

        activated
    }

    /// Deactivates all active extensions, last activated first.
    pub async fn deactivate_all(&self) {
        let mut plugins = self.plugins.lock().await;
        for p in plugins.iter_mut().rev() {
            if !p.active {
                continue;
            }
            if let Err(e) = p.plugin.deactivate().await {
                warn!(
                    "Extension {} reported an error on deactivation: {}",
                    p.descriptor.name, e
                );
            }
            p.active = false;
            info!("Extension {} deactivated", p.descriptor.name);
        }
    }

    /// Names of the currently active extensions.
    pub async fn active_plugins(&self) -> Vec<String> {
        let plugins = self.plugins.lock().await;
        plugins
            .iter()
            .filter(|p| p.active)
            .map(|p| p.descriptor.name.clone())
            .collect()
    }

    /// Number of registered extensions, active or not.
    pub async fn plugin_count(&self) -> usize {
        self.plugins.lock().await.len()
    }
}
