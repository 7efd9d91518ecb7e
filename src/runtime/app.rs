//! Application runtime

use crate::core::{names, BusConfig, Event, EventBus, Payload, Plugin, PluginInfo};
use crate::error::{ContextExt, Result, SynapseError};
use crate::runtime::registry::{PluginPolicy, PluginRegistry};
use std::sync::Arc;
use tokio::time::{timeout, Duration};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
    pub description: String,
    pub environment: String,
    pub log_level: String,
    pub policy: PluginPolicy,
    pub bus: BusConfig,
    pub graceful_shutdown_timeout: Duration,
    pub enable_signal_handling: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "EventSynapseApp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: String::new(),
            environment: "development".to_string(),
            log_level: "info".to_string(),
            policy: PluginPolicy::default(),
            bus: BusConfig::default(),
            graceful_shutdown_timeout: Duration::from_secs(30),
            enable_signal_handling: true,
        }
    }
}

impl AppConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Reads configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("APP_NAME") {
            config.name = name;
        }
        if let Some(env) = lookup("APP_ENV").or_else(|| lookup("NODE_ENV")) {
            config.environment = env;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(enabled) = lookup("ENABLED_PLUGINS") {
            config.policy.enabled = parse_list(&enabled);
        }
        if let Some(disabled) = lookup("DISABLED_PLUGINS") {
            config.policy.disabled = parse_list(&disabled);
        }
        if let Some(max) = lookup("MAX_EVENT_LISTENERS") {
            config.bus.max_handlers = max.trim().parse().map_err(|_| {
                SynapseError::Config(format!("MAX_EVENT_LISTENERS must be a number, got {:?}", max))
            })?;
        }
        if let Some(wildcard) = lookup("EVENT_WILDCARD") {
            config.bus.wildcard = parse_bool("EVENT_WILDCARD", &wildcard)?;
        }

        Ok(config)
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_policy(mut self, policy: PluginPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_bus_config(mut self, bus: BusConfig) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_graceful_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_shutdown_timeout = timeout;
        self
    }

    pub fn with_signal_handling(mut self, enable: bool) -> Self {
        self.enable_signal_handling = enable;
        self
    }
}

/// Splits a comma separated list, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(SynapseError::Config(format!(
            "{} must be a boolean, got {:?}",
            key, other
        ))),
    }
}

pub struct AppBuilder {
    config: Option<AppConfig>,
    plugins_to_add: Vec<Box<dyn Plugin>>,
    event_bus: Option<Arc<EventBus>>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            plugins_to_add: Vec::new(),
            event_bus: None,
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn add_plugin<P: Plugin + 'static>(mut self, plugin: P) -> Self {
        self.plugins_to_add.push(Box::new(plugin));
        self
    }

    pub fn add_plugins<I>(mut self, plugins: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn Plugin>>,
    {
        self.plugins_to_add.extend(plugins);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Fails on the first duplicate plugin name.
    pub fn build(mut self) -> Result<SynapseApp> {
        let config = self.config.take().unwrap_or_default();
        let event_bus = self
            .event_bus
            .unwrap_or_else(|| Arc::new(EventBus::with_config(config.bus.clone())));

        let mut registry =
            PluginRegistry::with_policy(Arc::clone(&event_bus), config.policy.clone());
        for plugin in self.plugins_to_add {
            registry.register_plugin(plugin)?;
        }

        Ok(SynapseApp {
            config,
            event_bus,
            registry,
            started: false,
            initialized: false,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bus and a plugin registry started and stopped together.
pub struct SynapseApp {
    config: AppConfig,
    event_bus: Arc<EventBus>,
    registry: PluginRegistry,
    /// `initialize` ran, successfully or not; plugins may need teardown
    started: bool,
    initialized: bool,
}

impl SynapseApp {
    pub fn build() -> AppBuilder {
        AppBuilder::new()
    }

    /// Initializes every plugin, then announces `system.startup`.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Err(SynapseError::InvalidState(
                "Application already initialized".to_string(),
            ));
        }

        tracing::info!(
            app = %self.config.name,
            env = %self.config.environment,
            "Initializing application..."
        );
        self.started = true;
        self.registry.initialize_plugins().await?;

        self.emit_system(names::SYSTEM_STARTUP, "Application started successfully")
            .await?;
        self.initialized = true;
        tracing::info!(app = %self.config.name, "Application initialized");
        Ok(())
    }

    /// Initializes, then blocks until SIGINT/SIGTERM and shuts down.
    ///
    /// With signal handling disabled it returns right after initialization.
    pub async fn run(&mut self) -> Result<()> {
        self.initialize().await?;

        if self.config.enable_signal_handling {
            self.wait_for_shutdown().await?;
        }

        Ok(())
    }

    async fn wait_for_shutdown(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigint = signal(SignalKind::interrupt())?;
            let mut sigterm = signal(SignalKind::terminate())?;

            tokio::select! {
                _ = sigint.recv() => tracing::info!("SIGINT received, shutting down gracefully..."),
                _ = sigterm.recv() => {
                    tracing::info!("SIGTERM received, shutting down gracefully...")
                }
            }
        }

        #[cfg(windows)]
        {
            tokio::signal::ctrl_c().await?;
            tracing::info!("Ctrl-C received, shutting down gracefully...");
        }

        self.force_shutdown().await
    }

    /// Announces `system.shutdown`, destroys every plugin and closes the bus.
    ///
    /// Also tears down after a failed `initialize`, since plugins that started
    /// before the failure stay initialized.
    pub async fn shutdown(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }

        if let Err(e) = self
            .emit_system(names::SYSTEM_SHUTDOWN, "Application shutting down")
            .await
        {
            tracing::warn!(error = %e, "Shutdown announcement failed");
        }

        self.registry.destroy_plugins().await;
        self.event_bus.close();
        self.started = false;
        self.initialized = false;

        tracing::info!(app = %self.config.name, "Application stopped");
        Ok(())
    }

    /// [`shutdown`](Self::shutdown) bounded by the configured grace period.
    pub async fn force_shutdown(&mut self) -> Result<()> {
        let grace = self.config.graceful_shutdown_timeout;
        match timeout(grace, self.shutdown()).await {
            Ok(result) => result,
            Err(_) => Err(SynapseError::Timeout(format!(
                "Shutdown did not finish within {:?}",
                grace
            ))),
        }
    }

    pub async fn emit(&self, event: &Event) -> Result<()> {
        self.event_bus.emit(event).await
    }

    async fn emit_system(&self, event_name: &str, message: &str) -> Result<()> {
        let mut payload = Payload::new();
        payload.insert("message".to_string(), message.into());
        payload.insert("app".to_string(), self.config.name.clone().into());

        self.event_bus
            .emit(&Event::system(event_name, payload))
            .await
            .with_event(event_name)
    }

    pub fn plugins(&self) -> Vec<PluginInfo> {
        self.registry.get_all_plugins()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PluginRegistry {
        &mut self.registry
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}
