//! Plugin registry

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{
    names, Event, EventBus, Payload, Plugin, PluginInfo, PluginInstance, PluginState,
};
use crate::error::{ContextExt, Result, SynapseError};

/// Enable/disable lists applied at registration time.
///
/// A non-empty `enabled` list acts as an allow-list; `disabled` always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginPolicy {
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
}

impl PluginPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_disabled<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled.extend(names.into_iter().map(Into::into));
        self
    }

    /// Why `name` is suppressed, or `None` if it may run.
    pub fn suppression_reason(&self, name: &str) -> Option<&'static str> {
        if self.disabled.iter().any(|n| n == name) {
            Some("plugin is disabled")
        } else if !self.enabled.is_empty() && !self.enabled.iter().any(|n| n == name) {
            Some("plugin is not in the enabled list")
        } else {
            None
        }
    }

    pub fn allows(&self, name: &str) -> bool {
        self.suppression_reason(name).is_none()
    }
}

pub struct PluginRegistry {
    plugins: HashMap<String, PluginInstance>,
    registration_order: Vec<String>,
    policy: PluginPolicy,
    event_bus: Arc<EventBus>,
}

impl PluginRegistry {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self::with_policy(event_bus, PluginPolicy::default())
    }

    pub fn with_policy(event_bus: Arc<EventBus>, policy: PluginPolicy) -> Self {
        Self {
            plugins: HashMap::new(),
            registration_order: Vec::new(),
            policy,
            event_bus,
        }
    }

    /// Adds a plugin. Policy-suppressed plugins are kept as [`PluginState::Disabled`].
    pub fn register_plugin<P: Plugin + 'static>(&mut self, plugin: P) -> Result<()> {
        let metadata = plugin.metadata();
        let plugin_name = metadata.name.clone();

        if self.plugins.contains_key(&plugin_name) {
            tracing::error!(plugin = %plugin_name, "Plugin is already registered");
            return Err(SynapseError::DuplicateName(plugin_name));
        }

        let state = match self.policy.suppression_reason(&plugin_name) {
            Some(reason) => {
                tracing::warn!(plugin = %plugin_name, reason, "Plugin will not be initialized");
                PluginState::Disabled
            }
            None => {
                tracing::info!(
                    plugin = %plugin_name,
                    version = %metadata.version,
                    "Plugin registered"
                );
                PluginState::Registered
            }
        };

        self.plugins
            .insert(plugin_name.clone(), PluginInstance::new(Box::new(plugin), state));
        self.registration_order.push(plugin_name);
        Ok(())
    }

    /// Runs the destroy hook, pulls the plugin's bindings from the bus and forgets it.
    ///
    /// If the destroy hook fails the plugin is left registered as it was.
    pub async fn unregister_plugin(&mut self, name: &str) -> Result<()> {
        let instance = self
            .plugins
            .get_mut(name)
            .ok_or_else(|| SynapseError::NotFound(name.to_string()))?;

        if instance.state != PluginState::Disabled {
            if let Err(e) = instance.plugin.destroy().await.with_plugin(name) {
                tracing::error!(plugin = %name, error = %e, "Failed to unregister plugin");
                return Err(e);
            }
        }

        uninstall(&self.event_bus, instance);
        self.plugins.remove(name);
        self.registration_order.retain(|n| n != name);

        tracing::info!(plugin = %name, "Plugin unregistered");
        self.notify(names::PLUGIN_UNLOADED, name, None).await;
        Ok(())
    }

    /// Initializes every `Registered` plugin in registration order.
    ///
    /// Stops at the first failing startup hook; plugins initialized before it stay initialized.
    pub async fn initialize_plugins(&mut self) -> Result<()> {
        tracing::info!("Initializing plugins...");

        let pending: Vec<String> = self
            .registration_order
            .iter()
            .filter(|name| {
                self.plugins
                    .get(*name)
                    .is_some_and(|p| p.state == PluginState::Registered)
            })
            .cloned()
            .collect();

        for name in pending {
            self.initialize_plugin(&name).await?;
        }

        tracing::info!("All plugins initialized");
        Ok(())
    }

    /// Runs one plugin's startup hook and installs its bindings.
    pub async fn initialize_plugin(&mut self, name: &str) -> Result<()> {
        let instance = self
            .plugins
            .get_mut(name)
            .ok_or_else(|| SynapseError::NotFound(name.to_string()))?;

        if instance.state != PluginState::Registered {
            return Err(SynapseError::InvalidState(format!(
                "Plugin {} is {:?}, only registered plugins can be initialized",
                name, instance.state
            )));
        }

        if let Err(e) = instance.plugin.initialize().await.with_plugin(name) {
            instance.state = PluginState::Failed;
            tracing::error!(plugin = %name, error = %e, "Failed to initialize plugin");
            self.notify(names::PLUGIN_ERROR, name, Some(e.to_string())).await;
            return Err(e);
        }

        let bindings = instance.plugin.event_handlers();
        for binding in &bindings {
            self.event_bus.register_binding(binding.clone());
        }
        instance.installed = bindings;
        instance.state = PluginState::Initialized;

        tracing::info!(
            plugin = %name,
            handlers = instance.installed.len(),
            "Plugin initialized"
        );
        self.notify(names::PLUGIN_LOADED, name, None).await;
        Ok(())
    }

    /// Best-effort teardown of every plugin, newest first. The registry is empty afterwards.
    pub async fn destroy_plugins(&mut self) {
        tracing::info!("Destroying plugins...");

        for name in self.registration_order.iter().rev() {
            let Some(instance) = self.plugins.get_mut(name) else {
                continue;
            };
            if instance.state == PluginState::Disabled {
                continue;
            }

            uninstall(&self.event_bus, instance);
            match instance.plugin.destroy().await {
                Ok(()) => {
                    instance.state = PluginState::Destroyed;
                    tracing::info!(plugin = %name, "Plugin destroyed");
                }
                Err(e) => {
                    tracing::error!(plugin = %name, error = %e, "Failed to destroy plugin");
                }
            }
        }

        self.plugins.clear();
        self.registration_order.clear();
        tracing::info!("All plugins destroyed");
    }

    pub fn get_plugin(&self, name: &str) -> Option<PluginInfo> {
        self.plugins.get(name).map(PluginInstance::info)
    }

    /// Snapshots of every known plugin, in registration order.
    pub fn get_all_plugins(&self) -> Vec<PluginInfo> {
        self.registration_order
            .iter()
            .filter_map(|name| self.plugins.get(name))
            .map(PluginInstance::info)
            .collect()
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    pub fn policy(&self) -> &PluginPolicy {
        &self.policy
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    async fn notify(&self, event_name: &str, plugin_name: &str, error: Option<String>) {
        let mut payload = Payload::new();
        payload.insert("plugin".to_string(), plugin_name.into());
        if let Some(error) = error {
            payload.insert("error".to_string(), error.into());
        }

        let event = Event::builder(event_name)
            .with_payload(payload)
            .with_source("registry")
            .build();

        if let Err(e) = self.event_bus.emit(&event).await {
            tracing::warn!(
                event = %event_name,
                plugin = %plugin_name,
                error = %e,
                "Lifecycle notification dropped"
            );
        }
    }
}

fn uninstall(bus: &EventBus, instance: &mut PluginInstance) {
    for binding in instance.installed.drain(..) {
        bus.unregister_handler(&binding.event_name, &binding.handler);
    }
}
