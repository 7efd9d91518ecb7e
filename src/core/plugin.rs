//! Plugin system

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::core::bus::{scoped_handler, EventHandler, HandlerBinding};
use crate::core::event::Event;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    /// Accepted and waiting for initialization
    Registered,
    /// Known for introspection only; suppressed by the enable/disable policy
    Disabled,
    Initialized,
    /// Startup hook returned an error
    Failed,
    Destroyed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
}

impl PluginMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Plugin trait
///
/// `initialize` runs before the registry pulls [`Plugin::event_handlers`]
/// into the bus, so plugins usually declare their bindings there.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    fn metadata(&self) -> PluginMetadata;

    async fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    async fn destroy(&mut self) -> Result<()> {
        Ok(())
    }

    fn event_handlers(&self) -> Vec<HandlerBinding> {
        Vec::new()
    }

    fn name(&self) -> String {
        self.metadata().name
    }

    fn version(&self) -> String {
        self.metadata().version
    }
}

#[async_trait]
impl Plugin for Box<dyn Plugin> {
    fn metadata(&self) -> PluginMetadata {
        (**self).metadata()
    }

    async fn initialize(&mut self) -> Result<()> {
        (**self).initialize().await
    }

    async fn destroy(&mut self) -> Result<()> {
        (**self).destroy().await
    }

    fn event_handlers(&self) -> Vec<HandlerBinding> {
        (**self).event_handlers()
    }

    fn name(&self) -> String {
        (**self).name()
    }

    fn version(&self) -> String {
        (**self).version()
    }
}

/// Shared plugin plumbing: identity plus an accumulator of declared bindings.
///
/// Concrete plugins hold a `BasePlugin` and forward `metadata` and
/// `event_handlers` to it.
#[derive(Debug, Clone)]
pub struct BasePlugin {
    metadata: PluginMetadata,
    bindings: Vec<HandlerBinding>,
}

impl BasePlugin {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            metadata: PluginMetadata::new(name, version),
            bindings: Vec::new(),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_description(desc);
        self
    }

    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Declares a binding. A second declaration for the same event replaces the first.
    pub fn register_event_handler(
        &mut self,
        event_name: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        priority: i32,
        is_async: bool,
    ) {
        let binding = HandlerBinding::new(event_name, handler)
            .with_priority(priority)
            .with_async(is_async);

        if let Some(existing) = self
            .bindings
            .iter_mut()
            .find(|b| b.event_name == binding.event_name)
        {
            tracing::debug!(
                plugin = %self.metadata.name,
                event = %binding.event_name,
                "Replacing previously declared handler"
            );
            *existing = binding;
        } else {
            self.bindings.push(binding);
        }
    }

    pub fn event_handlers(&self) -> Vec<HandlerBinding> {
        self.bindings.clone()
    }

    pub fn clear_event_handlers(&mut self) {
        self.bindings.clear();
    }

    /// Wraps `f` into a handler named `<plugin>:<event>` that only accepts `event_name`.
    pub fn create_event_handler<F, Fut>(&self, event_name: &str, f: F) -> Arc<dyn EventHandler>
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        scoped_handler(
            format!("{}:{}", self.metadata.name, event_name),
            event_name,
            f,
        )
    }
}

/// Read-only snapshot of a registered plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub metadata: PluginMetadata,
    pub state: PluginState,
}

impl PluginInfo {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

pub struct PluginInstance {
    pub plugin: Box<dyn Plugin>,
    pub metadata: PluginMetadata,
    pub state: PluginState,
    /// Bindings currently installed in the bus on this plugin's behalf
    pub installed: Vec<HandlerBinding>,
}

impl PluginInstance {
    pub fn new(plugin: Box<dyn Plugin>, state: PluginState) -> Self {
        let metadata = Plugin::metadata(&plugin);
        Self {
            plugin,
            metadata,
            state,
            installed: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, PluginState::Initialized)
    }

    pub fn info(&self) -> PluginInfo {
        PluginInfo {
            metadata: self.metadata.clone(),
            state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestPlugin;

    #[async_trait]
    impl Plugin for TestPlugin {
        fn metadata(&self) -> PluginMetadata {
            PluginMetadata::new("test", "1.0.0").with_description("A test plugin")
        }
    }

    fn noop(base: &BasePlugin, event: &str) -> Arc<dyn EventHandler> {
        base.create_event_handler(event, |_| async { Ok(()) })
    }

    #[test]
    fn test_plugin_metadata_builder() {
        let meta = PluginMetadata::new("test", "1.0.0").with_description("Test plugin");

        assert_eq!(meta.name, "test");
        assert_eq!(meta.version, "1.0.0");
        assert_eq!(meta.description.as_deref(), Some("Test plugin"));
    }

    #[test]
    fn test_plugin_instance() {
        let instance = PluginInstance::new(Box::new(TestPlugin), PluginState::Registered);

        assert_eq!(instance.name(), "test");
        assert_eq!(instance.state, PluginState::Registered);
        assert!(!instance.is_initialized());
        assert!(instance.installed.is_empty());
        assert_eq!(instance.info().metadata.description.as_deref(), Some("A test plugin"));
    }

    #[test]
    fn test_default_hooks_declare_nothing() {
        let plugin = TestPlugin;
        assert!(plugin.event_handlers().is_empty());
        assert_eq!(plugin.name(), "test");
        assert_eq!(plugin.version(), "1.0.0");
    }

    #[test]
    fn test_base_plugin_accumulates_bindings() {
        let mut base = BasePlugin::new("audit", "0.2.0").with_description("Audits things");
        let created = noop(&base, "user.created");
        let login = noop(&base, "user.login");

        base.register_event_handler("user.created", created, 0, false);
        base.register_event_handler("user.login", login, 7, true);

        let bindings = base.event_handlers();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].event_name, "user.created");
        assert_eq!(bindings[0].handler.name(), "audit:user.created");
        assert_eq!(bindings[1].priority, 7);
        assert!(bindings[1].is_async);
    }

    #[test]
    fn test_base_plugin_replaces_same_event() {
        let mut base = BasePlugin::new("audit", "0.2.0");
        let first = noop(&base, "user.created");
        let second = noop(&base, "user.created");

        base.register_event_handler("user.created", first, 0, false);
        base.register_event_handler("user.created", Arc::clone(&second), 3, false);

        let bindings = base.event_handlers();
        assert_eq!(bindings.len(), 1);
        assert!(Arc::ptr_eq(&bindings[0].handler, &second));
        assert_eq!(bindings[0].priority, 3);

        base.clear_event_handlers();
        assert!(base.event_handlers().is_empty());
    }

    #[test]
    fn test_created_handler_scope() {
        let base = BasePlugin::new("orders", "1.0.0");
        let exact = noop(&base, "order.created");
        assert!(exact.can_handle("order.created"));
        assert!(!exact.can_handle("order.updated"));

        let pattern = noop(&base, "order.*");
        assert!(pattern.can_handle("order.updated"));
        assert!(!pattern.can_handle("user.created"));
    }
}
