//! Event Synapse - in-process event bus with a plugin registry
//!
//! Plugins declare handler bindings; the registry installs them on a shared
//! [`EventBus`] when a plugin initializes and removes them when it goes away.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod core;
pub mod error;
pub mod plugins;
pub mod runtime;

pub mod prelude {
    //! Commonly used types and traits

    pub use crate::core::{handler, names, scoped_handler, BasePlugin, Event, EventBus};
    pub use crate::core::{BusConfig, EventHandler, HandlerBinding, Payload};
    pub use crate::core::{Plugin, PluginInfo, PluginMetadata, PluginState};
    pub use crate::error::{ContextExt, Result, SynapseError};
    pub use crate::runtime::{AppBuilder, AppConfig, PluginPolicy, PluginRegistry, SynapseApp};
    pub use crate::bail;
    pub use async_trait::async_trait;
}

pub use core::{Event, EventBus, Plugin};
pub use error::{Result, SynapseError};
pub use runtime::{PluginRegistry, SynapseApp};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

pub fn build_info() -> String {
    format!("Event Synapse {}", VERSION)
}

pub fn runtime_check() -> Result<()> {
    if tokio::runtime::Handle::try_current().is_err() {
        return Err(SynapseError::Other(
            "No Tokio runtime found. Use #[tokio::main]".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_build_info() {
        assert!(build_info().starts_with("Event Synapse "));
    }

    #[test]
    fn test_runtime_check_outside_tokio() {
        assert!(runtime_check().is_err());
    }

    #[tokio::test]
    async fn test_prelude_imports() {
        use prelude::*;

        runtime_check().unwrap();
        let bus = std::sync::Arc::new(EventBus::new());
        let registry = PluginRegistry::new(bus);
        assert_eq!(registry.plugin_count(), 0);
    }
}
