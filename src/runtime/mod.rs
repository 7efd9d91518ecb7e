//! Runtime module: plugin registry and application shell

pub mod app;
pub mod registry;

pub use app::{AppBuilder, AppConfig, SynapseApp};
pub use registry::{PluginPolicy, PluginRegistry};
