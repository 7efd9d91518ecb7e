//! Core module: events, the event bus, and the plugin contract

pub mod bus;
pub mod event;
pub mod plugin;

pub use bus::{
    handler, matches_pattern, scoped_handler, BusConfig, EventBus, EventHandler, HandlerBinding,
};
pub use event::{names, Event, EventBuilder, EventContext, Payload};
pub use plugin::{BasePlugin, Plugin, PluginInfo, PluginInstance, PluginMetadata, PluginState};
