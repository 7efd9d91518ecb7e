//! Bundled domain plugins

pub mod order;
pub mod user;

pub use order::{OrderBook, OrderPlugin, OrderRecord, OrderStatus};
pub use user::{UserDirectory, UserPlugin, UserRecord};

use crate::core::Event;
use crate::error::{Result, SynapseError};

/// String payload field that the handler cannot do without.
pub(crate) fn required_str<'a>(event: &'a Event, key: &str) -> Result<&'a str> {
    event.payload_str(key).ok_or_else(|| {
        SynapseError::Other(format!("{} payload is missing {:?}", event.name(), key))
    })
}

pub(crate) fn optional_string(event: &Event, key: &str) -> Option<String> {
    event.payload_str(key).map(ToString::to_string)
}
