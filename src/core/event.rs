//! Event values and the factory that stamps their context

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Opaque key/value payload carried by an event.
pub type Payload = Map<String, Value>;

/// Well-known event names
pub mod names {
    pub const USER_CREATED: &str = "user.created";
    pub const USER_UPDATED: &str = "user.updated";
    pub const USER_DELETED: &str = "user.deleted";
    pub const USER_LOGIN: &str = "user.login";
    pub const USER_LOGOUT: &str = "user.logout";

    pub const ORDER_CREATED: &str = "order.created";
    pub const ORDER_UPDATED: &str = "order.updated";
    pub const ORDER_CANCELLED: &str = "order.cancelled";
    pub const ORDER_COMPLETED: &str = "order.completed";

    pub const SYSTEM_STARTUP: &str = "system.startup";
    pub const SYSTEM_SHUTDOWN: &str = "system.shutdown";
    pub const SYSTEM_ERROR: &str = "system.error";
    pub const SYSTEM_HEALTH_CHECK: &str = "system.health_check";

    pub const PLUGIN_LOADED: &str = "plugin.loaded";
    pub const PLUGIN_UNLOADED: &str = "plugin.unloaded";
    pub const PLUGIN_ERROR: &str = "plugin.error";

    pub const RPC_REQUEST: &str = "rpc.request";
    pub const RPC_RESPONSE: &str = "rpc.response";
    pub const RPC_ERROR: &str = "rpc.error";
}

/// Tracing context stamped on every event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub source: String,
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Payload>,
}

/// Immutable event dispatched through the bus.
///
/// Build one with [`Event::builder`] or the `user`/`system`/`rpc` shortcuts.
/// Each build draws a fresh correlation id unless one is supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    name: String,
    payload: Payload,
    context: EventContext,
}

impl Event {
    pub fn builder(name: impl Into<String>) -> EventBuilder {
        EventBuilder::new(name)
    }

    /// Event raised on behalf of a user.
    pub fn user(name: impl Into<String>, payload: Payload, user_id: impl Into<String>) -> Self {
        EventBuilder::new(name)
            .with_payload(payload)
            .with_source("user")
            .with_user_id(user_id)
            .build()
    }

    /// Event raised by the runtime itself.
    pub fn system(name: impl Into<String>, payload: Payload) -> Self {
        EventBuilder::new(name)
            .with_payload(payload)
            .with_source("system")
            .build()
    }

    /// Event raised by the RPC transport for an inbound call.
    pub fn rpc(name: impl Into<String>, payload: Payload) -> Self {
        EventBuilder::new(name)
            .with_payload(payload)
            .with_source("rpc")
            .build()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[must_use]
    pub fn context(&self) -> &EventContext {
        &self.context
    }

    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.context.correlation_id
    }

    /// String field of the payload, if present.
    #[must_use]
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Builder for [`Event`]
#[derive(Debug, Clone)]
pub struct EventBuilder {
    name: String,
    payload: Payload,
    source: String,
    correlation_id: Option<String>,
    user_id: Option<String>,
    session_id: Option<String>,
    metadata: Option<Payload>,
}

impl EventBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Payload::new(),
            source: "unknown".to_string(),
            correlation_id: None,
            user_id: None,
            session_id: None,
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_user_id(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Payload) -> Self {
        self.metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn build(self) -> Event {
        Event {
            name: self.name,
            payload: self.payload,
            context: EventContext {
                timestamp: Utc::now().timestamp_millis(),
                source: self.source,
                correlation_id: self.correlation_id.unwrap_or_else(generate_correlation_id),
                user_id: self.user_id,
                session_id: self.session_id,
                metadata: self.metadata,
            },
        }
    }
}

fn generate_correlation_id() -> String {
    format!("evt_{}", Uuid::new_v4().simple())
}
