//! Error handling system

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynapseError {
    #[error("Plugin already registered: {0}")]
    DuplicateName(String),

    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Handler {handler} failed on {event}: {message}")]
    HandlerFailure {
        event: String,
        handler: String,
        message: String,
    },

    #[error("Plugin lifecycle failed: {0}")]
    LifecycleFailure(String),

    #[error("Invalid plugin state: {0}")]
    InvalidState(String),

    #[error("Event dispatch failed: {0}")]
    Dispatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, SynapseError>;

pub trait ContextExt<T> {
    fn with_plugin(self, plugin_name: &str) -> Result<T>;
    fn with_event(self, event_name: &str) -> Result<T>;
}

impl<T> ContextExt<T> for Result<T> {
    fn with_plugin(self, plugin_name: &str) -> Result<T> {
        self.map_err(|e| match e {
            SynapseError::LifecycleFailure(msg) => {
                SynapseError::LifecycleFailure(format!("{} [plugin: {}]", msg, plugin_name))
            }
            other => SynapseError::LifecycleFailure(format!("{} [plugin: {}]", other, plugin_name)),
        })
    }

    fn with_event(self, event_name: &str) -> Result<T> {
        self.map_err(|e| match e {
            SynapseError::Dispatch(msg) => {
                SynapseError::Dispatch(format!("{} [event: {}]", msg, event_name))
            }
            other => SynapseError::Dispatch(format!("{} [event: {}]", other, event_name)),
        })
    }
}

impl From<std::io::Error> for SynapseError {
    fn from(error: std::io::Error) -> Self {
        SynapseError::IoError(error.to_string())
    }
}

#[macro_export]
macro_rules! bail {
    ($msg:literal) => {
        return Err($crate::error::SynapseError::Other($msg.to_string()))
    };
    ($err:expr) => {
        return Err($crate::error::SynapseError::Other($err.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::error::SynapseError::Other(format!($fmt, $($arg)*)))
    };
}
