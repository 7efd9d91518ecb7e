//! Named-event bus with priority ordering and per-handler failure isolation

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::core::event::Event;
use crate::error::{Result, SynapseError};

const SEGMENT_DELIMITER: char = '.';

/// Event handler trait
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<()>;

    /// Handlers returning `false` are skipped for that event name.
    fn can_handle(&self, _event_name: &str) -> bool {
        true
    }

    fn name(&self) -> &str {
        "anonymous"
    }
}

/// A handler bound to an event name (or wildcard pattern) with a priority.
#[derive(Clone)]
pub struct HandlerBinding {
    pub event_name: String,
    pub handler: Arc<dyn EventHandler>,
    /// Higher runs first
    pub priority: i32,
    pub is_async: bool,
}

impl HandlerBinding {
    pub fn new(event_name: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            event_name: event_name.into(),
            handler,
            priority: 0,
            is_async: false,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }
}

impl fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("event_name", &self.event_name)
            .field("handler", &self.handler.name())
            .field("priority", &self.priority)
            .field("is_async", &self.is_async)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Bindings per name before a leak warning is logged; 0 disables the check
    pub max_handlers: usize,
    /// Treat `*` and `**` segments as patterns
    pub wildcard: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_handlers: 10,
            wildcard: true,
        }
    }
}

impl BusConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_handlers(mut self, max: usize) -> Self {
        self.max_handlers = max;
        self
    }

    pub fn with_wildcard(mut self, enable: bool) -> Self {
        self.wildcard = enable;
        self
    }
}

#[derive(Clone)]
struct Slot {
    binding: HandlerBinding,
    seq: u64,
}

/// Async event bus.
///
/// `emit` snapshots the bindings under a read lock, releases it, then awaits
/// each handler in turn, so registrations made while an emission is in
/// flight only affect later emissions.
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<Slot>>>,
    config: BusConfig,
    next_seq: AtomicU64,
    closed: AtomicBool,
    event_count: AtomicU64,
    failure_count: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            config,
            next_seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            event_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn register_handler(
        &self,
        event_name: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        priority: i32,
    ) {
        self.register_binding(HandlerBinding::new(event_name, handler).with_priority(priority));
    }

    pub fn register_binding(&self, binding: HandlerBinding) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let event_name = binding.event_name.clone();
        let handler_name = binding.handler.name().to_string();

        let mut handlers = self.handlers.write();
        let slots = handlers.entry(event_name.clone()).or_default();
        slots.push(Slot { binding, seq });
        // stable: equal priorities keep registration order
        slots.sort_by(|a, b| b.binding.priority.cmp(&a.binding.priority));

        let count = slots.len();
        drop(handlers);

        if self.crosses_handler_limit(count) {
            tracing::warn!(
                event = %event_name,
                count,
                max = self.config.max_handlers,
                "Possible handler leak: more bindings than the configured maximum"
            );
        }

        tracing::debug!(event = %event_name, handler = %handler_name, "Registered handler");
    }

    /// True exactly when a name's binding count first exceeds `max_handlers`.
    fn crosses_handler_limit(&self, count: usize) -> bool {
        self.config.max_handlers > 0 && count == self.config.max_handlers + 1
    }

    /// Removes the first binding holding this exact handler. Returns whether one was removed.
    pub fn unregister_handler(&self, event_name: &str, handler: &Arc<dyn EventHandler>) -> bool {
        let mut handlers = self.handlers.write();
        let Some(slots) = handlers.get_mut(event_name) else {
            return false;
        };

        let Some(index) = slots
            .iter()
            .position(|slot| Arc::ptr_eq(&slot.binding.handler, handler))
        else {
            return false;
        };

        slots.remove(index);
        if slots.is_empty() {
            handlers.remove(event_name);
        }
        drop(handlers);

        tracing::debug!(event = %event_name, handler = %handler.name(), "Unregistered handler");
        true
    }

    /// Bindings registered under exactly this name or pattern, in dispatch order.
    pub fn get_handlers(&self, event_name: &str) -> Vec<HandlerBinding> {
        self.handlers
            .read()
            .get(event_name)
            .map(|slots| slots.iter().map(|s| s.binding.clone()).collect())
            .unwrap_or_default()
    }

    /// Every binding an emission of `event_name` would reach, exact and wildcard merged.
    pub fn handlers_for(&self, event_name: &str) -> Vec<HandlerBinding> {
        self.resolve(event_name)
            .into_iter()
            .map(|slot| slot.binding)
            .collect()
    }

    fn resolve(&self, event_name: &str) -> Vec<Slot> {
        let handlers = self.handlers.read();
        let mut resolved: Vec<Slot> = handlers.get(event_name).cloned().unwrap_or_default();

        if self.config.wildcard {
            let mut merged = false;
            for (pattern, slots) in handlers.iter() {
                if pattern != event_name
                    && is_pattern(pattern)
                    && matches_pattern(pattern, event_name)
                {
                    resolved.extend(slots.iter().cloned());
                    merged = true;
                }
            }
            if merged {
                resolved.sort_by(|a, b| {
                    b.binding
                        .priority
                        .cmp(&a.binding.priority)
                        .then(a.seq.cmp(&b.seq))
                });
            }
        }

        resolved
    }

    /// Dispatches `event` and waits for every bound handler to settle.
    ///
    /// Handler errors and panics are logged and counted, never returned.
    /// Only dispatch problems (closed bus, unusable event name) are errors.
    pub async fn emit(&self, event: &Event) -> Result<()> {
        let name = event.name();
        if self.is_closed() {
            return Err(SynapseError::Dispatch(format!(
                "event bus is closed, dropping {}",
                name
            )));
        }
        if name.is_empty() {
            return Err(SynapseError::Dispatch("event name is empty".to_string()));
        }
        if self.config.wildcard && is_pattern(name) {
            return Err(SynapseError::Dispatch(format!(
                "cannot emit wildcard pattern {}",
                name
            )));
        }

        let snapshot = self.resolve(name);
        self.event_count.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            event = %name,
            correlation_id = %event.correlation_id(),
            handlers = snapshot.len(),
            "Emitting event"
        );

        for slot in snapshot {
            let handler = &slot.binding.handler;
            if !handler.can_handle(name) {
                tracing::trace!(event = %name, handler = %handler.name(), "Handler declined event");
                continue;
            }

            let outcome = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("handler panicked: {}", panic_message(&*panic)),
            };

            self.failure_count.fetch_add(1, Ordering::Relaxed);
            let failure = SynapseError::HandlerFailure {
                event: name.to_string(),
                handler: handler.name().to_string(),
                message,
            };
            tracing::error!(
                event = %name,
                handler = %handler.name(),
                correlation_id = %event.correlation_id(),
                error = %failure,
                "Error in event handler"
            );
        }

        Ok(())
    }

    /// Schedules `emit` on the runtime without waiting; dispatch errors are logged.
    pub fn emit_detached(self: &Arc<Self>, event: Event) -> JoinHandle<()> {
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = bus.emit(&event).await {
                tracing::error!(
                    event = %event.name(),
                    correlation_id = %event.correlation_id(),
                    error = %e,
                    "Detached event emission failed"
                );
            }
        })
    }

    /// Rejects all further emissions.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().values().map(Vec::len).sum()
    }

    pub fn processed_events(&self) -> u64 {
        self.event_count.load(Ordering::Relaxed)
    }

    pub fn handler_failures(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Whether `name` contains a `*` or `**` segment.
pub fn is_pattern(name: &str) -> bool {
    name.split(SEGMENT_DELIMITER)
        .any(|segment| segment == "*" || segment == "**")
}

/// Dot-segment matching: `*` takes exactly one segment, `**` takes any number.
pub fn matches_pattern(pattern: &str, event_name: &str) -> bool {
    let pattern: Vec<&str> = pattern.split(SEGMENT_DELIMITER).collect();
    let name: Vec<&str> = event_name.split(SEGMENT_DELIMITER).collect();
    match_segments(&pattern, &name)
}

fn match_segments(pattern: &[&str], name: &[&str]) -> bool {
    match (pattern.first(), name.first()) {
        (None, None) => true,
        (Some(&"**"), _) => {
            match_segments(&pattern[1..], name)
                || (!name.is_empty() && match_segments(pattern, &name[1..]))
        }
        (Some(&"*"), Some(_)) => match_segments(&pattern[1..], &name[1..]),
        (Some(p), Some(n)) if p == n => match_segments(&pattern[1..], &name[1..]),
        _ => false,
    }
}

pub struct ClosureHandler<F> {
    name: String,
    pattern: Option<String>,
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for ClosureHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, event: &Event) -> Result<()> {
        (self.f)(event.clone()).await
    }

    fn can_handle(&self, event_name: &str) -> bool {
        match &self.pattern {
            Some(pattern) if is_pattern(pattern) => matches_pattern(pattern, event_name),
            Some(pattern) => pattern == event_name,
            None => true,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wraps an async closure into a handler that accepts every event.
pub fn handler<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(ClosureHandler {
        name: name.into(),
        pattern: None,
        f,
    })
}

/// Like [`handler`], but `can_handle` only accepts names matching `pattern`.
pub fn scoped_handler<F, Fut>(
    name: impl Into<String>,
    pattern: impl Into<String>,
    f: F,
) -> Arc<dyn EventHandler>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(ClosureHandler {
        name: name.into(),
        pattern: Some(pattern.into()),
        f,
    })
}
