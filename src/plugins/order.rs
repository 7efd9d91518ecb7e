//! Order plugin
//!
//! Tracks orders through `order.*` events. An order starts `Pending` and may
//! move once, to either `Cancelled` or `Completed`. Updates are only accepted
//! while the order is still pending.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::bail;
use crate::core::{names, BasePlugin, Event, HandlerBinding, Plugin, PluginMetadata};
use crate::error::Result;
use crate::plugins::{optional_string, required_str};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Cancelled,
    Completed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub id: String,
    pub user_id: Option<String>,
    pub total: Option<f64>,
    pub status: OrderStatus,
    pub revisions: u32,
}

#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    orders: Arc<RwLock<HashMap<String, OrderRecord>>>,
}

impl OrderBook {
    pub fn get(&self, id: &str) -> Option<OrderRecord> {
        self.orders.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }

    pub fn count_with(&self, status: OrderStatus) -> usize {
        self.orders
            .read()
            .values()
            .filter(|o| o.status == status)
            .count()
    }

    /// Moves a pending order into `next`.
    fn settle(&self, id: &str, next: OrderStatus) -> Result<()> {
        let mut orders = self.orders.write();
        let Some(order) = orders.get_mut(id) else {
            bail!("unknown order {}", id);
        };
        if order.status.is_terminal() {
            warn!(order = %id, from = %order.status, to = %next, "Rejected order transition");
            bail!("order {} is already {}", id, order.status);
        }
        order.status = next;
        Ok(())
    }
}

fn payload_total(event: &Event) -> Option<f64> {
    event.payload().get("total").and_then(|v| v.as_f64())
}

type OrderOp = fn(&OrderBook, &Event) -> Result<()>;

pub struct OrderPlugin {
    base: BasePlugin,
    book: OrderBook,
}

impl OrderPlugin {
    pub fn new() -> Self {
        Self {
            base: BasePlugin::new("order-plugin", "1.0.0")
                .with_description("Handles order-related events"),
            book: OrderBook::default(),
        }
    }

    pub fn book(&self) -> OrderBook {
        self.book.clone()
    }

    fn bind(&mut self, event_name: &str, op: OrderOp) {
        let book = self.book.clone();
        let handler = self.base.create_event_handler(event_name, move |event| {
            let book = book.clone();
            async move { op(&book, &event) }
        });
        self.base.register_event_handler(event_name, handler, 0, false);
    }

    fn handle_order_created(book: &OrderBook, event: &Event) -> Result<()> {
        let id = required_str(event, "id")?;
        let mut orders = book.orders.write();
        if orders.contains_key(id) {
            bail!("order {} already exists", id);
        }

        let record = OrderRecord {
            id: id.to_string(),
            user_id: optional_string(event, "userId"),
            total: payload_total(event),
            status: OrderStatus::Pending,
            revisions: 0,
        };
        info!(order = %id, user = ?record.user_id, total = ?record.total, "Order created");
        orders.insert(id.to_string(), record);
        Ok(())
    }

    fn handle_order_updated(book: &OrderBook, event: &Event) -> Result<()> {
        let id = required_str(event, "id")?;
        let mut orders = book.orders.write();
        let Some(order) = orders.get_mut(id) else {
            bail!("cannot update unknown order {}", id);
        };
        if order.status.is_terminal() {
            bail!("cannot update order {}: already {}", id, order.status);
        }

        if let Some(total) = payload_total(event) {
            order.total = Some(total);
        }
        order.revisions += 1;
        info!(order = %id, revisions = order.revisions, "Order updated");
        Ok(())
    }

    fn handle_order_cancelled(book: &OrderBook, event: &Event) -> Result<()> {
        let id = required_str(event, "id")?;
        book.settle(id, OrderStatus::Cancelled)?;
        info!(order = %id, reason = ?event.payload_str("reason"), "Order cancelled");
        Ok(())
    }

    fn handle_order_completed(book: &OrderBook, event: &Event) -> Result<()> {
        let id = required_str(event, "id")?;
        book.settle(id, OrderStatus::Completed)?;
        info!(order = %id, "Order completed");
        Ok(())
    }
}

impl Default for OrderPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for OrderPlugin {
    fn metadata(&self) -> PluginMetadata {
        self.base.metadata().clone()
    }

    async fn initialize(&mut self) -> Result<()> {
        info!("Initializing OrderPlugin...");

        self.bind(names::ORDER_CREATED, Self::handle_order_created);
        self.bind(names::ORDER_UPDATED, Self::handle_order_updated);
        self.bind(names::ORDER_CANCELLED, Self::handle_order_cancelled);
        self.bind(names::ORDER_COMPLETED, Self::handle_order_completed);

        info!("OrderPlugin initialized successfully");
        Ok(())
    }

    async fn destroy(&mut self) -> Result<()> {
        info!(
            open_orders = self.book.count_with(OrderStatus::Pending),
            "Destroying OrderPlugin..."
        );
        self.base.clear_event_handlers();
        Ok(())
    }

    fn event_handlers(&self) -> Vec<HandlerBinding> {
        self.base.event_handlers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventBus;
    use crate::runtime::PluginRegistry;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn running() -> (Arc<EventBus>, PluginRegistry, OrderBook) {
        let bus = Arc::new(EventBus::new());
        let mut registry = PluginRegistry::new(Arc::clone(&bus));
        let plugin = OrderPlugin::new();
        let book = plugin.book();
        registry.register_plugin(plugin).unwrap();
        registry.initialize_plugins().await.unwrap();
        (bus, registry, book)
    }

    fn order_event(name: &str, id: &str) -> Event {
        Event::builder(name)
            .with_source("test")
            .with_field("id", id)
            .build()
    }

    #[tokio::test]
    async fn test_order_flow() {
        let (bus, _registry, book) = running().await;

        let created = Event::builder(names::ORDER_CREATED)
            .with_field("id", "o-1")
            .with_field("userId", "u-1")
            .with_field("total", json!(42.5))
            .build();
        bus.emit(&created).await.unwrap();

        let updated = Event::builder(names::ORDER_UPDATED)
            .with_field("id", "o-1")
            .with_field("total", json!(50))
            .build();
        bus.emit(&updated).await.unwrap();
        bus.emit(&order_event(names::ORDER_COMPLETED, "o-1")).await.unwrap();

        let order = book.get("o-1").unwrap();
        assert_eq!(order.user_id.as_deref(), Some("u-1"));
        assert_eq!(order.total, Some(50.0));
        assert_eq!(order.revisions, 1);
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(bus.handler_failures(), 0);
    }

    #[tokio::test]
    async fn test_terminal_orders_reject_changes() {
        let (bus, _registry, book) = running().await;

        bus.emit(&order_event(names::ORDER_CREATED, "o-2")).await.unwrap();
        bus.emit(&order_event(names::ORDER_CANCELLED, "o-2")).await.unwrap();
        bus.emit(&order_event(names::ORDER_COMPLETED, "o-2")).await.unwrap();
        bus.emit(&order_event(names::ORDER_UPDATED, "o-2")).await.unwrap();

        assert_eq!(book.get("o-2").unwrap().status, OrderStatus::Cancelled);
        assert_eq!(bus.handler_failures(), 2);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_orders() {
        let (bus, _registry, book) = running().await;

        bus.emit(&order_event(names::ORDER_CANCELLED, "missing")).await.unwrap();
        bus.emit(&Event::builder(names::ORDER_CREATED).build()).await.unwrap();

        assert!(book.is_empty());
        assert_eq!(bus.handler_failures(), 2);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(OrderStatus::Pending.to_string(), "pending");
        assert!(OrderStatus::Completed.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
    }

    #[tokio::test]
    async fn test_destroy_drops_declared_bindings() {
        let (bus, mut registry, _book) = running().await;
        assert_eq!(bus.get_handlers(names::ORDER_CREATED).len(), 1);

        registry.destroy_plugins().await;
        assert_eq!(bus.handler_count(), 0);
    }
}
