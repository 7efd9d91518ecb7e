use event_synapse::plugins::{OrderPlugin, OrderStatus, UserPlugin};
use event_synapse::prelude::*;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct CounterPlugin {
    base: BasePlugin,
    count: Arc<AtomicUsize>,
}

impl CounterPlugin {
    fn new(count: Arc<AtomicUsize>) -> Self {
        Self {
            base: BasePlugin::new("counter", "1.0.0"),
            count,
        }
    }
}

#[async_trait]
impl Plugin for CounterPlugin {
    fn metadata(&self) -> PluginMetadata {
        self.base.metadata().clone()
    }

    async fn initialize(&mut self) -> Result<()> {
        let count = Arc::clone(&self.count);
        let handler = self
            .base
            .create_event_handler(names::USER_CREATED, move |_event| {
                let count = Arc::clone(&count);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        self.base
            .register_event_handler(names::USER_CREATED, handler, 0, false);
        Ok(())
    }

    async fn destroy(&mut self) -> Result<()> {
        self.base.clear_event_handlers();
        Ok(())
    }

    fn event_handlers(&self) -> Vec<HandlerBinding> {
        self.base.event_handlers()
    }
}

fn user_created(id: &str) -> Event {
    Event::builder(names::USER_CREATED)
        .with_source("integration")
        .with_field("id", id)
        .build()
}

#[tokio::test]
async fn test_bindings_live_only_while_plugin_is_initialized() {
    let bus = Arc::new(EventBus::new());
    let mut registry = PluginRegistry::new(Arc::clone(&bus));
    let count = Arc::new(AtomicUsize::new(0));

    registry
        .register_plugin(CounterPlugin::new(Arc::clone(&count)))
        .unwrap();
    bus.emit(&user_created("0")).await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 0);

    registry.initialize_plugins().await.unwrap();
    bus.emit(&user_created("1")).await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);

    registry.destroy_plugins().await;
    bus.emit(&user_created("2")).await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(registry.plugin_count(), 0);
}

#[tokio::test]
async fn test_app_runs_bundled_plugins() {
    let users = UserPlugin::new();
    let directory = users.directory();
    let orders = OrderPlugin::new();
    let book = orders.book();

    let config = AppConfig::new("integration").with_signal_handling(false);
    let mut app = SynapseApp::build()
        .with_config(config)
        .add_plugin(users)
        .add_plugin(orders)
        .build()
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    app.event_bus().register_handler(
        "system.*",
        handler("system-audit", move |event: Event| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(event.name().to_string());
                Ok(())
            }
        }),
        0,
    );

    app.run().await.unwrap();
    assert!(app.plugins().iter().all(|p| p.state == PluginState::Initialized));

    app.emit(&user_created("u-1")).await.unwrap();
    app.emit(
        &Event::builder(names::ORDER_CREATED)
            .with_field("id", "o-1")
            .with_field("userId", "u-1")
            .build(),
    )
    .await
    .unwrap();
    app.emit(
        &Event::builder(names::ORDER_COMPLETED)
            .with_field("id", "o-1")
            .build(),
    )
    .await
    .unwrap();

    assert!(directory.get("u-1").is_some());
    assert_eq!(book.get("o-1").unwrap().status, OrderStatus::Completed);
    assert_eq!(app.event_bus().handler_failures(), 0);

    app.shutdown().await.unwrap();
    assert!(app.event_bus().is_closed());
    assert_eq!(
        *seen.lock(),
        vec!["system.startup".to_string(), "system.shutdown".to_string()]
    );
}

#[tokio::test]
async fn test_disabled_plugin_never_sees_events() {
    let users = UserPlugin::new();
    let directory = users.directory();

    let config = AppConfig::new("integration")
        .with_signal_handling(false)
        .with_policy(PluginPolicy::new().with_disabled(["user-plugin"]));
    let mut app = SynapseApp::build()
        .with_config(config)
        .add_plugin(users)
        .add_plugin(OrderPlugin::new())
        .build()
        .unwrap();

    app.initialize().await.unwrap();
    app.emit(&user_created("u-1")).await.unwrap();

    let state = app.registry().get_plugin("user-plugin").unwrap().state;
    assert_eq!(state, PluginState::Disabled);
    assert!(directory.is_empty());
}
