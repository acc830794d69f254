//! Bridge event bus

use portway_bridge::{
    event_handler, event_types, Bridge, BridgeConfig, BridgeError, BridgeEvent, BridgeOptions,
    Context, EventBus,
};
use portway_test_utils::{wait_for_flag, EventCollector, ScriptedAdapter, DEFAULT_TIMEOUT};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn quiet_bridge() -> Arc<Bridge> {
    Arc::new(Bridge::new(
        "events",
        BridgeOptions::default(),
        BridgeConfig {
            heartbeat_interval: Duration::ZERO,
            ..Default::default()
        },
    ))
}

#[tokio::test]
async fn test_lifecycle_events() {
    let bridge = quiet_bridge();
    let events = EventCollector::new();
    events.attach(
        &bridge,
        &[
            event_types::BRIDGE_READY,
            event_types::ADAPTER_CONNECTED,
            event_types::BRIDGE_SHUTDOWN,
        ],
    );
    bridge
        .register_adapter("a", ScriptedAdapter::new("a").arc())
        .unwrap();
    bridge
        .register_adapter("b", ScriptedAdapter::new("b").failing_init("boom").arc())
        .unwrap();

    bridge.initialize(&Context::background()).await.unwrap();
    assert!(events
        .wait_for_kind(event_types::BRIDGE_READY, 1, DEFAULT_TIMEOUT)
        .await);
    assert!(events
        .wait_for_kind(event_types::ADAPTER_CONNECTED, 1, DEFAULT_TIMEOUT)
        .await);

    let ready = &events.events_of(event_types::BRIDGE_READY)[0];
    assert_eq!(ready.source, "events");
    assert_eq!(ready.data["failures"], 1);
    assert_eq!(events.events_of(event_types::ADAPTER_CONNECTED)[0].source, "a");

    // Shutdown waits for its own event's handlers
    bridge.shutdown(&Context::background()).await.unwrap();
    assert_eq!(events.count_of(event_types::BRIDGE_SHUTDOWN), 1);
    assert!(bridge.events().is_closed());
}

#[tokio::test]
async fn test_shutdown_waits_for_running_handlers() {
    let bridge = quiet_bridge();
    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();
    bridge.on_event(
        event_types::BRIDGE_SHUTDOWN,
        event_handler(move |_ctx, _event| {
            let flag = flag.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        }),
    );
    bridge.initialize(&Context::background()).await.unwrap();

    bridge.shutdown(&Context::background()).await.unwrap();
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(bridge.events().pending_tasks(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_deadline_reports_stuck_handlers() {
    let bridge = quiet_bridge();
    bridge.on_event(
        event_types::BRIDGE_SHUTDOWN,
        event_handler(|_ctx, _event| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }),
    );
    bridge.initialize(&Context::background()).await.unwrap();

    let ctx = Context::background().with_timeout(Duration::from_millis(100));
    let err = bridge.shutdown(&ctx).await.unwrap_err();
    assert!(err.is_timeout());

    // The bridge is down regardless
    assert!(bridge.list_adapters().is_empty());
    assert!(bridge.shutdown(&Context::background()).await.is_ok());
}

#[tokio::test]
async fn test_failing_handler_does_not_affect_others() {
    let bus = EventBus::new(Duration::from_secs(1), 4, true);
    let seen = Arc::new(AtomicBool::new(false));
    let flag = seen.clone();

    bus.register(
        "custom",
        event_handler(|_ctx, _event| async {
            Err(BridgeError::Transport("handler exploded".into()))
        }),
    );
    bus.register(
        "custom",
        event_handler(move |_ctx, _event| {
            flag.store(true, Ordering::SeqCst);
            async { Ok(()) }
        }),
    );

    assert_eq!(bus.raise(BridgeEvent::new("custom", "test")), 2);
    assert!(wait_for_flag(&seen, DEFAULT_TIMEOUT).await);
    bus.wait_idle(&Context::background()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_handler_timeout_bounds_each_handler() {
    let bus = EventBus::new(Duration::from_millis(100), 4, false);
    let completed = Arc::new(AtomicU32::new(0));
    let counter = completed.clone();
    bus.register(
        "slow",
        event_handler(move |_ctx, _event| {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }),
    );

    bus.raise(BridgeEvent::new("slow", "test"));
    bus.wait_idle(&Context::background()).await.unwrap();
    assert_eq!(completed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_raise_without_handlers() {
    let bus = EventBus::new(Duration::from_secs(1), 1, false);
    assert_eq!(bus.raise(BridgeEvent::new("nobody.listens", "test")), 0);
    assert_eq!(bus.pending_tasks(), 0);
}

#[tokio::test]
async fn test_closed_bus_refuses_events() {
    let bus = EventBus::new(Duration::from_secs(1), 1, false);
    let collector = EventCollector::new();
    bus.register("x", collector.handler());
    assert_eq!(bus.unregister("missing"), 0);

    bus.close();
    assert_eq!(bus.raise(BridgeEvent::new("x", "test")), 0);
    assert_eq!(collector.count(), 0);
}
