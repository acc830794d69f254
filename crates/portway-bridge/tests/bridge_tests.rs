//! Bridge lifecycle and call path

use async_trait::async_trait;
use parking_lot::Mutex;
use portway_bridge::{
    event_types, Adapter, AdapterStatus, Bridge, BridgeAnnouncement, BridgeConfig, BridgeError, BridgeOptions,
    BridgeStatus, BridgeTarget, Context, DiscoveryClient, ErrorKind, InMemoryMetrics,
    JsonProtocol, Protocol, Result,
};
use portway_test_utils::{CountingProtocol, EventCollector, ScriptedAdapter, DEFAULT_TIMEOUT};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn config() -> BridgeConfig {
    BridgeConfig {
        heartbeat_interval: Duration::ZERO,
        ..Default::default()
    }
}

fn new_bridge(options: BridgeOptions) -> Arc<Bridge> {
    Arc::new(Bridge::new("", options, config()))
}

/// Bridge with an echoing adapter "grpc" and a counted JSON protocol "v1"
async fn ready_bridge() -> (Arc<Bridge>, Arc<ScriptedAdapter>, Arc<CountingProtocol>) {
    let bridge = new_bridge(BridgeOptions::default());
    let adapter = ScriptedAdapter::new("grpc").arc();
    let protocol = CountingProtocol::new(Arc::new(JsonProtocol::named("v1"))).arc();
    bridge.register_adapter("grpc", adapter.clone()).unwrap();
    bridge.register_protocol("v1", protocol.clone()).unwrap();
    bridge.initialize(&Context::background()).await.unwrap();
    (bridge, adapter, protocol)
}

#[tokio::test]
async fn test_echo_call() {
    let (bridge, adapter, protocol) = ready_bridge().await;

    let out = bridge
        .call(
            &Context::background(),
            &BridgeTarget::new("grpc", "v1"),
            "Echo",
            json!("hello"),
        )
        .await
        .unwrap();

    assert_eq!(out, json!("hello"));
    assert_eq!(adapter.send_calls.load(Ordering::SeqCst), 1);
    assert_eq!(protocol.encode_calls.load(Ordering::SeqCst), 1);
    assert_eq!(protocol.decode_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_generated_id() {
    let bridge = new_bridge(BridgeOptions::default());
    assert!(!bridge.id().is_empty());
    assert_eq!(bridge.status(), BridgeStatus::Uninitialized);
}

#[tokio::test]
async fn test_duplicate_registration_keeps_first() {
    let bridge = new_bridge(BridgeOptions::default());
    let first = ScriptedAdapter::new("first").arc();
    bridge.register_adapter("a", first.clone()).unwrap();

    let err = bridge
        .register_adapter("a", ScriptedAdapter::new("second").arc())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(bridge.get_adapter("a").unwrap().name(), "first");

    bridge
        .register_protocol("p", Arc::new(JsonProtocol::new()))
        .unwrap();
    let err = bridge
        .register_protocol("p", Arc::new(JsonProtocol::new()))
        .unwrap_err();
    assert!(matches!(err, BridgeError::AlreadyRegistered { kind: "protocol", .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_single_winner() {
    for _ in 0..20 {
        let bridge = new_bridge(BridgeOptions::default());
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        let tasks: Vec<_> = (0..2)
            .map(|i| {
                let bridge = bridge.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    bridge.register_adapter("a", ScriptedAdapter::new(format!("a{}", i)).arc())
                })
            })
            .collect();

        let mut ok = 0;
        let mut conflicts = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => ok += 1,
                Err(BridgeError::AlreadyRegistered { .. }) => conflicts += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!((ok, conflicts), (1, 1));
        assert_eq!(bridge.list_adapters(), vec!["a".to_string()]);
    }
}

#[tokio::test]
async fn test_call_before_ready_has_no_side_effects() {
    let bridge = new_bridge(BridgeOptions::default());
    let adapter = ScriptedAdapter::new("grpc").arc();
    let protocol = CountingProtocol::new(Arc::new(JsonProtocol::new())).arc();
    bridge.register_adapter("grpc", adapter.clone()).unwrap();
    bridge.register_protocol("v1", protocol.clone()).unwrap();

    let err = bridge
        .call(
            &Context::background(),
            &BridgeTarget::new("grpc", "v1"),
            "Echo",
            json!(1),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::BridgeNotInitialized));
    assert_eq!(err.kind(), ErrorKind::State);
    assert_eq!(adapter.send_calls.load(Ordering::SeqCst), 0);
    assert_eq!(adapter.initialize_calls.load(Ordering::SeqCst), 0);
    assert_eq!(protocol.codec_calls(), 0);
}

#[tokio::test]
async fn test_empty_target_names_fail_validation() {
    let (bridge, adapter, protocol) = ready_bridge().await;
    let ctx = Context::background();

    for target in [BridgeTarget::new("", "v1"), BridgeTarget::new("grpc", "")] {
        let err = bridge.call(&ctx, &target, "Echo", json!(1)).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidTarget(_)));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    assert_eq!(adapter.send_calls.load(Ordering::SeqCst), 0);
    assert_eq!(protocol.codec_calls(), 0);
}

#[tokio::test]
async fn test_missing_adapter_never_encodes() {
    let (bridge, _adapter, protocol) = ready_bridge().await;

    let err = bridge
        .call(
            &Context::background(),
            &BridgeTarget::new("missing", "v1"),
            "Echo",
            json!(1),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::AdapterNotFound(ref name) if name == "missing"));
    assert_eq!(protocol.encode_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_protocol() {
    let (bridge, adapter, _protocol) = ready_bridge().await;
    let err = bridge
        .call(
            &Context::background(),
            &BridgeTarget::new("grpc", "thrift"),
            "Echo",
            json!(1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::ProtocolNotFound(_)));
    assert_eq!(adapter.send_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stage_failures_are_wrapped() {
    let bridge = new_bridge(BridgeOptions::default());
    bridge
        .register_adapter("down", ScriptedAdapter::new("down").failing_send("refused").arc())
        .unwrap();
    bridge
        .register_adapter("garbage", ScriptedAdapter::new("garbage").with_response("<html>").arc())
        .unwrap();
    bridge
        .register_protocol("json", Arc::new(JsonProtocol::new()))
        .unwrap();
    let ctx = Context::background();
    bridge.initialize(&ctx).await.unwrap();

    let err = bridge
        .call(&ctx, &BridgeTarget::new("down", "json"), "Op", json!(1))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Send(_)));
    assert!(err.to_string().starts_with("failed to send message: "));
    assert_eq!(err.kind(), ErrorKind::Transport);

    let err = bridge
        .call(&ctx, &BridgeTarget::new("garbage", "json"), "Op", json!(1))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Decode(_)));
    assert_eq!(err.kind(), ErrorKind::Codec);
}

#[tokio::test(start_paused = true)]
async fn test_default_timeout_applies_without_deadline() {
    let options = BridgeOptions {
        default_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let bridge = new_bridge(options);
    bridge
        .register_adapter("slow", ScriptedAdapter::new("slow").with_send_delay(Duration::from_secs(1)).arc())
        .unwrap();
    bridge
        .register_protocol("json", Arc::new(JsonProtocol::new()))
        .unwrap();
    bridge.initialize(&Context::background()).await.unwrap();
    let target = BridgeTarget::new("slow", "json");

    let err = bridge
        .call(&Context::background(), &target, "Op", json!(1))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(matches!(err, BridgeError::Send(_)));

    // A caller deadline is never replaced by the shorter default
    let ctx = Context::background().with_timeout(Duration::from_secs(5));
    let out = bridge.call(&ctx, &target, "Op", json!(1)).await.unwrap();
    assert_eq!(out, json!(1));
}

#[tokio::test(start_paused = true)]
async fn test_max_concurrency_bounds_calls() {
    let options = BridgeOptions {
        max_concurrency: 1,
        ..Default::default()
    };
    let bridge = new_bridge(options);
    bridge
        .register_adapter("slow", ScriptedAdapter::new("slow").with_send_delay(Duration::from_secs(1)).arc())
        .unwrap();
    bridge
        .register_protocol("json", Arc::new(JsonProtocol::new()))
        .unwrap();
    bridge.initialize(&Context::background()).await.unwrap();
    let target = BridgeTarget::new("slow", "json");

    let first = {
        let bridge = bridge.clone();
        let target = target.clone();
        tokio::spawn(async move {
            bridge
                .call(&Context::background(), &target, "Op", json!("first"))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let ctx = Context::background().with_timeout(Duration::from_millis(100));
    let err = bridge.call(&ctx, &target, "Op", json!("second")).await.unwrap_err();
    assert!(err.is_timeout());

    assert_eq!(first.await.unwrap().unwrap(), json!("first"));
}

#[tokio::test]
async fn test_cancelled_context_is_rejected() {
    let (bridge, adapter, _protocol) = ready_bridge().await;
    let ctx = Context::background();
    ctx.cancel();
    let err = bridge
        .call(&ctx, &BridgeTarget::new("grpc", "v1"), "Echo", json!(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(adapter.send_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_clears_registries() {
    let (bridge, adapter, _protocol) = ready_bridge().await;
    let ctx = Context::background();

    bridge.shutdown(&ctx).await.unwrap();
    bridge.shutdown(&ctx).await.unwrap();

    assert_eq!(bridge.status(), BridgeStatus::ShuttingDown);
    assert_eq!(adapter.shutdown_calls.load(Ordering::SeqCst), 1);
    assert!(bridge.list_adapters().is_empty());
    assert!(bridge.list_protocols().is_empty());

    let err = bridge
        .call(&ctx, &BridgeTarget::new("grpc", "v1"), "Echo", json!(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
}

#[tokio::test]
async fn test_adapter_shutdown_failure_does_not_fail_shutdown() {
    let bridge = new_bridge(BridgeOptions::default());
    let adapter = ScriptedAdapter::new("a").failing_shutdown("stuck").arc();
    bridge.register_adapter("a", adapter.clone()).unwrap();
    bridge.initialize(&Context::background()).await.unwrap();

    bridge.shutdown(&Context::background()).await.unwrap();
    assert_eq!(adapter.shutdown_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shutdown_during_initialize_leaves_nothing_connected() {
    let bridge = new_bridge(BridgeOptions::default());
    let fast = ScriptedAdapter::new("fast").arc();
    let slow = ScriptedAdapter::new("slow").arc();
    slow.set_connect_delay(Duration::from_millis(200));
    bridge.register_adapter("fast", fast.clone()).unwrap();
    bridge.register_adapter("slow", slow.clone()).unwrap();
    let events = EventCollector::new();
    events.attach(&bridge, &[event_types::ADAPTER_CONNECTED]);

    let init = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.initialize(&Context::background()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    bridge.shutdown(&Context::background()).await.unwrap();

    let result = init.await.unwrap();
    assert!(matches!(result, Err(BridgeError::BridgeShuttingDown)));
    assert_eq!(bridge.status(), BridgeStatus::ShuttingDown);
    assert!(bridge.list_adapters().is_empty());

    // The slow connect was abandoned, the fast one was released again
    assert_ne!(slow.status(), AdapterStatus::Connected);
    assert_ne!(fast.status(), AdapterStatus::Connected);
    assert_eq!(slow.shutdown_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fast.shutdown_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fast.disconnect_calls.load(Ordering::SeqCst), 1);
    assert_eq!(events.count_of(event_types::ADAPTER_CONNECTED), 0);
}

#[tokio::test]
async fn test_error_after_shutdown_keeps_bridge_closed() {
    let discovery = Arc::new(RecordingDiscovery::default());
    let bridge = Arc::new(
        Bridge::new("closed", BridgeOptions::default(), config()).with_discovery(discovery.clone()),
    );
    let ctx = Context::background();
    bridge.initialize(&ctx).await.unwrap();
    bridge.shutdown(&ctx).await.unwrap();

    bridge.set_error("late failure");
    assert_eq!(bridge.status(), BridgeStatus::ShuttingDown);
    assert_eq!(bridge.last_error().as_deref(), Some("late failure"));
    assert!(bridge.is_shut_down());

    let err = bridge
        .register_adapter("x", ScriptedAdapter::new("x").arc())
        .unwrap_err();
    assert!(matches!(err, BridgeError::BridgeShuttingDown));
    assert!(matches!(
        bridge.register_protocol("p", Arc::new(JsonProtocol::new())),
        Err(BridgeError::BridgeShuttingDown)
    ));
    assert!(bridge.list_adapters().is_empty());

    // Teardown does not run twice
    bridge.shutdown(&ctx).await.unwrap();
    assert_eq!(discovery.withdrawn.lock().len(), 1);
}

#[tokio::test]
async fn test_error_during_initialize_is_kept() {
    let bridge = new_bridge(BridgeOptions::default());
    let adapter = ScriptedAdapter::new("a").arc();
    adapter.set_connect_delay(Duration::from_millis(100));
    bridge.register_adapter("a", adapter).unwrap();

    let init = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.initialize(&Context::background()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    bridge.set_error("disk full");

    let err = init.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Init);
    assert_eq!(bridge.status(), BridgeStatus::Error);
    assert!(!bridge.is_shut_down());
}

#[tokio::test]
async fn test_init_failures_are_aggregated() {
    let bridge = new_bridge(BridgeOptions::default());
    let good = ScriptedAdapter::new("good").arc();
    bridge.register_adapter("bad1", ScriptedAdapter::new("bad1").failing_init("no cert").arc()).unwrap();
    bridge.register_adapter("bad2", ScriptedAdapter::new("bad2").failing_init("no route").arc()).unwrap();
    bridge.register_adapter("good", good.clone()).unwrap();

    bridge.initialize(&Context::background()).await.unwrap();

    assert_eq!(bridge.status(), BridgeStatus::Ready);
    let errors = bridge.init_errors();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].contains("bad1") && errors[0].contains("no cert"));
    assert!(errors[1].contains("bad2"));
    assert_eq!(bridge.last_error(), Some(errors[1].clone()));

    assert!(bridge.is_connected("good"));
    assert!(!bridge.is_connected("bad1"));
    assert_eq!(good.connect_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_connect_failure_on_initialize_is_recorded() {
    let bridge = new_bridge(BridgeOptions::default());
    let flaky = ScriptedAdapter::new("flaky").arc();
    flaky.fail_next_connects(1);
    bridge.register_adapter("flaky", flaky.clone()).unwrap();

    bridge.initialize(&Context::background()).await.unwrap();
    assert_eq!(bridge.status(), BridgeStatus::Ready);
    assert!(!bridge.is_connected("flaky"));
    assert!(bridge.last_error().unwrap().contains("connection refused"));

    bridge.connect_adapter(&Context::background(), "flaky").await.unwrap();
    assert!(bridge.is_connected("flaky"));
}

#[tokio::test]
async fn test_manual_connect_and_disconnect_raise_events() {
    let bridge = Arc::new(Bridge::new(
        "manual",
        BridgeOptions::default(),
        BridgeConfig {
            heartbeat_interval: Duration::ZERO,
            connect_on_initialize: false,
            ..Default::default()
        },
    ));
    let events = EventCollector::new();
    events.attach(
        &bridge,
        &[event_types::ADAPTER_CONNECTED, event_types::ADAPTER_DISCONNECTED],
    );

    let adapter = ScriptedAdapter::new("ws").arc();
    bridge.register_adapter("ws", adapter.clone()).unwrap();
    let ctx = Context::background();
    bridge.initialize(&ctx).await.unwrap();
    assert!(!bridge.is_connected("ws"));
    assert_eq!(adapter.connect_calls.load(Ordering::SeqCst), 0);

    bridge.connect_adapter(&ctx, "ws").await.unwrap();
    assert!(bridge.is_connected("ws"));
    bridge.disconnect_adapter(&ctx, "ws").await.unwrap();
    assert!(!bridge.is_connected("ws"));

    assert!(events.wait_for_count(2, DEFAULT_TIMEOUT).await);
    assert_eq!(events.count_of(event_types::ADAPTER_CONNECTED), 1);
    assert_eq!(events.events_of(event_types::ADAPTER_DISCONNECTED)[0].source, "ws");

    let err = bridge.connect_adapter(&ctx, "nope").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_connect_adapter_initializes_late_registration() {
    let (bridge, _adapter, _protocol) = ready_bridge().await;
    let late = ScriptedAdapter::new("late").arc();
    bridge.register_adapter("late", late.clone()).unwrap();

    bridge.connect_adapter(&Context::background(), "late").await.unwrap();
    assert_eq!(late.initialize_calls.load(Ordering::SeqCst), 1);
    assert!(bridge.is_connected("late"));

    let out = bridge
        .call(
            &Context::background(),
            &BridgeTarget::new("late", "v1"),
            "Echo",
            json!([1, 2]),
        )
        .await
        .unwrap();
    assert_eq!(out, json!([1, 2]));
}

#[tokio::test]
async fn test_unregister_adapter_disconnects_tracked() {
    let (bridge, adapter, _protocol) = ready_bridge().await;
    let ctx = Context::background();
    bridge.unregister_adapter(&ctx, "grpc").await.unwrap();
    assert_eq!(adapter.disconnect_calls.load(Ordering::SeqCst), 1);
    assert!(bridge.get_adapter("grpc").is_none());
    assert!(bridge.unregister_adapter(&ctx, "grpc").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_metrics_are_recorded() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let bridge = Arc::new(
        Bridge::new("metered", BridgeOptions::default(), config()).with_metrics(metrics.clone()),
    );
    bridge.register_adapter("ok", ScriptedAdapter::new("ok").arc()).unwrap();
    bridge
        .register_adapter("down", ScriptedAdapter::new("down").failing_send("503").arc())
        .unwrap();
    bridge
        .register_protocol("json", Arc::new(JsonProtocol::new()))
        .unwrap();
    let ctx = Context::background();
    bridge.initialize(&ctx).await.unwrap();

    bridge
        .call(&ctx, &BridgeTarget::new("ok", "json"), "Get", json!(1))
        .await
        .unwrap();
    let _ = bridge
        .call(&ctx, &BridgeTarget::new("down", "json"), "Get", json!(1))
        .await;

    assert_eq!(metrics.observation_count("bridge.request_duration"), 2);
    assert_eq!(metrics.counter("errors:adapter=down,operation=Get,protocol=json"), 1);
    assert_eq!(metrics.counter_total("errors"), 1);
}

#[tokio::test]
async fn test_metrics_disabled() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let options = BridgeOptions {
        enable_metrics: false,
        ..Default::default()
    };
    let bridge = Arc::new(Bridge::new("quiet", options, config()).with_metrics(metrics.clone()));
    bridge.register_adapter("ok", ScriptedAdapter::new("ok").arc()).unwrap();
    bridge
        .register_protocol("json", Arc::new(JsonProtocol::new()))
        .unwrap();
    bridge.initialize(&Context::background()).await.unwrap();
    bridge
        .call(&Context::background(), &BridgeTarget::new("ok", "json"), "Get", json!(1))
        .await
        .unwrap();
    assert!(metrics.series().is_empty());
}

#[derive(Default)]
struct RecordingDiscovery {
    announced: Mutex<Vec<BridgeAnnouncement>>,
    withdrawn: Mutex<Vec<String>>,
    fail: bool,
}

#[async_trait]
impl DiscoveryClient for RecordingDiscovery {
    async fn announce(&self, _ctx: &Context, announcement: &BridgeAnnouncement) -> Result<()> {
        if self.fail {
            return Err(BridgeError::Transport("registry unreachable".into()));
        }
        self.announced.lock().push(announcement.clone());
        Ok(())
    }

    async fn withdraw(&self, _ctx: &Context, bridge_id: &str) -> Result<()> {
        self.withdrawn.lock().push(bridge_id.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_discovery_announce_and_withdraw() {
    let discovery = Arc::new(RecordingDiscovery::default());
    let bridge = Arc::new(
        Bridge::new("disc", BridgeOptions::default(), config()).with_discovery(discovery.clone()),
    );
    bridge.register_adapter("grpc", ScriptedAdapter::new("grpc").arc()).unwrap();
    bridge
        .register_protocol("v1", Arc::new(JsonProtocol::new()))
        .unwrap();
    let ctx = Context::background();
    bridge.initialize(&ctx).await.unwrap();

    {
        let announced = discovery.announced.lock();
        assert_eq!(announced.len(), 1);
        assert_eq!(announced[0].bridge_id, "disc");
        assert_eq!(announced[0].adapters, vec!["grpc".to_string()]);
        assert_eq!(announced[0].protocols, vec!["v1".to_string()]);
    }

    bridge.shutdown(&ctx).await.unwrap();
    assert_eq!(*discovery.withdrawn.lock(), vec!["disc".to_string()]);
}

#[tokio::test]
async fn test_discovery_failure_is_not_fatal() {
    let discovery = Arc::new(RecordingDiscovery {
        fail: true,
        ..Default::default()
    });
    let bridge = Arc::new(
        Bridge::new("disc", BridgeOptions::default(), config()).with_discovery(discovery),
    );
    bridge.initialize(&Context::background()).await.unwrap();
    assert_eq!(bridge.status(), BridgeStatus::Ready);
}

#[tokio::test]
async fn test_protocol_accessors() {
    let (bridge, _adapter, _protocol) = ready_bridge().await;
    let protocol = bridge.get_protocol("v1").unwrap();
    assert_eq!(protocol.kind(), "json");
    assert_eq!(protocol.version(), "1.0");
    assert!(bridge.get_protocol("v2").is_none());
    assert_eq!(bridge.get_adapter("grpc").unwrap().kind(), ScriptedAdapter::KIND);
}
