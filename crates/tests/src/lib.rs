//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置到流的装配测试
//! - 基于内存 broker 的端到端测试（无需真实 STOMP 服务）
//! - 订阅差分、节流、路径上限、断线重连等行为回归

#[cfg(test)]
mod contract_tests {
    use contracts::{resolve_topic, vehicle_topic, ConfigVersion, TrackingBlueprint, VehicleId};

    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = ConfigVersion::V1;
    }

    #[test]
    fn test_blueprint_roundtrip_through_loader() {
        let toml = r#"
            vehicles = ["veh-0001", "veh-0002"]

            [broker]
            endpoint = "ws://fleet.local:8080/ws"

            [stream]
            throttle_ms = 50
            max_path = 100
        "#;
        let blueprint =
            config_loader::ConfigLoader::load_from_str(toml, config_loader::ConfigFormat::Toml)
                .unwrap();

        let serialized = config_loader::ConfigLoader::to_toml(&blueprint).unwrap();
        let reparsed: TrackingBlueprint = config_loader::ConfigLoader::load_from_str(
            &serialized,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(reparsed.vehicles, blueprint.vehicles);
        assert_eq!(reparsed.stream.throttle_ms, 50);
        assert_eq!(reparsed.broker.endpoint(), Some("ws://fleet.local:8080/ws"));
    }

    #[test]
    fn test_topic_naming() {
        let id = VehicleId::from("veh-0005");
        assert_eq!(vehicle_topic(&id), "/topic/vehicle/veh-0005");
        assert_eq!(resolve_topic(None, true, None), "/topic/vehicles/all");
        assert_eq!(resolve_topic(Some(&id), false, None), "/topic/vehicles/all");
        assert_eq!(
            resolve_topic(Some(&id), true, Some("/topic/custom")),
            "/topic/custom"
        );
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use broker_client::{MockBroker, MockConfig, MockOperation};
    use contracts::{
        vehicle_topic, BrokerConfig, ManualClock, ReconnectPolicy, StreamConfig, VehicleId,
    };
    use serde_json::json;
    use stream_manager::{
        ConnectionState, LogSurface, MapRenderer, MultiCarStream, StreamBuilder, StreamEvent,
        StreamStatus,
    };
    use tokio::sync::watch;

    const ENDPOINT: &str = "ws://mock.local/ws";
    const WAIT: Duration = Duration::from_secs(5);

    fn stream_config(throttle_ms: u64, max_path: usize) -> StreamConfig {
        StreamConfig {
            throttle_ms,
            max_path,
            request_on_connect: false,
            ..StreamConfig::default()
        }
    }

    fn builder(clock: &ManualClock, stream: StreamConfig) -> StreamBuilder {
        StreamBuilder::new()
            .endpoint(ENDPOINT)
            .stream(stream)
            .clock(Arc::new(clock.clone()))
    }

    /// 等待状态满足条件，超时则测试失败
    async fn wait_until(
        mut status: watch::Receiver<StreamStatus>,
        predicate: impl FnMut(&StreamStatus) -> bool,
    ) -> StreamStatus {
        let current = tokio::time::timeout(WAIT, status.wait_for(predicate))
            .await
            .expect("timed out waiting for stream status")
            .expect("status channel closed")
            .clone();
        current
    }

    async fn wait_seen(status: watch::Receiver<StreamStatus>, n: u64) -> StreamStatus {
        wait_until(status, move |s| s.messages_seen >= n).await
    }

    async fn poll_until(mut condition: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while !condition() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for condition"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn spawn_multi(
        broker: &MockBroker,
        clock: &ManualClock,
        stream: StreamConfig,
        vehicles: &[&str],
    ) -> MultiCarStream {
        let stream = builder(clock, stream)
            .spawn_multi(broker.clone(), vehicles.iter().map(|v| VehicleId::from(*v)))
            .unwrap();
        assert!(stream.wait_for_connection(WAIT).await);
        stream
    }

    /// 每种别名写法都归一化到同一位置
    #[tokio::test]
    async fn test_alias_payloads_resolve_to_same_position() {
        let broker = MockBroker::new();
        let clock = ManualClock::new(1_000);
        let stream = builder(&clock, stream_config(0, 100))
            .spawn_single(broker.clone(), Some("veh-0001".into()))
            .unwrap();
        assert!(stream.wait_for_connection(WAIT).await);

        let payloads = [
            json!({"latitude": 37.5, "longitude": 127.0}),
            json!({"lat": 37.5, "lng": 127.0}),
            json!({"y": 37.5, "x": 127.0}),
            json!({"position": {"lat": 37.5, "lng": 127.0}}),
            json!({"lat": "37.5", "lng": "127.0"}),
        ];
        for (i, payload) in payloads.iter().enumerate() {
            assert_eq!(broker.inject_json(stream.topic(), payload), 1);
            wait_seen(stream.subscribe_status(), i as u64 + 1).await;
        }

        let path = stream.get_path();
        assert_eq!(path.len(), payloads.len());
        assert!(path.iter().all(|p| p.lat == 37.5 && p.lng == 127.0));

        stream.shutdown().await;
    }

    /// 无效位置不改变任何状态
    #[tokio::test]
    async fn test_invalid_payloads_leave_state_unchanged() {
        let broker = MockBroker::new();
        let clock = ManualClock::new(1_000);
        let stream = builder(&clock, stream_config(0, 100))
            .spawn_single(broker.clone(), Some("veh-0001".into()))
            .unwrap();
        assert!(stream.wait_for_connection(WAIT).await);

        broker.inject_json(stream.topic(), &json!({"lat": 10.0, "lng": 20.0, "speed": 5}));
        let before = wait_seen(stream.subscribe_status(), 1).await;
        let path_before = stream.get_path();
        let telemetry_before = stream.last_telemetry();

        let bad: [&[u8]; 5] = [
            br#"{"lat": "abc", "lng": 20.0}"#,
            br#"{"lat": 10.0}"#,
            br#"{"speed": 3}"#,
            br#"not json"#,
            br#"[1, 2]"#,
        ];
        for body in bad {
            broker.inject(stream.topic(), body.to_vec());
        }
        let after = wait_seen(stream.subscribe_status(), 1 + bad.len() as u64).await;

        assert_eq!(after.revision, before.revision);
        assert_eq!(stream.get_path(), path_before);
        assert_eq!(stream.last_telemetry(), telemetry_before);
        assert_eq!(stream.last_point().map(|p| p.lat), Some(10.0));

        stream.shutdown().await;
    }

    /// 节流：跨度 T 内最多 ceil(T / throttle) + 1 个点
    #[tokio::test]
    async fn test_throttle_bounds_accepted_points() {
        let broker = MockBroker::new();
        let clock = ManualClock::new(0);
        let stream = builder(&clock, stream_config(100, 1_000))
            .spawn_single(broker.clone(), Some("veh-0001".into()))
            .unwrap();
        assert!(stream.wait_for_connection(WAIT).await);

        // 30 条消息，间隔 10ms，跨度 290ms
        for i in 0..30u64 {
            broker.inject_json(
                stream.topic(),
                &json!({"lat": 1.0 + i as f64 * 0.001, "lng": 2.0}),
            );
            wait_seen(stream.subscribe_status(), i + 1).await;
            clock.advance(10);
        }

        let accepted = stream.get_path().len();
        assert!(accepted <= 4, "accepted {accepted} points");
        assert_eq!(accepted, 3);

        stream.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_throttle_accepts_everything() {
        let broker = MockBroker::new();
        let clock = ManualClock::new(0);
        let stream = builder(&clock, stream_config(0, 1_000))
            .spawn_single(broker.clone(), Some("veh-0001".into()))
            .unwrap();
        assert!(stream.wait_for_connection(WAIT).await);

        for i in 0..20u64 {
            broker.inject_json(stream.topic(), &json!({"lat": i as f64, "lng": 0.0}));
        }
        wait_seen(stream.subscribe_status(), 20).await;
        assert_eq!(stream.get_path().len(), 20);

        stream.shutdown().await;
    }

    /// 路径长度不超过 max_path，保留最新的点
    #[tokio::test]
    async fn test_path_keeps_most_recent_points() {
        let broker = MockBroker::new();
        let clock = ManualClock::new(0);
        let stream = spawn_multi(&broker, &clock, stream_config(0, 5), &["veh-0001"]).await;
        let topic = vehicle_topic(&"veh-0001".into());

        for i in 0..12u64 {
            broker.inject_json(&topic, &json!({"lat": i as f64, "lng": 0.0}));
        }
        wait_seen(stream.subscribe_status(), 12).await;

        let state = stream.vehicle(&"veh-0001".into()).unwrap();
        let lats: Vec<f64> = state.path.iter().map(|p| p.lat).collect();
        assert_eq!(lats, vec![7.0, 8.0, 9.0, 10.0, 11.0]);
        assert_eq!(state.last_point.map(|p| p.lat), Some(11.0));

        stream.shutdown().await;
    }

    /// {A,B} -> {B,C}：恰好一次取消订阅和一次订阅，B 的订阅不变
    #[tokio::test]
    async fn test_tracked_set_change_is_minimal() {
        let broker = MockBroker::new();
        let clock = ManualClock::new(0);
        let stream = spawn_multi(&broker, &clock, stream_config(0, 100), &["A", "B"]).await;
        assert_eq!(
            broker.active_destinations(),
            vec!["/topic/vehicle/A", "/topic/vehicle/B"]
        );

        broker.inject_json("/topic/vehicle/A", &json!({"lat": 1.0, "lng": 1.0}));
        wait_seen(stream.subscribe_status(), 1).await;
        assert!(stream.vehicle(&"A".into()).is_some());

        let subscription_of = |dest: &str| {
            broker
                .active_subscriptions()
                .into_iter()
                .find(|(_, d)| d == dest)
                .map(|(id, _)| id)
        };
        let a_before = subscription_of("/topic/vehicle/A").unwrap();
        let b_before = subscription_of("/topic/vehicle/B").unwrap();
        broker.clear_operations();

        let diff = stream
            .set_tracked_vehicles(["B".into(), "C".into()])
            .await
            .unwrap();
        assert_eq!(diff.added, vec![VehicleId::from("C")]);
        assert_eq!(diff.removed, vec![VehicleId::from("A")]);
        assert_eq!(diff.unchanged, vec![VehicleId::from("B")]);

        let ops: Vec<MockOperation> = broker
            .operations()
            .into_iter()
            .filter(|op| {
                matches!(
                    op,
                    MockOperation::Subscribe { .. } | MockOperation::Unsubscribe { .. }
                )
            })
            .collect();
        assert_eq!(ops.len(), 2);
        assert!(ops.contains(&MockOperation::Unsubscribe { id: a_before }));
        assert!(ops.iter().any(|op| matches!(
            op,
            MockOperation::Subscribe { destination, .. } if destination == "/topic/vehicle/C"
        )));

        assert_eq!(subscription_of("/topic/vehicle/B"), Some(b_before));
        assert!(stream.vehicle(&"A".into()).is_none());
        assert_eq!(
            stream.tracked_vehicles(),
            vec![VehicleId::from("B"), VehicleId::from("C")]
        );

        stream.shutdown().await;
    }

    /// 已退订的订阅上仍在途的消息被丢弃，不写入状态
    #[tokio::test]
    async fn test_in_flight_message_for_removed_vehicle_dropped() {
        let broker = MockBroker::new();
        let clock = ManualClock::new(0);
        let stream = spawn_multi(&broker, &clock, stream_config(0, 100), &["A", "B"]).await;

        let a_subscription = broker
            .active_subscriptions()
            .into_iter()
            .find(|(_, d)| d == "/topic/vehicle/A")
            .map(|(id, _)| id)
            .unwrap();

        stream
            .set_tracked_vehicles(["B".into(), "C".into()])
            .await
            .unwrap();
        let before = stream.status();

        // A 的旧订阅上迟到的一帧，随后是 B 的一条正常消息
        assert!(broker.inject_on(
            a_subscription,
            "/topic/vehicle/A",
            json!({"lat": 9.0, "lng": 9.0}).to_string(),
        ));
        broker.inject_json("/topic/vehicle/B", &json!({"lat": 1.0, "lng": 2.0}));

        let after = wait_seen(stream.subscribe_status(), before.messages_seen + 1).await;
        assert_eq!(after.messages_seen, before.messages_seen + 1);
        assert_eq!(after.revision, before.revision + 1);
        assert!(stream.vehicle(&"A".into()).is_none());
        assert_eq!(
            stream.vehicle(&"B".into()).and_then(|s| s.last_point).map(|p| p.lat),
            Some(1.0)
        );
        assert!(!stream.vehicle_data().contains_key(&VehicleId::from("A")));

        stream.shutdown().await;
    }

    /// 关闭后：没有订阅，注入的消息无处投递，状态清空
    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let broker = MockBroker::new();
        let clock = ManualClock::new(0);
        let stream =
            spawn_multi(&broker, &clock, stream_config(0, 100), &["veh-0001", "veh-0002"]).await;

        broker.inject_json("/topic/vehicle/veh-0001", &json!({"lat": 1.0, "lng": 1.0}));
        wait_seen(stream.subscribe_status(), 1).await;

        stream.shutdown().await;
        let status = stream.status();

        assert!(broker.active_subscriptions().is_empty());
        assert!(broker.operations().contains(&MockOperation::Disconnect));
        assert_eq!(
            broker.inject_json("/topic/vehicle/veh-0001", &json!({"lat": 2.0, "lng": 2.0})),
            0
        );
        assert!(stream.vehicle_data().is_empty());
        assert!(!stream.connected());
        assert_eq!(status.connection, ConnectionState::Disconnected);
        assert_eq!(status.subscriptions, 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stream.status().messages_seen, status.messages_seen);

        // 幂等
        stream.shutdown().await;
    }

    /// 未配置 endpoint：不连接，不报错
    #[tokio::test]
    async fn test_unset_endpoint_never_connects() {
        let broker = MockBroker::new();
        let stream = StreamBuilder::new()
            .spawn_single(broker.clone(), Some("veh-0001".into()))
            .unwrap();

        assert!(!stream.wait_for_connection(Duration::from_millis(200)).await);
        assert_eq!(broker.connect_attempts(), 0);
        assert!(!stream.connected());
        assert_eq!(stream.status().connection, ConnectionState::Disconnected);

        // 断开时发布是空操作
        stream.publish(&json!({"vehicleId": "veh-0001"}));
        assert!(broker.sent().is_empty());

        stream.shutdown().await;
    }

    /// veh-0005，throttle 100ms：相隔 10ms 的两条消息只保留第一条
    #[tokio::test]
    async fn test_second_message_within_throttle_window_dropped() {
        let broker = MockBroker::new();
        let clock = ManualClock::new(5_000);
        let stream = builder(&clock, stream_config(100, 100))
            .spawn_single(broker.clone(), Some("veh-0005".into()))
            .unwrap();
        assert!(stream.wait_for_connection(WAIT).await);
        assert_eq!(stream.topic(), "/topic/vehicle/veh-0005");

        broker.inject_json(stream.topic(), &json!({"lat": 37.1, "lng": 127.1}));
        wait_seen(stream.subscribe_status(), 1).await;
        clock.advance(10);
        broker.inject_json(stream.topic(), &json!({"lat": 37.2, "lng": 127.2}));
        wait_seen(stream.subscribe_status(), 2).await;

        assert_eq!(stream.get_path().len(), 1);
        let last = stream.last_point().unwrap();
        assert_eq!((last.lat, last.lng), (37.1, 127.1));

        stream.shutdown().await;
    }

    /// 负载中的 vehicleId 与订阅不一致时按 topic 归属
    #[tokio::test]
    async fn test_payload_vehicle_mismatch_routes_by_topic() {
        let broker = MockBroker::new();
        let clock = ManualClock::new(0);
        let stream =
            spawn_multi(&broker, &clock, stream_config(0, 100), &["veh-0001", "veh-0002"]).await;
        let mut events = stream.subscribe_events();

        broker.inject_json(
            "/topic/vehicle/veh-0002",
            &json!({"vehicleId": "veh-9999", "lat": 3.0, "lng": 4.0}),
        );
        wait_seen(stream.subscribe_status(), 1).await;

        // 不一致被记录为独立事件
        let mismatch = loop {
            let event = tokio::time::timeout(WAIT, events.recv())
                .await
                .expect("timed out waiting for mismatch event")
                .unwrap();
            if let StreamEvent::VehicleMismatch { vehicle_id, reported } = event {
                break (vehicle_id, reported);
            }
        };
        assert_eq!(
            mismatch,
            (VehicleId::from("veh-0002"), VehicleId::from("veh-9999"))
        );

        let state = stream.vehicle(&"veh-0002".into()).unwrap();
        assert_eq!(state.last_point.map(|p| p.lat), Some(3.0));
        assert!(stream.vehicle(&"veh-9999".into()).is_none());
        assert!(stream.vehicle(&"veh-0001".into()).is_none());

        stream.shutdown().await;
    }

    /// 连接后为每辆车发布一次数据请求
    #[tokio::test]
    async fn test_request_on_connect_publishes_per_vehicle() {
        let broker = MockBroker::new();
        let clock = ManualClock::new(42);
        let config = StreamConfig {
            request_on_connect: true,
            ..stream_config(0, 100)
        };
        let stream = spawn_multi(&broker, &clock, config, &["veh-0001", "veh-0002"]).await;

        let sent = broker.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.destination == "/app/telemetry"));
        let body: serde_json::Value = serde_json::from_str(&sent[0].body).unwrap();
        assert_eq!(body["carId"], "veh-0001");
        assert_eq!(body["timestamp"], 42);

        stream.shutdown().await;
    }

    fn fast_reconnect(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay_ms: 10,
            max_delay_ms: 20,
            multiplier: 2.0,
            max_attempts,
        }
    }

    /// 首次连接失败后按退避重连，掉线后重新建立全部订阅
    #[tokio::test]
    async fn test_reconnect_restores_subscriptions() {
        let broker = MockBroker::with_config(MockConfig {
            fail_first_connects: 1,
            ..MockConfig::default()
        });
        let clock = ManualClock::new(0);
        let stream = builder(&clock, stream_config(0, 100))
            .broker(BrokerConfig {
                reconnect: Some(fast_reconnect(5)),
                ..BrokerConfig::with_endpoint(ENDPOINT)
            })
            .spawn_multi(broker.clone(), ["veh-0001".into(), "veh-0002".into()])
            .unwrap();

        assert!(stream.wait_for_connection(WAIT).await);
        assert_eq!(broker.connect_attempts(), 2);
        let destinations = broker.active_destinations();
        assert_eq!(destinations.len(), 2);

        broker.inject_json("/topic/vehicle/veh-0001", &json!({"lat": 1.0, "lng": 1.0}));
        wait_seen(stream.subscribe_status(), 1).await;

        broker.drop_connection();
        poll_until(|| broker.connect_attempts() == 3 && broker.is_connected()).await;
        wait_until(stream.subscribe_status(), |s| {
            s.connected() && s.subscriptions == 2
        })
        .await;

        assert_eq!(broker.active_destinations(), destinations);
        // 掉线不清空已有轨迹
        assert!(stream.vehicle(&"veh-0001".into()).is_some());

        broker.inject_json("/topic/vehicle/veh-0002", &json!({"lat": 2.0, "lng": 2.0}));
        wait_seen(stream.subscribe_status(), 2).await;
        assert!(stream.vehicle(&"veh-0002".into()).is_some());

        stream.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnect_gives_up_after_max_attempts() {
        let broker = MockBroker::with_config(MockConfig {
            fail_all_connects: true,
            ..MockConfig::default()
        });
        let stream = StreamBuilder::new()
            .broker(BrokerConfig {
                reconnect: Some(fast_reconnect(2)),
                ..BrokerConfig::with_endpoint(ENDPOINT)
            })
            .spawn_single(broker.clone(), None)
            .unwrap();

        // 首次连接 + 两次重试
        poll_until(|| broker.connect_attempts() == 3).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(broker.connect_attempts(), 3);
        assert_eq!(stream.status().connection, ConnectionState::Disconnected);

        stream.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_reconnect_without_policy() {
        let broker = MockBroker::new();
        let clock = ManualClock::new(0);
        let stream = spawn_multi(&broker, &clock, stream_config(0, 100), &["veh-0001"]).await;

        broker.drop_connection();
        wait_until(stream.subscribe_status(), |s| {
            s.connection == ConnectionState::Disconnected
        })
        .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(broker.connect_attempts(), 1);

        stream.shutdown().await;
    }

    /// 连接后 stale_after_ms 内无新数据则告警，收到数据后解除
    #[tokio::test]
    async fn test_staleness_warning_raised_and_cleared() {
        let broker = MockBroker::new();
        let clock = ManualClock::new(0);
        let config = StreamConfig {
            stale_after_ms: 200,
            ..stream_config(0, 100)
        };
        let stream = spawn_multi(&broker, &clock, config, &["veh-0001"]).await;
        assert!(!stream.data_timeout_warning());

        clock.advance(300);
        wait_until(stream.subscribe_status(), |s| s.data_timeout_warning).await;

        broker.inject_json("/topic/vehicle/veh-0001", &json!({"lat": 1.0, "lng": 1.0}));
        let status = wait_until(stream.subscribe_status(), |s| !s.data_timeout_warning).await;
        assert_eq!(status.messages_seen, 1);

        stream.shutdown().await;
    }

    /// 配置文件 -> 流 -> 地图渲染
    #[tokio::test]
    async fn test_blueprint_stream_renders_markers() {
        let toml = r#"
            vehicles = ["veh-0001", "veh-0002"]

            [broker]
            endpoint = "ws://mock.local/ws"

            [stream]
            throttle_ms = 0
            request_on_connect = false
        "#;
        let blueprint =
            config_loader::ConfigLoader::load_from_str(toml, config_loader::ConfigFormat::Toml)
                .unwrap();
        let broker = MockBroker::new();
        let stream = StreamBuilder::from_blueprint(&blueprint)
            .spawn_multi(broker.clone(), blueprint.vehicles.clone())
            .unwrap();
        assert!(stream.wait_for_connection(WAIT).await);
        assert!(broker
            .operations()
            .contains(&MockOperation::Connect {
                endpoint: ENDPOINT.to_string()
            }));

        for (i, lat) in [1.0, 1.1, 1.2].into_iter().enumerate() {
            broker.inject_json("/topic/vehicle/veh-0001", &json!({"lat": lat, "lng": 0.0}));
            wait_seen(stream.subscribe_status(), i as u64 + 1).await;
        }
        broker.inject_json("/topic/vehicle/veh-0002", &json!({"lat": 5.0, "lng": 5.0}));
        wait_seen(stream.subscribe_status(), 4).await;

        let mut renderer = MapRenderer::new(LogSurface::new());
        renderer.sync(&stream.vehicle_data());
        assert_eq!(renderer.rendered(), 2);

        stream
            .set_tracked_vehicles(["veh-0002".into()])
            .await
            .unwrap();
        renderer.sync(&stream.vehicle_data());
        assert_eq!(renderer.rendered(), 1);

        stream.shutdown().await;
        renderer.sync(&stream.vehicle_data());
        assert_eq!(renderer.rendered(), 0);
    }

    /// 归一化计数与流共享
    #[tokio::test]
    async fn test_shared_normalizer_counters() {
        let normalizer = ingestion::TelemetryNormalizer::new();
        let broker = MockBroker::new();
        let clock = ManualClock::new(0);
        let stream = builder(&clock, stream_config(0, 100))
            .normalizer(normalizer.clone())
            .spawn_multi(broker.clone(), ["veh-0001".into()])
            .unwrap();
        assert!(stream.wait_for_connection(WAIT).await);

        broker.inject_json("/topic/vehicle/veh-0001", &json!({"lat": 1.0, "lng": 1.0}));
        broker.inject("/topic/vehicle/veh-0001", b"{}".to_vec());
        wait_seen(stream.subscribe_status(), 2).await;

        let snapshot = normalizer.metrics().snapshot();
        assert_eq!(snapshot.received, 2);
        assert_eq!(snapshot.normalized, 1);
        assert_eq!(snapshot.rejected(), 1);
        // 无 timestamp 字段，使用接收时间
        assert_eq!(snapshot.timestamp_fallbacks, 1);

        stream.shutdown().await;
    }

    /// 事件流驱动统计聚合
    #[tokio::test]
    async fn test_events_feed_metrics_aggregator() {
        use observability::StreamMetricsAggregator;

        let broker = MockBroker::new();
        let clock = ManualClock::new(0);
        let stream = builder(&clock, stream_config(100, 100))
            .spawn_single(broker.clone(), Some("veh-0003".into()))
            .unwrap();
        let mut events = stream.subscribe_events();
        assert!(stream.wait_for_connection(WAIT).await);

        broker.inject_json(stream.topic(), &json!({"lat": 1.0, "lng": 1.0, "speed": 36}));
        wait_seen(stream.subscribe_status(), 1).await;
        clock.advance(10);
        broker.inject_json(stream.topic(), &json!({"lat": 1.1, "lng": 1.1}));
        broker.inject(stream.topic(), b"{}".to_vec());

        let mut aggregator = StreamMetricsAggregator::new();
        let mut data_events = 0;
        while data_events < 3 {
            let event = tokio::time::timeout(WAIT, events.recv())
                .await
                .expect("timed out waiting for stream event")
                .unwrap();
            match event {
                StreamEvent::Accepted {
                    vehicle_id,
                    point,
                    at_ms,
                } => {
                    aggregator.on_received(&vehicle_id);
                    aggregator.on_accepted(&vehicle_id, &point, at_ms);
                }
                StreamEvent::Throttled { vehicle_id } => {
                    aggregator.on_received(&vehicle_id);
                    aggregator.on_throttled(&vehicle_id);
                }
                StreamEvent::Rejected { vehicle_id, .. } => {
                    aggregator.on_received(&vehicle_id);
                    aggregator.on_rejected(&vehicle_id);
                }
                _ => continue,
            }
            data_events += 1;
        }

        let summary = aggregator.summary();
        assert_eq!(summary.total_received, 3);
        assert_eq!(summary.total_accepted, 1);
        assert_eq!(summary.total_throttled, 1);
        assert_eq!(summary.total_rejected, 1);
        assert_eq!(summary.vehicles.len(), 1);
        assert_eq!(summary.vehicles[0].vehicle_id, VehicleId::from("veh-0003"));

        stream.shutdown().await;
    }
}
