// Monitor wiring tests: wiremock stands in for the hub's REST API and a
// local WebSocket server for the push channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sensorhub_core::{
    ArmMode, ChangeBus, ChangeSet, CoreError, DeviceConfig, EmergencyMode, KeyValueStore, MemoryKv,
    Monitor, MonitorConfig, NewDevice, SessionGuard, SyncStatus,
};

// ── Helpers ─────────────────────────────────────────────────────────

struct Harness {
    server: MockServer,
    monitor: Monitor,
    kv: Arc<MemoryKv>,
    invalidations: Arc<AtomicUsize>,
}

async fn setup() -> Harness {
    setup_with(|_| {}).await
}

async fn setup_with(tweak: impl FnOnce(&mut MonitorConfig)) -> Harness {
    let server = MockServer::start().await;
    let api_url = Url::parse(&format!("{}/api/", server.uri())).unwrap();
    let mut config = MonitorConfig::new(api_url, SecretString::from("abc123".to_owned()));
    config.poll_interval_secs = 0;
    tweak(&mut config);

    let kv = Arc::new(MemoryKv::new());
    let invalidations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invalidations);
    let session = SessionGuard::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let monitor = Monitor::new(config, kv.clone(), ChangeBus::new(), session).unwrap();
    Harness {
        server,
        monitor,
        kv,
        invalidations,
    }
}

async fn mount_snapshot(server: &MockServer, data: Value) {
    Mock::given(method("GET"))
        .and(path("/api/sensor-status/"))
        .and(query_param("client_id", "1"))
        .and(header("authorization", "Token abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": data })))
        .mount(server)
        .await;
}

fn saved_garage_door() -> Value {
    json!([{
        "id": "sensor_12",
        "node_id": "sensor_12",
        "name": "Garage Door",
        "type": "door",
        "connected": false,
        "isRemovable": true
    }])
}

// ── Refresh ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_refresh_merges_snapshot_and_publishes() {
    let h = setup().await;
    mount_snapshot(
        &h.server,
        json!({
            "sensor_01": { "connected": true, "value": 5, "unit": "lux" },
            "sensor_02": { "connected": false }
        }),
    )
    .await;

    let seen = Arc::new(parking_lot::Mutex::new(Vec::<usize>::new()));
    let _sub = {
        let seen = Arc::clone(&seen);
        h.monitor
            .bus()
            .subscribe(move |changes: &ChangeSet| seen.lock().push(changes.len()))
    };

    let changes = h.monitor.refresh().await.unwrap();
    assert_eq!(changes.len(), 2);
    assert!(h.monitor.device("sensor_01").unwrap().connected);
    assert!(matches!(*h.monitor.sync_status().borrow(), SyncStatus::Synced { .. }));

    let again = h.monitor.refresh().await.unwrap();
    assert!(again.is_empty());
    assert_eq!(*seen.lock(), vec![2]);
}

#[tokio::test]
async fn test_unauthorized_snapshot_invalidates_once() {
    let h = setup().await;
    h.kv.set("savedDevices", saved_garage_door()).unwrap();

    Mock::given(method("GET"))
        .and(path("/api/sensor-status/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;

    let first = h.monitor.refresh().await.unwrap_err();
    assert!(matches!(first, CoreError::Unauthorized));
    let second = h.monitor.refresh().await.unwrap_err();
    assert!(matches!(second, CoreError::Unauthorized));

    assert_eq!(h.invalidations.load(Ordering::SeqCst), 1);
    assert!(h.monitor.snapshot().is_empty());
    assert_eq!(*h.monitor.sync_status().borrow(), SyncStatus::SignedOut);
}

#[tokio::test]
async fn test_unreachable_snapshot_restores_saved_devices() {
    let h = setup().await;
    h.kv.set("savedDevices", saved_garage_door()).unwrap();

    Mock::given(method("GET"))
        .and(path("/api/sensor-status/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&h.server)
        .await;

    let err = h.monitor.refresh().await.unwrap_err();
    assert!(err.is_transient(), "expected transient error, got {err:?}");
    assert!(matches!(
        *h.monitor.sync_status().borrow(),
        SyncStatus::Degraded { .. }
    ));

    let door = h.monitor.device("sensor_12").unwrap();
    assert_eq!(door.display_name, "Garage Door");
    assert!(door.removable);
    assert_eq!(h.invalidations.load(Ordering::SeqCst), 0);
}

// ── Overrides ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_set_config_mirrors_connection_state() {
    let h = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/sensor/"))
        .and(header("authorization", "Token abc123"))
        .and(body_json(json!({ "sensor_id": "sensor_01", "state": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&h.server)
        .await;

    let merged = h
        .monitor
        .set_config(
            "sensor_01",
            DeviceConfig {
                connected_override: Some(false),
                ..DeviceConfig::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(merged.connected_override, Some(false));

    let device = h.monitor.device("sensor_01").unwrap();
    assert_eq!(device.config.connected_override, Some(false));
    assert_eq!(device.display_name, "Living Room Motion");
}

#[tokio::test]
async fn test_config_without_connection_state_stays_local() {
    let h = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/sensor/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    h.monitor
        .set_config(
            "sensor_02",
            DeviceConfig {
                emergency_mode: Some(EmergencyMode::Emergency),
                ..DeviceConfig::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(
        h.kv.get("device-sensor_02").unwrap(),
        Some(json!({ "emergencyMode": "Emergency" }))
    );
}

#[tokio::test]
async fn test_uplink_failure_keeps_local_write() {
    let h = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/sensor/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;

    let merged = h
        .monitor
        .set_config(
            "sensor_04",
            DeviceConfig {
                connected_override: Some(true),
                ..DeviceConfig::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(merged.connected_override, Some(true));
    assert_eq!(
        h.kv.get("device-sensor_04").unwrap(),
        Some(json!({ "connected": true }))
    );
    assert_eq!(h.invalidations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unauthorized_uplink_trips_session() {
    let h = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/sensor/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;

    let config = DeviceConfig {
        connected_override: Some(true),
        ..DeviceConfig::default()
    };
    h.monitor.set_config("sensor_04", config.clone()).await.unwrap();
    h.monitor.set_config("sensor_04", config).await.unwrap();

    assert_eq!(h.invalidations.load(Ordering::SeqCst), 1);
    assert!(h.monitor.session().is_tripped());
}

#[tokio::test]
async fn test_load_overrides_only_for_known_devices() {
    let h = setup().await;
    mount_snapshot(&h.server, json!({ "sensor_01": { "connected": true } })).await;
    h.kv.set("device-sensor_01", json!({ "dataType": "Instant" })).unwrap();
    h.kv.set("device-sensor_09", json!({ "usageType": "Bypass" })).unwrap();

    h.monitor.refresh().await.unwrap();
    let changes = h.monitor.load_overrides().await.unwrap();

    assert_eq!(changes.len(), 1);
    assert!(changes.contains("sensor_01"));
    assert!(h.monitor.device("sensor_09").is_none());
}

#[tokio::test]
async fn test_stored_settings_reach_devices_seen_later() {
    let h = setup().await;
    h.kv.set(
        "device-sensor_05",
        json!({ "emergencyMode": "Emergency", "connected": false }),
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/api/sensor-status/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "sensor_01": { "connected": true } } })),
        )
        .up_to_n_times(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sensor-status/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {
            "sensor_01": { "connected": true },
            "sensor_05": { "connected": true, "type": "smoke" }
        } })))
        .mount(&h.server)
        .await;

    h.monitor.refresh().await.unwrap();
    let loaded = h.monitor.load_overrides().await.unwrap();
    assert!(loaded.is_empty());

    let changes = h.monitor.refresh().await.unwrap();
    assert!(changes.contains("sensor_05"));

    let device = h.monitor.device("sensor_05").unwrap();
    assert_eq!(device.config.emergency_mode, Some(EmergencyMode::Emergency));
    assert_eq!(device.config.connected_override, Some(false));
    assert!(device.connected);
    assert!(!device.effective_connected());
}

// ── Device management ───────────────────────────────────────────────

#[tokio::test]
async fn test_register_then_remove_device() {
    let h = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/devices/"))
        .and(body_json(json!({
            "node_id": "sensor_12",
            "client_id": "1",
            "location": "Garage",
            "sensor_type": "door"
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "message": "Device registered" })),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let message = h
        .monitor
        .register_device(NewDevice {
            node_id: "sensor_12".into(),
            location: " Garage ".into(),
            sensor_type: "door".into(),
        })
        .await
        .unwrap();
    assert_eq!(message.as_deref(), Some("Device registered"));

    let device = h.monitor.device("sensor_12").unwrap();
    assert!(device.removable);
    assert_eq!(h.monitor.overrides().saved_devices().await.unwrap().len(), 1);

    h.monitor
        .set_config(
            "sensor_12",
            DeviceConfig {
                emergency_mode: Some(EmergencyMode::Emergency),
                ..DeviceConfig::default()
            },
        )
        .await
        .unwrap();

    Mock::given(method("DELETE"))
        .and(path("/api/devices/sensor_12/"))
        .and(query_param("client_id", "1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&h.server)
        .await;
    mount_snapshot(&h.server, json!({})).await;

    let removed = h.monitor.remove_device("sensor_12").await.unwrap();
    assert_eq!(removed.removed.len(), 1);
    assert!(h.monitor.device("sensor_12").is_none());
    assert!(h.monitor.overrides().saved_devices().await.unwrap().is_empty());
    assert!(h.kv.get("device-sensor_12").unwrap().is_none());

    let err = h.monitor.remove_device("sensor_12").await.unwrap_err();
    assert!(matches!(err, CoreError::UnknownDevice { .. }));
}

#[tokio::test]
async fn test_hub_refusal_keeps_device() {
    let h = setup().await;
    mount_snapshot(&h.server, json!({ "sensor_01": { "connected": true } })).await;
    h.monitor.refresh().await.unwrap();

    Mock::given(method("DELETE"))
        .and(path("/api/devices/sensor_01/"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "error": "Not yours" })))
        .mount(&h.server)
        .await;

    let err = h.monitor.remove_device("sensor_01").await.unwrap_err();
    assert!(matches!(err, CoreError::Rejected { .. }));
    assert!(h.monitor.device("sensor_01").is_some());
    assert_eq!(h.invalidations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unauthorized_removal_trips_session() {
    let h = setup().await;
    mount_snapshot(&h.server, json!({ "sensor_01": { "connected": true } })).await;
    h.monitor.refresh().await.unwrap();

    Mock::given(method("DELETE"))
        .and(path("/api/devices/sensor_01/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;

    let err = h.monitor.remove_device("sensor_01").await.unwrap_err();
    assert!(err.is_unauthorized());
    assert!(h.monitor.device("sensor_01").is_some());
    assert_eq!(h.invalidations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_remove_unknown_device_skips_hub() {
    let h = setup().await;

    let err = h.monitor.remove_device("sensor_42").await.unwrap_err();
    assert!(matches!(err, CoreError::UnknownDevice { .. }));
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_register_requires_location_and_type() {
    let h = setup().await;

    let err = h
        .monitor
        .register_device(NewDevice {
            node_id: "sensor_12".into(),
            location: "  ".into(),
            sensor_type: "door".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Rejected { .. }));
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sensor_types_and_notifications() {
    let h = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/sensor-types/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "sensor_types": ["motion", "door", "smoke"] })),
        )
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/notifications/"))
        .and(query_param("client_id", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 7, "type": "motion", "message": "Motion in Living Room" }
        ])))
        .mount(&h.server)
        .await;

    assert_eq!(
        h.monitor.sensor_types().await.unwrap(),
        vec!["motion", "door", "smoke"]
    );
    let notes = h.monitor.notifications().await.unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind.as_deref(), Some("motion"));
}

// ── Arm mode ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_arm_mode_round_trip() {
    let h = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/mode/"))
        .and(header("authorization", "Token abc123"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "message": "System is in away mode" })),
        )
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/mode/"))
        .and(body_json(json!({ "mode": "stay" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "ok" })))
        .expect(1)
        .mount(&h.server)
        .await;

    assert_eq!(h.monitor.arm_mode().await.unwrap(), ArmMode::Away);
    h.monitor.set_arm_mode(ArmMode::Stay).await.unwrap();
}

#[tokio::test]
async fn test_arm_mode_unreadable_message() {
    let h = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/mode/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "message": "System is in panic mode" })),
        )
        .mount(&h.server)
        .await;

    let err = h.monitor.arm_mode().await.unwrap_err();
    assert!(matches!(err, CoreError::MalformedPayload { .. }));
}

#[tokio::test]
async fn test_unauthorized_mode_change_trips_session() {
    let h = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/mode/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;

    let err = h.monitor.set_arm_mode(ArmMode::Disarm).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(h.invalidations.load(Ordering::SeqCst), 1);
}

// ── Focus ───────────────────────────────────────────────────────────

/// Accept one push connection, send `frames`, then idle until the
/// client goes away.
async fn push_server(frames: Vec<Value>) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        for frame in frames {
            ws.send(Message::text(frame.to_string())).await.unwrap();
        }
        while ws.next().await.is_some() {}
    });

    Url::parse(&format!("ws://{addr}/ws/security/")).unwrap()
}

#[tokio::test]
async fn test_focus_applies_push_frames_and_skips_errors() {
    let ws_url = push_server(vec![
        json!({ "status": "error", "data": { "sensor_01": { "connected": false } } }),
        json!({ "status": "success", "data": { "sensor_02": { "connected": true, "value": 41 } } }),
    ])
    .await;

    let h = setup_with(|config| {
        config.ws_url = Some(ws_url);
        config.push_reconnect = false;
    })
    .await;
    mount_snapshot(&h.server, json!({ "sensor_01": { "connected": true } })).await;

    let session = h.monitor.focus().await.unwrap();
    assert!(session.is_active());
    assert!(h.monitor.device("sensor_01").unwrap().connected);

    let mut devices = h.monitor.devices();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if h.monitor.device("sensor_02").is_some() {
                break;
            }
            devices.changed().await;
        }
    })
    .await
    .expect("push frame never applied");

    assert!(h.monitor.device("sensor_02").unwrap().connected);
    assert!(h.monitor.device("sensor_01").unwrap().connected);

    session.end().await;
    h.monitor.shutdown().await;
}

#[tokio::test]
async fn test_focus_fails_fast_when_signed_out() {
    let h = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/sensor-status/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;

    let err = h.monitor.focus().await.err().unwrap();
    assert!(err.is_unauthorized());
    assert_eq!(h.invalidations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_calls_after_shutdown_report_stopped() {
    let h = setup().await;
    h.monitor.shutdown().await;

    let err = h
        .monitor
        .set_config("sensor_01", DeviceConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::MonitorStopped));
}
