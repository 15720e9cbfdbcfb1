// Reconciliation scenarios against the public Reconciler and ChangeBus.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use sensorhub_core::{
    ChangeBus, ChangeSet, DataType, DeviceCatalog, DeviceConfig, EmergencyMode, MergePolicy,
    NodeId, Reconciler, RemoteBatch, RemoteDeviceState, SavedDevice, SensorValue, Subscription,
    Update,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn reconciler() -> Reconciler {
    Reconciler::new(DeviceCatalog::default(), MergePolicy::ArrivalOrder)
}

fn id(raw: &str) -> NodeId {
    NodeId::parse(raw).unwrap()
}

fn batch(entries: Vec<(&str, RemoteDeviceState)>) -> RemoteBatch {
    entries
        .into_iter()
        .map(|(id, state)| (id.to_owned(), state))
        .collect()
}

fn reading(connected: bool, value: f64, minute: u32) -> RemoteDeviceState {
    RemoteDeviceState {
        connected: Some(connected),
        sensor_type: None,
        value: Some(SensorValue::Number(value)),
        unit: Some("lux".into()),
        timestamp: Some(Utc.with_ymd_and_hms(2026, 2, 10, 12, minute, 0).unwrap()),
    }
}

fn saved(raw: &str, name: &str) -> SavedDevice {
    SavedDevice {
        node_id: id(raw),
        name: Some(name.into()),
        sensor_type: Some("door".into()),
        connected: false,
        value: None,
        unit: None,
        timestamp: None,
        location: Some("Garage".into()),
    }
}

fn ids(changes: &ChangeSet) -> Vec<&str> {
    changes.ids().map(NodeId::as_str).collect()
}

// ── Merge properties ────────────────────────────────────────────────

#[test]
fn test_identical_snapshot_twice_is_empty_second_time() {
    let r = reconciler();
    let payload = batch(vec![
        ("sensor_01", reading(true, 5.0, 0)),
        ("sensor_02", reading(false, 41.0, 0)),
    ]);

    let first = r.apply(Update::Snapshot(payload.clone()));
    assert_eq!(first.len(), 2);

    let second = r.apply(Update::Snapshot(payload));
    assert!(second.is_empty());
}

#[test]
fn test_snapshot_never_touches_config() {
    let r = reconciler();
    r.apply(Update::Override {
        node_id: id("sensor_04"),
        config: DeviceConfig {
            data_type: Some(DataType::Instant),
            ..DeviceConfig::default()
        },
    });

    r.apply(Update::Snapshot(batch(vec![("sensor_04", reading(true, 1.0, 0))])));

    let device = r.get("sensor_04").unwrap();
    assert_eq!(device.config.data_type, Some(DataType::Instant));
    assert!(device.connected);
}

#[test]
fn test_one_record_per_node_across_sources() {
    let r = reconciler();
    for minute in 0..5 {
        r.apply(Update::Snapshot(batch(vec![("sensor_01", reading(true, 1.0, minute))])));
        r.apply(Update::Push(batch(vec![("sensor_01", reading(false, 2.0, minute))])));
    }

    assert_eq!(r.len(), 1);
    let snapshot = r.snapshot();
    assert_eq!(
        snapshot.iter().filter(|d| d.node_id.as_str() == "sensor_01").count(),
        1
    );
}

#[test]
fn test_snapshot_then_push_scenario() {
    let r = reconciler();

    let first = r.apply(Update::Snapshot(batch(vec![("sensor_01", reading(true, 5.0, 0))])));
    assert_eq!(ids(&first), vec!["sensor_01"]);

    let second = r.apply(Update::Push(batch(vec![("sensor_01", reading(false, 0.0, 1))])));
    assert_eq!(ids(&second), vec!["sensor_01"]);

    let device = r.get("sensor_01").unwrap();
    assert!(!device.connected);
    assert_eq!(device.value, Some(SensorValue::Number(0.0)));
    assert_eq!(
        device.timestamp,
        Some(Utc.with_ymd_and_hms(2026, 2, 10, 12, 1, 0).unwrap())
    );
}

#[test]
fn test_override_survives_following_snapshot() {
    let r = reconciler();
    r.apply(Update::Override {
        node_id: id("sensor_02"),
        config: DeviceConfig {
            emergency_mode: Some(EmergencyMode::Emergency),
            ..DeviceConfig::default()
        },
    });

    let changes = r.apply(Update::Snapshot(batch(vec![("sensor_02", reading(true, 40.0, 0))])));
    assert_eq!(ids(&changes), vec!["sensor_02"]);

    let device = r.get("sensor_02").unwrap();
    assert_eq!(device.config.emergency_mode, Some(EmergencyMode::Emergency));
    assert_eq!(device.display_name, "Kitchen Humidity");
}

#[test]
fn test_malformed_ids_are_skipped_individually() {
    let r = reconciler();
    let changes = r.apply(Update::Push(batch(vec![
        ("", reading(true, 1.0, 0)),
        ("unknown", reading(true, 1.0, 0)),
        ("bad id", reading(true, 1.0, 0)),
        ("sensor_07", reading(true, 21.5, 0)),
    ])));

    assert_eq!(ids(&changes), vec!["sensor_07"]);
    assert_eq!(r.len(), 1);
}

#[test]
fn test_absence_from_snapshot_keeps_record() {
    let r = reconciler();
    r.apply(Update::Snapshot(batch(vec![
        ("sensor_01", reading(true, 1.0, 0)),
        ("sensor_02", reading(true, 2.0, 0)),
    ])));

    let changes = r.apply(Update::Snapshot(batch(vec![("sensor_01", reading(true, 1.0, 0))])));
    assert!(changes.is_empty());
    assert!(r.get("sensor_02").is_some());

    let removed = r.remove(&id("sensor_02"));
    assert_eq!(removed.removed, vec![id("sensor_02")]);
    assert!(r.get("sensor_02").is_none());
    assert!(r.remove(&id("sensor_02")).is_empty());
}

#[test]
fn test_restore_never_overwrites_live_records() {
    let r = reconciler();
    r.apply(Update::Snapshot(batch(vec![("sensor_12", reading(true, 1.0, 0))])));

    let changes = r.restore(vec![saved("sensor_12", "Old Name"), saved("sensor_13", "Shed Door")]);
    assert_eq!(ids(&changes), vec!["sensor_13"]);

    let live = r.get("sensor_12").unwrap();
    assert!(live.connected);
    assert_eq!(live.display_name, "SENSOR 12");
    assert!(!live.removable);

    let restored = r.get("sensor_13").unwrap();
    assert_eq!(restored.display_name, "Shed Door");
    assert!(restored.removable);
}

#[test]
fn test_newest_timestamp_policy_drops_late_snapshot() {
    let r = Reconciler::new(DeviceCatalog::default(), MergePolicy::NewestTimestamp);
    r.apply(Update::Push(batch(vec![("sensor_01", reading(false, 0.0, 5))])));

    let late = r.apply(Update::Snapshot(batch(vec![("sensor_01", reading(true, 5.0, 1))])));
    assert!(late.is_empty());
    assert!(!r.get("sensor_01").unwrap().connected);

    let untimed = RemoteDeviceState {
        connected: Some(true),
        ..RemoteDeviceState::default()
    };
    let applied = r.apply(Update::Push(batch(vec![("sensor_01", untimed)])));
    assert_eq!(ids(&applied), vec!["sensor_01"]);
}

#[test]
fn test_device_stream_sees_applied_batches() {
    let r = reconciler();
    let mut stream = r.subscribe();
    assert!(stream.current().is_empty());

    r.apply(Update::Snapshot(batch(vec![("sensor_01", reading(true, 1.0, 0))])));
    let latest = stream.latest();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].node_id.as_str(), "sensor_01");
}

// ── Change bus ──────────────────────────────────────────────────────

#[test]
fn test_bus_fans_out_in_order_once_each() {
    let bus = ChangeBus::new();
    let r = reconciler();
    let log = Arc::new(Mutex::new(Vec::new()));

    let _subs: Vec<Subscription> = (1..=5)
        .map(|n| {
            let log = Arc::clone(&log);
            bus.subscribe(move |changes: &ChangeSet| {
                log.lock().push((n, changes.len()));
            })
        })
        .collect();

    let changes = r.apply(Update::Snapshot(batch(vec![("sensor_01", reading(true, 1.0, 0))])));
    bus.publish(&changes);

    assert_eq!(*log.lock(), vec![(1, 1), (2, 1), (3, 1), (4, 1), (5, 1)]);
}

#[test]
fn test_self_unsubscribe_during_dispatch_keeps_later_listeners() {
    let bus = ChangeBus::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

    let first = {
        let log = Arc::clone(&log);
        bus.subscribe(move |_: &ChangeSet| log.lock().push("first"))
    };
    let quitter = {
        let log = Arc::clone(&log);
        let slot = Arc::clone(&slot);
        bus.subscribe(move |_: &ChangeSet| {
            log.lock().push("quitter");
            if let Some(sub) = slot.lock().take() {
                sub.unsubscribe();
            }
        })
    };
    *slot.lock() = Some(quitter);
    let last = {
        let log = Arc::clone(&log);
        bus.subscribe(move |_: &ChangeSet| log.lock().push("last"))
    };

    let changes = ChangeSet {
        changed: Vec::new(),
        removed: vec![id("sensor_01")],
    };
    bus.publish(&changes);
    assert_eq!(*log.lock(), vec!["first", "quitter", "last"]);

    log.lock().clear();
    bus.publish(&changes);
    assert_eq!(*log.lock(), vec!["first", "last"]);
    assert_eq!(bus.listener_count(), 2);

    drop((first, last));
}
