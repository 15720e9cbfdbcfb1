// ── Monitor ──
//
// Wires the fetcher, push channel, override store and reconciler
// together. Every write to the device map goes through one reconcile
// task fed by an mpsc queue, so writers are applied strictly in arrival
// order and each non-empty change set is published on the bus.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sensorhub_api::transport::{TlsMode, TransportConfig};
use sensorhub_api::{
    ApiClient, DeviceRegistration, Notification, PushChannel, PushHandle, PushOptions,
    ReconnectConfig,
};

use crate::bus::ChangeBus;
use crate::config::{MonitorConfig, TlsVerification};
use crate::convert::remote_batch;
use crate::error::CoreError;
use crate::fetcher::SnapshotFetcher;
use crate::model::{ArmMode, ChangeSet, Device, DeviceConfig, NodeId, SavedDevice, Update};
use crate::overrides::{ApiUplink, KeyValueStore, LocalOverrideStore};
use crate::session::SessionGuard;
use crate::store::Reconciler;
use crate::stream::DeviceStream;

const UPDATE_CHANNEL_SIZE: usize = 256;

// ── SyncStatus ───────────────────────────────────────────────────────

/// Freshness of the device map, observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Syncing,
    Synced { at: DateTime<Utc> },
    /// The last snapshot failed; the map may be stale.
    Degraded { reason: String },
    /// The hub rejected the session token.
    SignedOut,
}

/// A sensor node to register with the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDevice {
    pub node_id: String,
    pub location: String,
    pub sensor_type: String,
}

// ── Queue ────────────────────────────────────────────────────────────

enum Op {
    Apply(Update),
    LoadStored(Vec<(NodeId, DeviceConfig)>),
    Restore(Vec<SavedDevice>),
    Register(SavedDevice),
    Remove(NodeId),
}

struct Envelope {
    op: Op,
    response_tx: Option<oneshot::Sender<ChangeSet>>,
}

// ── Monitor ──────────────────────────────────────────────────────────

/// Live view of one hub's devices.
///
/// Cheaply cloneable via `Arc<MonitorInner>`.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    config: MonitorConfig,
    client: ApiClient,
    fetcher: SnapshotFetcher,
    reconciler: Arc<Reconciler>,
    bus: ChangeBus,
    overrides: LocalOverrideStore,
    session: SessionGuard,
    sync_status: watch::Sender<SyncStatus>,
    update_tx: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Monitor {
    /// Build a monitor and start its reconcile task.
    ///
    /// Must be called from within a Tokio runtime. Does not touch the
    /// network; call [`refresh()`](Self::refresh) or
    /// [`focus()`](Self::focus) for that.
    pub fn new(
        config: MonitorConfig,
        kv: Arc<dyn KeyValueStore>,
        bus: ChangeBus,
        session: SessionGuard,
    ) -> Result<Self, CoreError> {
        let transport = build_transport(&config);
        let client = ApiClient::new(config.api_url.clone(), config.client_id.clone(), &transport)?
            .with_auth_scheme(config.auth_scheme.clone());
        Ok(Self::with_client(config, client, kv, bus, session))
    }

    /// Like [`new()`](Self::new) with a prebuilt API client.
    pub fn with_client(
        config: MonitorConfig,
        client: ApiClient,
        kv: Arc<dyn KeyValueStore>,
        bus: ChangeBus,
        session: SessionGuard,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(config.catalog.clone(), config.merge_policy));
        let uplink = Arc::new(ApiUplink::new(client.clone(), config.token.clone()));
        let overrides = LocalOverrideStore::new(kv).with_uplink(uplink, session.clone());
        let (sync_status, _) = watch::channel(SyncStatus::Idle);
        let (update_tx, update_rx) = mpsc::channel(UPDATE_CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        let reconcile = tokio::spawn(reconcile_task(
            Arc::clone(&reconciler),
            bus.clone(),
            update_rx,
            cancel.clone(),
        ));

        Self {
            inner: Arc::new(MonitorInner {
                config,
                fetcher: SnapshotFetcher::new(client.clone()),
                client,
                reconciler,
                bus,
                overrides,
                session,
                sync_status,
                update_tx,
                cancel,
                task_handles: Mutex::new(vec![reconcile]),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.inner.bus
    }

    pub fn session(&self) -> &SessionGuard {
        &self.inner.session
    }

    pub fn overrides(&self) -> &LocalOverrideStore {
        &self.inner.overrides
    }

    // ── Sync ─────────────────────────────────────────────────────────

    /// Fetch one snapshot and merge it.
    ///
    /// On `Unauthorized` the session guard trips and the map is left
    /// untouched. Any other failure marks the monitor degraded and
    /// restores the saved-device fallback list.
    pub async fn refresh(&self) -> Result<ChangeSet, CoreError> {
        self.set_status(SyncStatus::Syncing);

        match self.inner.fetcher.fetch(&self.inner.config.token).await {
            Ok(batch) => {
                let changes = self.submit(Op::Apply(Update::Snapshot(batch))).await?;
                self.set_status(SyncStatus::Synced { at: Utc::now() });
                debug!(changed = changes.len(), "snapshot merged");
                Ok(changes)
            }
            Err(e) if e.is_unauthorized() => {
                self.inner.session.observe(&e);
                self.set_status(SyncStatus::SignedOut);
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "snapshot failed, using saved devices");
                self.set_status(SyncStatus::Degraded {
                    reason: e.to_string(),
                });
                match self.inner.overrides.saved_devices().await {
                    Ok(saved) if !saved.is_empty() => {
                        self.submit(Op::Restore(saved)).await?;
                    }
                    Ok(_) => {}
                    Err(se) => warn!(error = %se, "cannot read saved devices"),
                }
                Err(e)
            }
        }
    }

    /// Start live monitoring: an immediate refresh, the push channel
    /// (if configured) and the poll timer.
    ///
    /// Only `Unauthorized` fails the call; any other snapshot error
    /// leaves the session running on push frames and saved devices.
    pub async fn focus(&self) -> Result<FocusSession, CoreError> {
        if let Err(e) = self.refresh().await {
            if e.is_unauthorized() {
                return Err(e);
            }
            warn!(error = %e, "initial snapshot failed");
        }

        let cancel = self.inner.cancel.child_token();
        let mut handles = Vec::new();

        if let Some(ws_url) = &self.inner.config.ws_url {
            let options = PushOptions {
                reconnect: self
                    .inner
                    .config
                    .push_reconnect
                    .then(ReconnectConfig::default),
                token: Some(self.inner.config.token.clone()),
                auth_scheme: self.inner.config.auth_scheme.clone(),
            };
            let push = PushChannel::open(ws_url.clone(), options, &cancel);
            handles.push(tokio::spawn(push_task(
                push,
                self.inner.update_tx.clone(),
                cancel.clone(),
            )));
        }

        let interval_secs = self.inner.config.poll_interval_secs;
        if interval_secs > 0 {
            handles.push(tokio::spawn(poll_task(
                self.clone(),
                interval_secs,
                cancel.clone(),
            )));
        }

        info!(
            push = self.inner.config.ws_url.is_some(),
            poll_secs = interval_secs,
            "focus session started"
        );
        Ok(FocusSession { cancel, handles })
    }

    // ── Overrides ────────────────────────────────────────────────────

    /// Persist a partial config for `node_id` and merge it into the map.
    /// Returns the merged stored config.
    pub async fn set_config(
        &self,
        node_id: &str,
        partial: DeviceConfig,
    ) -> Result<DeviceConfig, CoreError> {
        let node_id = parse_node_id(node_id)?;
        let merged = self.inner.overrides.put(&node_id, &partial).await?;
        self.submit(Op::Apply(Update::Override {
            node_id,
            config: merged.clone(),
        }))
        .await?;
        Ok(merged)
    }

    /// Hand every stored override to the reconciler.
    ///
    /// Devices already in the map change now, in one change set. A device
    /// first seen later (by snapshot, push frame or restore) is created
    /// with its stored config already merged.
    pub async fn load_overrides(&self) -> Result<ChangeSet, CoreError> {
        let entries = self.inner.overrides.all().await?;
        debug!(stored = entries.len(), "loading stored overrides");
        self.submit(Op::LoadStored(entries)).await
    }

    // ── Device management ────────────────────────────────────────────

    /// Register a node with the hub and keep it as a removable device.
    /// Returns the hub's confirmation message, if any.
    pub async fn register_device(&self, device: NewDevice) -> Result<Option<String>, CoreError> {
        let node_id = parse_node_id(&device.node_id)?;
        let location = device.location.trim();
        let sensor_type = device.sensor_type.trim();
        if location.is_empty() || sensor_type.is_empty() {
            return Err(CoreError::Rejected {
                message: "location and sensor type are required".into(),
            });
        }

        let registration = DeviceRegistration {
            node_id: node_id.to_string(),
            client_id: self.inner.client.client_id().to_owned(),
            location: location.to_owned(),
            sensor_type: sensor_type.to_owned(),
        };
        let response = self
            .inner
            .client
            .register_device(&self.inner.config.token, &registration)
            .await
            .map_err(CoreError::from)
            .inspect_err(|e| self.inner.session.observe(e))?;

        let saved = SavedDevice::registered(
            node_id.clone(),
            location,
            sensor_type,
            self.inner.reconciler.catalog(),
        );
        self.inner
            .overrides
            .edit_saved_devices(|list| {
                match list.iter_mut().find(|d| d.node_id == node_id) {
                    Some(slot) => *slot = saved.clone(),
                    None => list.push(saved.clone()),
                }
            })
            .await?;
        self.submit(Op::Register(saved)).await?;

        info!(%node_id, "device registered");
        Ok(response.message)
    }

    /// Remove a device from the hub, then from the map, its override and
    /// the saved list, then fetch a fresh snapshot.
    ///
    /// A device neither in the map nor saved is `UnknownDevice` and the
    /// hub is not contacted. A hub that no longer knows the node (404)
    /// does not block the local removal; any other hub error does.
    pub async fn remove_device(&self, node_id: &str) -> Result<ChangeSet, CoreError> {
        let node_id = parse_node_id(node_id)?;
        let in_map = self.inner.reconciler.get(node_id.as_str()).is_some();
        let saved = self.inner.overrides.saved_devices().await?;
        if !in_map && !saved.iter().any(|d| d.node_id == node_id) {
            return Err(CoreError::UnknownDevice {
                node_id: node_id.to_string(),
            });
        }

        match self
            .inner
            .client
            .delete_device(&self.inner.config.token, node_id.as_str())
            .await
        {
            Ok(()) => {}
            Err(sensorhub_api::Error::Api { status: 404, .. }) => {
                debug!(%node_id, "hub no longer knows device");
            }
            Err(e) => {
                let e = CoreError::from(e);
                self.inner.session.observe(&e);
                return Err(e);
            }
        }

        self.inner
            .overrides
            .edit_saved_devices(|list| list.retain(|d| d.node_id != node_id))
            .await?;
        self.inner.overrides.remove(&node_id).await?;
        let changes = self.submit(Op::Remove(node_id.clone())).await?;
        info!(%node_id, "device removed");

        if let Err(e) = self.refresh().await {
            warn!(error = %e, "refresh after removal failed");
        }
        Ok(changes)
    }

    // ── Arm mode ─────────────────────────────────────────────────────

    /// The hub's current arm mode.
    pub async fn arm_mode(&self) -> Result<ArmMode, CoreError> {
        let resp = self
            .inner
            .client
            .get_mode(&self.inner.config.token)
            .await
            .map_err(CoreError::from)
            .inspect_err(|e| self.inner.session.observe(e))?;

        resp.mode_word()
            .and_then(|word| ArmMode::from_str(word).ok())
            .ok_or_else(|| CoreError::MalformedPayload {
                message: format!("unrecognised mode message {:?}", resp.message),
            })
    }

    pub async fn set_arm_mode(&self, mode: ArmMode) -> Result<(), CoreError> {
        self.inner
            .client
            .set_mode(&self.inner.config.token, mode.wire_name())
            .await
            .map_err(CoreError::from)
            .inspect_err(|e| self.inner.session.observe(e))?;
        info!(%mode, "arm mode changed");
        Ok(())
    }

    // ── Catalog endpoints ────────────────────────────────────────────

    /// Sensor type tags the hub accepts for registration.
    pub async fn sensor_types(&self) -> Result<Vec<String>, CoreError> {
        self.inner
            .client
            .list_sensor_types(&self.inner.config.token)
            .await
            .map_err(CoreError::from)
            .inspect_err(|e| self.inner.session.observe(e))
    }

    pub async fn notifications(&self) -> Result<Vec<Notification>, CoreError> {
        self.inner
            .client
            .list_notifications(&self.inner.config.token)
            .await
            .map_err(CoreError::from)
            .inspect_err(|e| self.inner.session.observe(e))
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn sync_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.sync_status.subscribe()
    }

    pub fn devices(&self) -> DeviceStream {
        self.inner.reconciler.subscribe()
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.inner.reconciler.snapshot()
    }

    pub fn device(&self, node_id: &str) -> Option<Arc<Device>> {
        self.inner.reconciler.get(node_id)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Cancel every task (focus sessions included) and wait for them.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        let _ = self.inner.sync_status.send(SyncStatus::Idle);
        debug!("monitor stopped");
    }

    async fn submit(&self, op: Op) -> Result<ChangeSet, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .update_tx
            .send(Envelope {
                op,
                response_tx: Some(tx),
            })
            .await
            .map_err(|_| CoreError::MonitorStopped)?;
        rx.await.map_err(|_| CoreError::MonitorStopped)
    }

    fn set_status(&self, status: SyncStatus) {
        let _ = self.inner.sync_status.send(status);
    }
}

// ── FocusSession ─────────────────────────────────────────────────────

/// A running poll timer and push channel. Ending or dropping it tears
/// both down.
pub struct FocusSession {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl FocusSession {
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop the session and wait for its tasks to finish.
    pub async fn end(mut self) {
        self.cancel.cancel();
        for handle in std::mem::take(&mut self.handles) {
            let _ = handle.await;
        }
        debug!("focus session ended");
    }
}

impl Drop for FocusSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn reconcile_task(
    reconciler: Arc<Reconciler>,
    bus: ChangeBus,
    mut rx: mpsc::Receiver<Envelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let changes = match envelope.op {
                    Op::Apply(update) => reconciler.apply(update),
                    Op::LoadStored(entries) => reconciler.load_stored(entries),
                    Op::Restore(saved) => reconciler.restore(saved),
                    Op::Register(saved) => reconciler.register(saved),
                    Op::Remove(node_id) => reconciler.remove(&node_id),
                };
                bus.publish(&changes);
                if let Some(tx) = envelope.response_tx {
                    let _ = tx.send(changes);
                }
            }
        }
    }
}

/// Forward push frames to the reconcile queue until the session ends.
///
/// A frame already received when the session is dropped is discarded;
/// one already queued is still applied. `FocusSession::end` waits for
/// this task, so nothing is forwarded after it returns.
async fn push_task(
    mut push: PushHandle,
    update_tx: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
) {
    while let Some(update) = push.recv().await {
        if update.sensors.is_empty() {
            continue;
        }
        if cancel.is_cancelled() {
            break;
        }
        let envelope = Envelope {
            op: Op::Apply(Update::Push(remote_batch(update.sensors))),
            response_tx: None,
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            sent = update_tx.send(envelope) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    debug!(dropped = push.dropped_frames(), "push task exiting");
    push.shutdown().await;
}

async fn poll_task(monitor: Monitor, interval_secs: u64, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if monitor.inner.session.is_tripped() {
                    debug!("session signed out, skipping poll");
                    continue;
                }
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = monitor.refresh() => {
                        if let Err(e) = result {
                            warn!(error = %e, "periodic refresh failed");
                        }
                    }
                }
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn parse_node_id(raw: &str) -> Result<NodeId, CoreError> {
    NodeId::parse(raw).map_err(|_| CoreError::UnknownDevice {
        node_id: raw.to_owned(),
    })
}

fn build_transport(config: &MonitorConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.timeout,
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}
