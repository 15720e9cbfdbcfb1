//! Live sensor-status channel over WebSocket.
//!
//! Connects to the hub's push endpoint and hands parsed partial status
//! updates to a single consumer, in arrival order, through a bounded
//! [`tokio::sync::mpsc`] channel. Frames that are not
//! `{"status": "success", "data": {...}}` are dropped and counted.
//! Reconnection with exponential backoff + jitter is optional.
//!
//! # Example
//!
//! ```rust,ignore
//! use sensorhub_api::push::{PushChannel, PushOptions};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let url = Url::parse("ws://192.168.100.30:8000/ws/security/")?;
//!
//! let mut handle = PushChannel::open(url, PushOptions::default(), &cancel);
//! while let Some(update) = handle.recv().await {
//!     println!("{} sensors updated", update.sensors.len());
//! }
//!
//! handle.close();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::DEFAULT_AUTH_SCHEME;
use crate::error::Error;
use crate::models::{PushFrame, SensorStatusMap, decode_status_map};

// ── Channel capacity ─────────────────────────────────────────────────

const UPDATE_CHANNEL_CAPACITY: usize = 256;

// ── PushUpdate ───────────────────────────────────────────────────────

/// One accepted push frame: a partial status map for a subset of nodes.
#[derive(Debug, Clone)]
pub struct PushUpdate {
    /// Local receive time.
    pub received_at: DateTime<Utc>,
    /// Node id → remote fields carried by this frame.
    pub sensors: SensorStatusMap,
    /// Entries inside the frame that failed to decode and were skipped.
    pub rejected: usize,
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for push-channel reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── PushOptions ──────────────────────────────────────────────────────

/// Connection options for [`PushChannel::open`].
#[derive(Debug, Clone)]
pub struct PushOptions {
    /// Reconnect policy. `None` means the channel stays down after the
    /// first disconnect; the snapshot poll is then the only source.
    pub reconnect: Option<ReconnectConfig>,

    /// Token sent as `Authorization` on the upgrade request, if the hub
    /// requires one.
    pub token: Option<SecretString>,

    /// Scheme placed in front of the token.
    pub auth_scheme: String,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            reconnect: Some(ReconnectConfig::default()),
            token: None,
            auth_scheme: DEFAULT_AUTH_SCHEME.into(),
        }
    }
}

// ── Counters ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct PushStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

// ── PushChannel ──────────────────────────────────────────────────────

/// Entry point for opening a push subscription.
pub struct PushChannel;

impl PushChannel {
    /// Spawn the connection loop and return its handle.
    ///
    /// Returns immediately; the first connection attempt happens in the
    /// background. The channel is bound to a child of `parent`, so
    /// cancelling the parent closes it as well.
    pub fn open(url: Url, options: PushOptions, parent: &CancellationToken) -> PushHandle {
        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let cancel = parent.child_token();
        let stats = Arc::new(PushStats::default());

        let task = tokio::spawn(push_loop(url, options, tx, cancel.clone(), Arc::clone(&stats)));

        PushHandle {
            rx,
            cancel,
            stats,
            task: Some(task),
        }
    }
}

// ── PushHandle ───────────────────────────────────────────────────────

/// Handle to a running push channel.
///
/// Closing (explicitly, by dropping the handle, or via the parent
/// cancellation token) stops the background task. Once closed, no
/// further update is handed out, even one already buffered.
pub struct PushHandle {
    rx: mpsc::Receiver<PushUpdate>,
    cancel: CancellationToken,
    stats: Arc<PushStats>,
    task: Option<JoinHandle<()>>,
}

impl PushHandle {
    /// Receive the next accepted update in FIFO order.
    ///
    /// Returns `None` once the channel is closed or the connection loop
    /// has given up.
    pub async fn recv(&mut self) -> Option<PushUpdate> {
        let cancel = self.cancel.clone();
        if cancel.is_cancelled() {
            return None;
        }

        let update = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            update = self.rx.recv() => update,
        };

        update.filter(|_| !cancel.is_cancelled())
    }

    /// Hand every update to `callback` on a background task.
    ///
    /// The returned [`PushListener`] owns the channel; closing or
    /// dropping it stops delivery.
    pub fn on_message<F>(mut self, mut callback: F) -> PushListener
    where
        F: FnMut(PushUpdate) + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let stats = Arc::clone(&self.stats);
        let task = tokio::spawn(async move {
            while let Some(update) = self.recv().await {
                if self.cancel.is_cancelled() {
                    break;
                }
                callback(update);
            }
        });

        PushListener {
            cancel,
            stats,
            task: Some(task),
        }
    }

    /// Close the channel. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether [`close`](Self::close) (or a parent cancellation) happened.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Close the channel and wait for the connection loop to exit.
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Frames dropped as malformed or non-success.
    pub fn dropped_frames(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }

    /// Frames accepted and queued for delivery.
    pub fn delivered_frames(&self) -> u64 {
        self.stats.delivered.load(Ordering::Relaxed)
    }
}

impl Drop for PushHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Callback-driven form of a [`PushHandle`], see [`PushHandle::on_message`].
pub struct PushListener {
    cancel: CancellationToken,
    stats: Arc<PushStats>,
    task: Option<JoinHandle<()>>,
}

impl PushListener {
    /// Stop delivery.
    ///
    /// Best-effort: a callback already running, or one whose update was
    /// taken off the channel just before the close, may still complete.
    /// Await [`shutdown`](Self::shutdown) to be sure none is in flight.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Close and wait for the delivery task to finish. No callback runs
    /// after this returns.
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Frames dropped as malformed or non-success.
    pub fn dropped_frames(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for PushListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Background connection loop ───────────────────────────────────────

/// How a single connection ended without a transport error.
enum SessionEnd {
    /// Server closed or the stream ended; a reconnect may follow.
    Disconnected,
    /// Cancelled or the consumer went away; the loop must exit.
    Stopped,
}

/// Main loop: connect → read → on error, backoff → reconnect.
async fn push_loop(
    url: Url,
    options: PushOptions,
    tx: mpsc::Sender<PushUpdate>,
    cancel: CancellationToken,
    stats: Arc<PushStats>,
) {
    let mut attempt: u32 = 0;

    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&url, &options, &tx, &cancel, &stats) => result,
        };

        match result {
            Ok(SessionEnd::Stopped) => break,
            Ok(SessionEnd::Disconnected) => {
                tracing::info!("push channel disconnected");
                attempt = 0;
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "push channel error");
            }
        }

        let Some(reconnect) = options.reconnect.as_ref() else {
            tracing::info!("push channel reconnect disabled, staying down");
            break;
        };

        if let Some(max) = reconnect.max_retries {
            if attempt >= max {
                tracing::error!(max_retries = max, "push channel reconnection limit reached");
                break;
            }
        }

        let delay = calculate_backoff(attempt, reconnect);
        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    tracing::debug!("push channel loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one WebSocket connection and read frames until it drops.
async fn connect_and_read(
    url: &Url,
    options: &PushOptions,
    tx: &mpsc::Sender<PushUpdate>,
    cancel: &CancellationToken,
    stats: &PushStats,
) -> Result<SessionEnd, Error> {
    tracing::info!(url = %url, "connecting push channel");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::PushConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(token) = &options.token {
        request = request.with_header(
            "Authorization",
            format!("{} {}", options.auth_scheme, token.expose_secret()),
        );
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::PushConnect(e.to_string()))?;

    tracing::info!("push channel connected");

    let (_write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(SessionEnd::Stopped),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        let Some(update) = parse_frame(&text) else {
                            stats.dropped.fetch_add(1, Ordering::Relaxed);
                            continue;
                        };
                        stats.delivered.fetch_add(1, Ordering::Relaxed);
                        if tx.send(update).await.is_err() {
                            return Ok(SessionEnd::Stopped);
                        }
                    }
                    Some(Ok(tungstenite::Message::Binary(_))) => {
                        tracing::debug!("dropping binary push frame");
                        stats.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "push channel close frame received"
                            );
                        }
                        return Ok(SessionEnd::Disconnected);
                    }
                    Some(Err(e)) => return Err(Error::PushConnect(e.to_string())),
                    None => return Ok(SessionEnd::Disconnected),
                    // Ping/Pong/Frame: tungstenite answers pings itself
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Parse a text frame into an update, or `None` if it must be dropped.
///
/// Only `status == "success"` frames with a `data` object qualify.
fn parse_frame(text: &str) -> Option<PushUpdate> {
    let frame: PushFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(error = %e, "dropping non-JSON push frame");
            return None;
        }
    };

    if frame.status.as_deref() != Some("success") {
        tracing::debug!(status = ?frame.status, "dropping non-success push frame");
        return None;
    }

    let data = frame.data?;
    match decode_status_map(data) {
        Ok((sensors, rejected)) => Some(PushUpdate {
            received_at: Utc::now(),
            sensors,
            rejected,
        }),
        Err(reason) => {
            tracing::debug!(reason, "dropping push frame with malformed data");
            None
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 +- 0.25)`
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
