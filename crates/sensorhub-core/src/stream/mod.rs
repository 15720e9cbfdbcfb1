// ── Reactive device streams ──
//
// Whole-map subscriptions over the authoritative device collection.

mod filter;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

pub use filter::DeviceFilter;

use crate::model::Device;

/// A subscription to the device map.
///
/// Provides both point-in-time snapshot access and change notification
/// via [`changed`](Self::changed) or by converting to a `Stream`.
pub struct DeviceStream {
    current: Arc<Vec<Arc<Device>>>,
    receiver: watch::Receiver<Arc<Vec<Arc<Device>>>>,
}

impl DeviceStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<Vec<Arc<Device>>>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation (or the last `changed`).
    pub fn current(&self) -> &Arc<Vec<Arc<Device>>> {
        &self.current
    }

    /// The latest snapshot (may have changed since creation).
    pub fn latest(&self) -> Arc<Vec<Arc<Device>>> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the reconciler has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<Vec<Arc<Device>>>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> DeviceWatchStream {
        DeviceWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
///
/// Yields the current snapshot first, then a new one after every
/// published mutation.
pub struct DeviceWatchStream {
    inner: WatchStream<Arc<Vec<Arc<Device>>>>,
}

impl Stream for DeviceWatchStream {
    type Item = Arc<Vec<Arc<Device>>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
