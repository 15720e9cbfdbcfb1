// ── Session invalidation ──
//
// An authorization failure from any remote call ends the session: the
// host clears stored credentials and sends the user back to sign-in.
// The guard makes sure that happens once per session, however many
// in-flight calls come back 401.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::CoreError;

/// Host-side reaction to a rejected session.
pub trait SessionInvalidator: Send + Sync {
    fn invalidate(&self);
}

impl<F> SessionInvalidator for F
where
    F: Fn() + Send + Sync,
{
    fn invalidate(&self) {
        self();
    }
}

/// Latching wrapper around a [`SessionInvalidator`].
#[derive(Clone)]
pub struct SessionGuard {
    inner: Arc<GuardInner>,
}

struct GuardInner {
    invalidator: Box<dyn SessionInvalidator>,
    tripped: AtomicBool,
}

impl SessionGuard {
    pub fn new(invalidator: impl SessionInvalidator + 'static) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                invalidator: Box::new(invalidator),
                tripped: AtomicBool::new(false),
            }),
        }
    }

    /// A guard whose invalidation only latches (nothing else runs).
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Invalidate the session unless that already happened. Returns
    /// `true` for the call that actually ran the invalidator.
    pub fn trip(&self) -> bool {
        if self.inner.tripped.swap(true, Ordering::AcqRel) {
            return false;
        }
        tracing::warn!("session rejected by the hub, invalidating");
        self.inner.invalidator.invalidate();
        true
    }

    /// Trip on `Unauthorized`; ignore every other error.
    pub fn observe(&self, err: &CoreError) {
        if err.is_unauthorized() {
            self.trip();
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.inner.tripped.load(Ordering::Acquire)
    }

    /// Re-arm after the user has signed in again.
    pub fn reset(&self) {
        self.inner.tripped.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("tripped", &self.is_tripped())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn invalidates_once_until_reset() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let guard = SessionGuard::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(guard.trip());
        assert!(!guard.trip());
        guard.observe(&CoreError::Unauthorized);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        guard.reset();
        assert!(!guard.is_tripped());
        guard.observe(&CoreError::Unauthorized);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn other_errors_do_not_trip() {
        let guard = SessionGuard::noop();
        guard.observe(&CoreError::Timeout { timeout_secs: 10 });
        guard.observe(&CoreError::NetworkError {
            reason: "refused".into(),
        });
        assert!(!guard.is_tripped());
    }
}
