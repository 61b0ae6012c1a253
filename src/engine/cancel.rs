// Tue Jan 13 2026 - Alex

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Requested from outside the pipeline (user abort, deadline).
    External,
    /// Raised by a worker whose transform failed.
    TransformFailure,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::External => write!(f, "external request"),
            CancelReason::TransformFailure => write!(f, "transform failure"),
        }
    }
}

/// Level-triggered cancellation flag shared by every component of a run.
///
/// Once set it stays set, so anything that starts polling later still sees
/// it. The first reason recorded is the one reported.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    reason: RwLock<Option<CancelReason>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only for the call that actually flipped the flag.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let mut slot = self.inner.reason.write();
        if slot.is_some() {
            return false;
        }
        *slot = Some(reason);
        self.inner.cancelled.store(true, Ordering::SeqCst);
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.inner.reason.read()
    }

    pub fn handle(&self) -> CancelHandle {
        CancelHandle { token: self.clone() }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

/// External view of a run's cancellation signal.
///
/// It can only request an external abort; failure-driven cancellation stays
/// internal to the engine.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn request_cancellation(&self) -> bool {
        let fired = self.token.cancel(CancelReason::External);
        if fired {
            log::warn!("Cancellation requested externally");
        }
        fired
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.reason(), None);

        assert!(token.cancel(CancelReason::TransformFailure));
        assert!(!token.cancel(CancelReason::External));

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some(CancelReason::TransformFailure));
    }

    #[test]
    fn test_handle_is_idempotent() {
        let token = CancellationToken::new();
        let handle = token.handle();

        assert!(handle.request_cancellation());
        assert!(!handle.request_cancellation());
        assert!(handle.is_cancelled());
        assert_eq!(token.reason(), Some(CancelReason::External));
    }

    #[test]
    fn test_visible_across_threads() {
        let token = CancellationToken::new();
        let observer = token.clone();

        let waiter = thread::spawn(move || {
            while !observer.is_cancelled() {
                thread::yield_now();
            }
            observer.reason()
        });

        token.handle().request_cancellation();
        assert_eq!(waiter.join().unwrap(), Some(CancelReason::External));
    }
}
