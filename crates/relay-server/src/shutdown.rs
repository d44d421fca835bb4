//! Graceful shutdown coordination via `CancellationToken`.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// Default timeout for graceful shutdown before giving up on sessions.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinates graceful shutdown across the listener and every session.
///
/// Sessions are started through [`track`](Self::track) so shutdown can wait
/// for them to release their colors and deregister.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wrap a session future so shutdown waits for it.
    pub fn track<F>(&self, future: F) -> TrackedFuture<F>
    where
        F: Future,
    {
        self.tracker.track_future(future)
    }

    /// Sessions still running.
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token, then wait up to `timeout` for every tracked session
    /// to finish.
    ///
    /// Returns `false` if sessions were still running at the deadline.
    pub async fn graceful_shutdown(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        let _ = self.tracker.close();
        info!(
            task_count = self.tracker.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for sessions to finish"
        );

        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(
                remaining = self.tracker.len(),
                "shutdown timed out after {timeout:?}, some sessions may still be running"
            );
            return false;
        }
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
        assert_eq!(coord.active_tasks(), 0);
    }

    #[test]
    fn token_propagation() {
        let coord = ShutdownCoordinator::new();
        let t1 = coord.token();
        let t2 = coord.token();
        assert!(!t1.is_cancelled());
        coord.shutdown();
        coord.shutdown();
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
    }

    #[tokio::test]
    async fn graceful_shutdown_awaits_tracked_sessions() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let finished = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = finished.clone();

        let _handle = tokio::spawn(coord.track(async move {
            token.cancelled().await;
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        }));
        assert_eq!(coord.active_tasks(), 1);

        assert!(coord.graceful_shutdown(None).await);
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(coord.active_tasks(), 0);
    }

    #[tokio::test]
    async fn tracked_future_does_not_borrow_coordinator() {
        let coord = std::sync::Arc::new(ShutdownCoordinator::new());
        let owned = coord.clone();
        let start = move || {
            let session = async { 42 };
            owned.track(session)
        };

        let handle = tokio::spawn(start());
        assert_eq!(handle.await.unwrap(), 42);
        assert!(coord.graceful_shutdown(Some(Duration::from_secs(1))).await);
    }

    #[tokio::test]
    async fn graceful_shutdown_with_no_sessions() {
        let coord = ShutdownCoordinator::default();
        assert!(coord.graceful_shutdown(Some(Duration::from_millis(50))).await);
        assert!(coord.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_times_out() {
        let coord = ShutdownCoordinator::new();

        // Ignores cancellation.
        let _handle = tokio::spawn(coord.track(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        }));

        assert!(!coord.graceful_shutdown(Some(Duration::from_millis(100))).await);
        assert!(coord.is_shutting_down());
    }
}
