//! Graceful shutdown coordination
//!
//! One coordinator is built at startup and handed to every adapter and to the
//! signal handler. Connection tokens are children of its root token, so a
//! force-close reaches every live connection at once.

use crate::mcp::broadcaster::Broadcaster;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    requested: CancellationToken,
    root: CancellationToken,
    draining: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Marks one in-flight invocation; dropping it ends the invocation
#[derive(Debug)]
pub struct InFlightGuard {
    coordinator: Arc<ShutdownCoordinator>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.coordinator.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.coordinator.idle.notify_waiters();
        }
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Ask for shutdown (signal, stdin EOF); idempotent
    pub fn begin_shutdown(&self) {
        if !self.requested.is_cancelled() {
            info!("Shutdown requested");
        }
        self.requested.cancel();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.is_cancelled()
    }

    /// Resolves once shutdown has been requested
    pub async fn shutdown_requested(&self) {
        self.requested.cancelled().await
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Token for a new connection; cancelled on force-close
    pub fn connection_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Resolves when connections are being force-closed
    pub async fn closed(&self) {
        self.root.cancelled().await
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Register an invocation; `None` once draining has started
    pub fn track(self: &Arc<Self>) -> Option<InFlightGuard> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard {
            coordinator: self.clone(),
        };
        if self.is_draining() {
            return None;
        }
        Some(guard)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting work, wait for in-flight invocations up to `timeout`,
    /// then force-close every connection and empty the broadcaster.
    ///
    /// Returns true if everything finished before the timeout.
    pub async fn drain(&self, broadcaster: &Broadcaster, timeout: Duration) -> bool {
        self.requested.cancel();
        self.draining.store(true, Ordering::SeqCst);
        broadcaster.broadcast("shutdown", &json!({ "reason": "gateway is shutting down" }));

        let in_flight = self.in_flight();
        info!("Draining {} in-flight invocations (timeout {:?})", in_flight, timeout);

        let drained = tokio::time::timeout(timeout, self.wait_idle()).await.is_ok();
        if !drained {
            warn!(
                "Drain timeout reached with {} invocations still running; force-closing",
                self.in_flight()
            );
        }

        self.root.cancel();
        broadcaster.clear();
        info!("All connections closed");
        drained
    }
}
