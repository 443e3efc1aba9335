//! Per-principal concurrency cap with a bounded wait queue
//!
//! Each principal gets a lane: a semaphore sized to the cap plus a counter of
//! waiters. Once the waiters reach the queue depth, new acquisitions fail
//! immediately instead of piling up.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lane count above which idle lanes are dropped on insert
const PRUNE_THRESHOLD: usize = 4_096;

#[derive(Debug)]
struct Lane {
    semaphore: Arc<Semaphore>,
    queued: AtomicUsize,
}

/// Why a slot could not be obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    /// Cap reached and the wait queue is full
    Backpressure,
    /// The caller went away while waiting
    Cancelled,
}

/// A held execution slot; released on drop.
///
/// Keeps its lane alive so pruning never replaces a lane that still has
/// running handlers.
#[derive(Debug)]
pub struct ConcurrencyPermit {
    _permit: OwnedSemaphorePermit,
    _lane: Arc<Lane>,
}

/// Decrements the waiter count however the wait ends
struct QueueGuard<'a>(&'a AtomicUsize);

impl Drop for QueueGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug)]
pub struct ConcurrencyLimiter {
    per_principal: usize,
    queue_depth: usize,
    lanes: DashMap<String, Arc<Lane>>,
}

impl ConcurrencyLimiter {
    pub fn new(per_principal: usize, queue_depth: usize) -> Self {
        Self {
            per_principal: per_principal.max(1),
            queue_depth,
            lanes: DashMap::new(),
        }
    }

    fn lane(&self, key: &str) -> Arc<Lane> {
        if self.lanes.len() > PRUNE_THRESHOLD {
            self.prune_idle();
        }
        self.lanes
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Lane {
                    semaphore: Arc::new(Semaphore::new(self.per_principal)),
                    queued: AtomicUsize::new(0),
                })
            })
            .clone()
    }

    /// Take a slot for `key`, waiting in the bounded queue if needed
    pub async fn acquire(
        &self,
        key: &str,
        cancellation: &CancellationToken,
    ) -> Result<ConcurrencyPermit, AcquireError> {
        let lane = self.lane(key);

        if let Ok(permit) = lane.semaphore.clone().try_acquire_owned() {
            return Ok(ConcurrencyPermit {
                _permit: permit,
                _lane: lane,
            });
        }

        let depth = self.queue_depth;
        if lane
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |queued| {
                (queued < depth).then_some(queued + 1)
            })
            .is_err()
        {
            debug!(principal = %key, "Concurrency queue full");
            return Err(AcquireError::Backpressure);
        }
        let permit = {
            let _guard = QueueGuard(&lane.queued);
            tokio::select! {
                permit = lane.semaphore.clone().acquire_owned() => permit.map_err(|_| AcquireError::Backpressure),
                _ = cancellation.cancelled() => Err(AcquireError::Cancelled),
            }
        }?;
        Ok(ConcurrencyPermit {
            _permit: permit,
            _lane: lane,
        })
    }

    /// Handlers currently executing for `key`
    pub fn in_flight(&self, key: &str) -> usize {
        self.lanes
            .get(key)
            .map(|lane| self.per_principal - lane.semaphore.available_permits())
            .unwrap_or(0)
    }

    /// Invocations waiting for a slot for `key`
    pub fn queued(&self, key: &str) -> usize {
        self.lanes
            .get(key)
            .map(|lane| lane.queued.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Drop lanes nobody holds or waits on
    fn prune_idle(&self) {
        let per_principal = self.per_principal;
        self.lanes.retain(|_, lane| {
            Arc::strong_count(lane) > 1
                || lane.semaphore.available_permits() < per_principal
                || lane.queued.load(Ordering::Acquire) > 0
        });
    }

    /// Number of principals with a lane
    pub fn lanes(&self) -> usize {
        self.lanes.len()
    }
}
