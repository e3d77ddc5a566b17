//! Concurrency-safe status slot with push notifications.
//!
//! The service tracks exactly one in-flight (or most recent) download.
//! [`StatusStore`] guards that slot with a mutex and broadcasts a full
//! snapshot to subscribers after every mutation, so observers either see
//! the complete old state or the complete new state, never a torn write.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;

use super::types::{
    DownloadStatus, Phase, StatusPatch, ETA_ESTIMATING, RATE_STARTING,
};

/// Buffered snapshots per subscriber before a slow receiver starts lagging.
const NOTIFY_CAPACITY: usize = 64;

/// Acquire the status mutex, recovering from poisoning.
///
/// A panic while holding the lock leaves at worst a stale snapshot, which
/// is preferable to taking the whole service down.
fn resilient_lock(lock: &Mutex<DownloadStatus>) -> MutexGuard<'_, DownloadStatus> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "download::status",
                "status lock was poisoned; recovering possibly-stale data"
            );
            poisoned.into_inner()
        }
    }
}

/// Process-wide download status state.
///
/// Holds a single status slot. All reads go through [`snapshot`] and all
/// writes through [`update`] or [`begin`]; each write publishes the merged
/// snapshot to every subscriber, best-effort and non-blocking.
///
/// [`snapshot`]: StatusStore::snapshot
/// [`update`]: StatusStore::update
/// [`begin`]: StatusStore::begin
pub struct StatusStore {
    slot: Mutex<DownloadStatus>,
    notifier: broadcast::Sender<DownloadStatus>,
}

impl StatusStore {
    /// Create a store holding the Idle default status.
    pub fn new() -> Self {
        let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            slot: Mutex::new(DownloadStatus::default()),
            notifier,
        }
    }

    /// Full copy of the current status, atomic with respect to updates.
    pub fn snapshot(&self) -> DownloadStatus {
        resilient_lock(&self.slot).clone()
    }

    /// Merge the given fields into the current status and publish.
    ///
    /// Fields absent from the patch keep their previous value (sticky).
    /// The publish happens after the lock is released, carrying the fully
    /// merged snapshot; subscribers that lag or have disconnected are
    /// skipped without blocking.
    pub fn update(&self, patch: StatusPatch) -> DownloadStatus {
        let snapshot = {
            let mut status = resilient_lock(&self.slot);
            if let Some(is_active) = patch.is_active {
                status.is_active = is_active;
            }
            if let Some(percent) = patch.percent {
                status.percent = percent;
            }
            if let Some(rate) = patch.rate {
                status.rate = rate;
            }
            if let Some(eta) = patch.eta {
                status.eta = eta;
            }
            if let Some(phase) = patch.phase {
                status.phase = phase;
            }
            if let Some(message) = patch.message {
                status.message = message;
            }
            if let Some(url) = patch.url {
                status.url = url;
            }
            if let Some(target_path) = patch.target_path {
                status.target_path = target_path;
            }
            status.clone()
        };
        self.publish(snapshot.clone());
        snapshot
    }

    /// Reset the slot for a newly accepted request and publish.
    ///
    /// Overwrites any previous terminal status: Preparing phase, percent 0,
    /// starting sentinels for rate and eta, empty message.
    pub fn begin(&self, url: impl Into<String>, target_path: impl Into<String>) -> DownloadStatus {
        let snapshot = {
            let mut status = resilient_lock(&self.slot);
            *status = DownloadStatus {
                is_active: true,
                percent: 0,
                rate: RATE_STARTING.to_string(),
                eta: ETA_ESTIMATING.to_string(),
                phase: Phase::Preparing,
                message: String::new(),
                url: url.into(),
                target_path: target_path.into(),
            };
            status.clone()
        };
        self.publish(snapshot.clone());
        snapshot
    }

    /// Subscribe to status snapshots.
    ///
    /// Delivery is at-most-once per update with no replay: a subscriber
    /// that connects after a publish does not see it.
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadStatus> {
        self.notifier.subscribe()
    }

    /// Fire-and-forget broadcast; absent subscribers are not an error.
    fn publish(&self, snapshot: DownloadStatus) {
        let _ = self.notifier.send(snapshot);
    }
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}
