use crate::queue::QueueEvent;
use quarry_core::{EventListener, EventListeners};
use std::path::PathBuf;
use std::time::Duration;

/// Queue sizing, rotation, and durability knobs.
pub struct QueueConfig {
    pub(crate) path: PathBuf,
    pub(crate) max_size: u64,
    pub(crate) max_age: Duration,
    pub(crate) max_events: u64,
    pub(crate) dedup: bool,
    pub(crate) sync_writes: bool,
    pub(crate) listeners: EventListeners<QueueEvent>,
}

impl QueueConfig {
    /// Builder rooted at the queue's base path. The active and rotated
    /// files take their directory, stem, and extension from it, e.g.
    /// `/var/lib/quarry/events.ndjson`.
    pub fn builder(path: impl Into<PathBuf>) -> QueueConfigBuilder {
        QueueConfigBuilder::new(path)
    }
}

/// Builder for [`QueueConfig`].
pub struct QueueConfigBuilder {
    path: PathBuf,
    max_size: u64,
    max_age: Duration,
    max_events: u64,
    dedup: bool,
    sync_writes: bool,
    listeners: EventListeners<QueueEvent>,
}

impl QueueConfigBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_size: 100 * 1024 * 1024,
            max_age: Duration::from_secs(3600),
            max_events: 100_000,
            dedup: true,
            sync_writes: false,
            listeners: EventListeners::new(),
        }
    }

    /// Rotate before an append would reach this file size.
    ///
    /// Default: 100 MiB
    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes.max(1);
        self
    }

    /// Rotate when the active file gets this old.
    ///
    /// Default: 1 hour
    pub fn max_age(mut self, d: Duration) -> Self {
        self.max_age = d;
        self
    }

    /// Events the active file may hold before pushes are rejected with
    /// backpressure.
    ///
    /// Default: 100 000
    pub fn max_events(mut self, n: u64) -> Self {
        self.max_events = n.max(1);
        self
    }

    /// Drop events whose `activity_id` was already accepted. Best-effort:
    /// the seen-set is cleared at 100k entries.
    ///
    /// Default: true
    pub fn dedup(mut self, on: bool) -> Self {
        self.dedup = on;
        self
    }

    /// Force durability (fsync) before each push returns.
    ///
    /// Default: false
    pub fn sync_writes(mut self, on: bool) -> Self {
        self.sync_writes = on;
        self
    }

    /// Register a listener for rotation notifications.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<QueueEvent> + 'static,
    {
        self.listeners.add(listener);
        self
    }

    pub fn build(self) -> QueueConfig {
        QueueConfig {
            path: self.path,
            max_size: self.max_size,
            max_age: self.max_age,
            max_events: self.max_events,
            dedup: self.dedup,
            sync_writes: self.sync_writes,
            listeners: self.listeners,
        }
    }
}
