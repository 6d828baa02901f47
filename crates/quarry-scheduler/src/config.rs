use std::time::Duration;

/// Scheduler sizing and retention.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub(crate) max_concurrent: usize,
    pub(crate) max_queue_depth: usize,
    pub(crate) ticket_retention: Duration,
    pub(crate) sweep_interval: Duration,
}

impl SchedulerConfig {
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::new()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfigBuilder::new().build()
    }
}

/// Builder for [`SchedulerConfig`].
pub struct SchedulerConfigBuilder {
    max_concurrent: usize,
    max_queue_depth: usize,
    ticket_retention: Duration,
    sweep_interval: Duration,
}

impl SchedulerConfigBuilder {
    pub fn new() -> Self {
        Self {
            max_concurrent: 5,
            max_queue_depth: 1000,
            ticket_retention: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
        }
    }

    /// Global cap on concurrently executing tickets.
    ///
    /// Default: 5
    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }

    /// Pending tickets beyond this are rejected at creation.
    ///
    /// Default: 1000
    pub fn max_queue_depth(mut self, n: usize) -> Self {
        self.max_queue_depth = n.max(1);
        self
    }

    /// Terminal tickets older than this (by creation time) are swept.
    ///
    /// Default: 1 hour
    pub fn ticket_retention(mut self, d: Duration) -> Self {
        self.ticket_retention = d;
        self
    }

    /// How often the garbage-collection sweep runs.
    ///
    /// Default: 60 seconds
    pub fn sweep_interval(mut self, d: Duration) -> Self {
        self.sweep_interval = d;
        self
    }

    pub fn build(self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent: self.max_concurrent,
            max_queue_depth: self.max_queue_depth,
            ticket_retention: self.ticket_retention,
            sweep_interval: self.sweep_interval,
        }
    }
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
