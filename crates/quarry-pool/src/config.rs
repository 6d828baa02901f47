use std::time::Duration;

/// Sizing and timing for one account's pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub(crate) min_size: usize,
    pub(crate) max_size: usize,
    pub(crate) connect_timeout: Duration,
    pub(crate) health_check_interval: Duration,
    pub(crate) health_check_timeout: Duration,
    pub(crate) max_idle_time: Duration,
}

impl PoolConfig {
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    /// Default borrow deadline when the caller does not pass one.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfigBuilder::new().build()
    }
}

/// Builder for [`PoolConfig`].
pub struct PoolConfigBuilder {
    min_size: usize,
    max_size: usize,
    connect_timeout: Duration,
    health_check_interval: Duration,
    health_check_timeout: Duration,
    max_idle_time: Duration,
}

impl PoolConfigBuilder {
    pub fn new() -> Self {
        Self {
            min_size: 2,
            max_size: 15,
            connect_timeout: Duration::from_secs(10),
            health_check_interval: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(5),
            max_idle_time: Duration::from_secs(600),
        }
    }

    /// Sessions the sweep keeps alive even when idle.
    ///
    /// Default: 2
    pub fn min_size(mut self, n: usize) -> Self {
        self.min_size = n;
        self
    }

    /// Hard cap on live sessions (idle + borrowed + connecting).
    ///
    /// Default: 15
    pub fn max_size(mut self, n: usize) -> Self {
        self.max_size = n.max(1);
        self
    }

    /// Default deadline for a borrow, connection setup included.
    ///
    /// Default: 10 seconds
    pub fn connect_timeout(mut self, d: Duration) -> Self {
        self.connect_timeout = d;
        self
    }

    /// How often the background sweep pings and prunes idle sessions.
    ///
    /// Default: 30 seconds
    pub fn health_check_interval(mut self, d: Duration) -> Self {
        self.health_check_interval = d;
        self
    }

    /// Deadline for one sweep ping.
    ///
    /// Default: 5 seconds
    pub fn health_check_timeout(mut self, d: Duration) -> Self {
        self.health_check_timeout = d;
        self
    }

    /// Idle sessions older than this are destroyed, down to `min_size`.
    ///
    /// Default: 10 minutes
    pub fn max_idle_time(mut self, d: Duration) -> Self {
        self.max_idle_time = d;
        self
    }

    pub fn build(self) -> PoolConfig {
        PoolConfig {
            min_size: self.min_size.min(self.max_size),
            max_size: self.max_size,
            connect_timeout: self.connect_timeout,
            health_check_interval: self.health_check_interval,
            health_check_timeout: self.health_check_timeout,
            max_idle_time: self.max_idle_time,
        }
    }
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
