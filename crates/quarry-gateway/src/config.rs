use quarry_core::{EventListener, EventListeners};
use quarry_pool::PoolConfig;
use std::time::Duration;

use crate::monitor::HealthAlert;

/// Configuration for the connection manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Template for each lazily-created per-account pool.
    pub(crate) pool: PoolConfig,
    /// Query deadline when the caller passes none.
    pub(crate) default_timeout: Duration,
}

impl ManagerConfig {
    pub fn builder() -> ManagerConfigBuilder {
        ManagerConfigBuilder::new()
    }

    pub(crate) fn borrow_timeout(&self) -> Duration {
        self.pool.connect_timeout()
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfigBuilder::new().build()
    }
}

/// Builder for [`ManagerConfig`].
pub struct ManagerConfigBuilder {
    pool: PoolConfig,
    default_timeout: Duration,
}

impl ManagerConfigBuilder {
    pub fn new() -> Self {
        Self {
            pool: PoolConfig::default(),
            default_timeout: Duration::from_secs(30),
        }
    }

    /// Pool sizing/timing applied to every account.
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Query deadline when the caller passes none.
    ///
    /// Default: 30 seconds
    pub fn default_timeout(mut self, d: Duration) -> Self {
        self.default_timeout = d;
        self
    }

    pub fn build(self) -> ManagerConfig {
        ManagerConfig {
            pool: self.pool,
            default_timeout: self.default_timeout,
        }
    }
}

impl Default for ManagerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the health monitor.
pub struct MonitorConfig {
    pub(crate) check_interval: Duration,
    pub(crate) probe_timeout: Duration,
    pub(crate) slow_probe_threshold: Duration,
    pub(crate) ewma_alpha: f64,
    pub(crate) degraded_score: f64,
    pub(crate) critical_score: f64,
    pub(crate) max_failure_rate: f64,
    pub(crate) min_available_accounts: usize,
    pub(crate) window: usize,
    pub(crate) listeners: EventListeners<HealthAlert>,
}

impl MonitorConfig {
    pub fn builder() -> MonitorConfigBuilder {
        MonitorConfigBuilder::new()
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfigBuilder::new().build()
    }
}

/// Builder for [`MonitorConfig`].
pub struct MonitorConfigBuilder {
    check_interval: Duration,
    probe_timeout: Duration,
    slow_probe_threshold: Duration,
    ewma_alpha: f64,
    degraded_score: f64,
    critical_score: f64,
    max_failure_rate: f64,
    min_available_accounts: usize,
    window: usize,
    listeners: EventListeners<HealthAlert>,
}

impl MonitorConfigBuilder {
    pub fn new() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(1),
            slow_probe_threshold: Duration::from_millis(500),
            ewma_alpha: 0.3,
            degraded_score: 70.0,
            critical_score: 30.0,
            max_failure_rate: 0.2,
            min_available_accounts: 1,
            window: 20,
            listeners: EventListeners::new(),
        }
    }

    /// How often every account is probed.
    ///
    /// Default: 30 seconds
    pub fn check_interval(mut self, d: Duration) -> Self {
        self.check_interval = d;
        self
    }

    /// Deadline for one probe, independent of caller deadlines.
    ///
    /// Default: 1 second
    pub fn probe_timeout(mut self, d: Duration) -> Self {
        self.probe_timeout = d;
        self
    }

    /// Probe latency above this discounts the health score even on
    /// success.
    ///
    /// Default: 500 milliseconds
    pub fn slow_probe_threshold(mut self, d: Duration) -> Self {
        self.slow_probe_threshold = d;
        self
    }

    /// EWMA smoothing factor for score updates, in `(0, 1]`.
    ///
    /// Default: 0.3
    pub fn ewma_alpha(mut self, alpha: f64) -> Self {
        self.ewma_alpha = alpha.clamp(0.01, 1.0);
        self
    }

    /// Score below which a `Degraded` alert fires.
    ///
    /// Default: 70
    pub fn degraded_score(mut self, score: f64) -> Self {
        self.degraded_score = score;
        self
    }

    /// Score below which a `Critical` alert fires.
    ///
    /// Default: 30
    pub fn critical_score(mut self, score: f64) -> Self {
        self.critical_score = score;
        self
    }

    /// Probe failure rate (over the monitor window) above which a
    /// `FailureRateExceeded` alert fires.
    ///
    /// Default: 0.2
    pub fn max_failure_rate(mut self, rate: f64) -> Self {
        self.max_failure_rate = rate;
        self
    }

    /// Minimum count of dispatchable accounts before an
    /// `AvailabilityLow` alert fires.
    ///
    /// Default: 1
    pub fn min_available_accounts(mut self, n: usize) -> Self {
        self.min_available_accounts = n;
        self
    }

    /// Probe outcomes remembered per account for the failure-rate alert.
    ///
    /// Default: 20
    pub fn window(mut self, n: usize) -> Self {
        self.window = n.max(1);
        self
    }

    /// Register an alert listener.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<HealthAlert> + 'static,
    {
        self.listeners.add(listener);
        self
    }

    pub fn build(self) -> MonitorConfig {
        MonitorConfig {
            check_interval: self.check_interval,
            probe_timeout: self.probe_timeout,
            slow_probe_threshold: self.slow_probe_threshold,
            ewma_alpha: self.ewma_alpha,
            degraded_score: self.degraded_score,
            critical_score: self.critical_score,
            max_failure_rate: self.max_failure_rate,
            min_available_accounts: self.min_available_accounts,
            window: self.window,
            listeners: self.listeners,
        }
    }
}

impl Default for MonitorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
