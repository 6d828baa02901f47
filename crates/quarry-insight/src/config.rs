use std::time::Duration;

/// Insight store sizing and sweep cadence.
#[derive(Debug, Clone)]
pub struct InsightConfig {
    pub(crate) ring_capacity: usize,
    pub(crate) provenance_capacity: usize,
    pub(crate) ttl_sweep_interval: Duration,
    pub(crate) default_limit: usize,
    pub(crate) created_by: String,
}

impl InsightConfig {
    pub fn builder() -> InsightConfigBuilder {
        InsightConfigBuilder::new()
    }
}

impl Default for InsightConfig {
    fn default() -> Self {
        InsightConfigBuilder::new().build()
    }
}

/// Builder for [`InsightConfig`].
pub struct InsightConfigBuilder {
    ring_capacity: usize,
    provenance_capacity: usize,
    ttl_sweep_interval: Duration,
    default_limit: usize,
    created_by: String,
}

impl InsightConfigBuilder {
    pub fn new() -> Self {
        Self {
            ring_capacity: 100,
            provenance_capacity: 1000,
            ttl_sweep_interval: Duration::from_secs(300),
            default_limit: 100,
            created_by: "quarry".to_string(),
        }
    }

    /// Atoms kept in memory per customer; the oldest is evicted beyond
    /// this.
    ///
    /// Default: 100
    pub fn ring_capacity(mut self, n: usize) -> Self {
        self.ring_capacity = n.max(1);
        self
    }

    /// Provenance records cached locally.
    ///
    /// Default: 1000
    pub fn provenance_capacity(mut self, n: usize) -> Self {
        self.provenance_capacity = n.max(1);
        self
    }

    /// How often expired atoms are swept from the rings.
    ///
    /// Default: 5 minutes
    pub fn ttl_sweep_interval(mut self, d: Duration) -> Self {
        self.ttl_sweep_interval = d;
        self
    }

    /// Query limit when the caller passes none.
    ///
    /// Default: 100
    pub fn default_limit(mut self, n: usize) -> Self {
        self.default_limit = n.max(1);
        self
    }

    /// Writer identity recorded with provenance rows.
    ///
    /// Default: `quarry`
    pub fn created_by(mut self, who: impl Into<String>) -> Self {
        self.created_by = who.into();
        self
    }

    pub fn build(self) -> InsightConfig {
        InsightConfig {
            ring_capacity: self.ring_capacity,
            provenance_capacity: self.provenance_capacity,
            ttl_sweep_interval: self.ttl_sweep_interval,
            default_limit: self.default_limit,
            created_by: self.created_by,
        }
    }
}

impl Default for InsightConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
