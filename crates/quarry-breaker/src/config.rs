use crate::breaker::BreakerState;
use crate::events::BreakerEvent;
use quarry_core::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration shared by every breaker in a registry.
pub struct BreakerConfig {
    pub(crate) failure_threshold: u32,
    pub(crate) success_threshold: u32,
    pub(crate) recovery_timeout: Duration,
    pub(crate) time_window: Duration,
    pub(crate) max_backoff: Duration,
    pub(crate) backoff_multiplier: f64,
    pub(crate) event_listeners: EventListeners<BreakerEvent>,
}

impl BreakerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfigBuilder::new().build()
    }
}

/// Builder for [`BreakerConfig`].
pub struct BreakerConfigBuilder {
    failure_threshold: u32,
    success_threshold: u32,
    recovery_timeout: Duration,
    time_window: Duration,
    max_backoff: Duration,
    backoff_multiplier: f64,
    event_listeners: EventListeners<BreakerEvent>,
}

impl BreakerConfigBuilder {
    pub fn new() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(30),
            time_window: Duration::from_secs(600),
            max_backoff: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            event_listeners: EventListeners::new(),
        }
    }

    /// Windowed failures at which the breaker opens.
    ///
    /// Default: 3
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n.max(1);
        self
    }

    /// Half-open successes required to close again.
    ///
    /// Default: 2
    pub fn success_threshold(mut self, n: u32) -> Self {
        self.success_threshold = n.max(1);
        self
    }

    /// Base wait before the first half-open probe after opening.
    /// Consecutive open episodes grow this by `backoff_multiplier`.
    ///
    /// Default: 30 seconds
    pub fn recovery_timeout(mut self, d: Duration) -> Self {
        self.recovery_timeout = d;
        self
    }

    /// Sliding window over which failures count toward the threshold.
    /// Older failures are dropped before the threshold is evaluated.
    ///
    /// Default: 10 minutes
    pub fn time_window(mut self, d: Duration) -> Self {
        self.time_window = d;
        self
    }

    /// Upper bound on the open-state wait, however many episodes deep.
    ///
    /// Default: 5 minutes
    pub fn max_backoff(mut self, d: Duration) -> Self {
        self.max_backoff = d;
        self
    }

    /// Growth factor applied per consecutive open episode.
    ///
    /// Default: 2.0
    pub fn backoff_multiplier(mut self, m: f64) -> Self {
        self.backoff_multiplier = if m >= 1.0 { m } else { 1.0 };
        self
    }

    /// Register an event listener.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: quarry_core::EventListener<BreakerEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Register a callback for state transitions.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, BreakerState, BreakerState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &BreakerEvent| {
                if let BreakerEvent::StateTransition { account, from, to } = event {
                    f(account, *from, *to);
                }
            }));
        self
    }

    pub fn build(self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            recovery_timeout: self.recovery_timeout,
            time_window: self.time_window,
            max_backoff: self.max_backoff,
            backoff_multiplier: self.backoff_multiplier,
            event_listeners: self.event_listeners,
        }
    }
}

impl Default for BreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
