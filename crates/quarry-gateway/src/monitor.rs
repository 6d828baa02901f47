use crate::config::MonitorConfig;
use crate::manager::ConnectionManager;
use quarry_breaker::BreakerState;
use quarry_core::{ComponentEvent, ErrorClass};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Alerts published by the health monitor. Edge-triggered: each fires
/// once per crossing, not once per tick.
#[derive(Debug, Clone)]
pub enum HealthAlert {
    /// An account's score dropped below the degraded threshold.
    Degraded { account: String, score: f64 },
    /// An account's score dropped below the critical threshold.
    Critical { account: String, score: f64 },
    /// An account's probe failure rate over the monitor window exceeded
    /// the configured maximum.
    FailureRateExceeded { account: String, rate: f64 },
    /// Fewer accounts than the configured minimum are dispatchable.
    AvailabilityLow { available: usize, minimum: usize },
}

impl ComponentEvent for HealthAlert {
    fn event_type(&self) -> &'static str {
        match self {
            HealthAlert::Degraded { .. } => "degraded",
            HealthAlert::Critical { .. } => "critical",
            HealthAlert::FailureRateExceeded { .. } => "failure_rate_exceeded",
            HealthAlert::AvailabilityLow { .. } => "availability_low",
        }
    }

    fn component(&self) -> &str {
        match self {
            HealthAlert::Degraded { account, .. }
            | HealthAlert::Critical { account, .. }
            | HealthAlert::FailureRateExceeded { account, .. } => account,
            HealthAlert::AvailabilityLow { .. } => "gateway",
        }
    }
}

#[derive(Default)]
struct ProbeHistory {
    outcomes: VecDeque<bool>,
    degraded_latched: bool,
    critical_latched: bool,
    rate_latched: bool,
}

#[derive(Default)]
struct MonitorState {
    histories: HashMap<String, ProbeHistory>,
    availability_latched: bool,
}

/// Periodic prober of every vault account.
///
/// Each tick probes each active account through its own pool (the
/// breaker still gates the probe — an open breaker whose backoff has not
/// elapsed is skipped, and the open → half-open probe path is exactly how
/// accounts recover), folds the outcome into the vault's EWMA health
/// score, and emits [`HealthAlert`]s on threshold crossings.
pub struct HealthMonitor {
    manager: Arc<ConnectionManager>,
    config: MonitorConfig,
    state: Mutex<MonitorState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(manager: Arc<ConnectionManager>, config: MonitorConfig) -> Self {
        Self {
            manager,
            config,
            state: Mutex::new(MonitorState::default()),
            task: Mutex::new(None),
        }
    }

    /// Start the background probe loop.
    pub fn start(self: &Arc<Self>) {
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.config.check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                monitor.check_once().await;
            }
        });
        *self.task.lock().expect("monitor mutex poisoned") = Some(handle);
    }

    /// Stop the background probe loop.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().expect("monitor mutex poisoned").take() {
            handle.abort();
        }
    }

    /// One probe pass over every account. Public so tests and operators
    /// can force a pass.
    pub async fn check_once(&self) {
        let accounts = self.manager.vault().list_accounts();
        for account in &accounts {
            if !account.is_available() {
                continue;
            }
            let breaker = self.manager.breakers().breaker_for(&account.username);
            if !breaker.can_execute() {
                // Open and not yet due for a half-open probe.
                continue;
            }

            let outcome = self
                .manager
                .probe(account, self.config.probe_timeout)
                .await;
            match outcome {
                Ok(latency) => {
                    let slow = latency > self.config.slow_probe_threshold;
                    let target = if slow { 60.0 } else { 100.0 };
                    self.score(&account.username, target, true);
                    if slow {
                        tracing::debug!(
                            account = %account.username,
                            latency_ms = latency.as_millis() as u64,
                            "slow health probe"
                        );
                    }
                }
                Err(err) if err.class == ErrorClass::Query => {
                    // Broken health template; not an account problem.
                    tracing::warn!(account = %account.username, error = %err, "health probe query error");
                }
                Err(err) => {
                    tracing::warn!(account = %account.username, error = %err, "health probe failed");
                    self.score(&account.username, 0.0, false);
                }
            }
        }
        self.check_availability();
    }

    /// Fold one probe outcome into the EWMA score and fire any
    /// per-account alerts whose thresholds were crossed.
    fn score(&self, username: &str, target: f64, success: bool) {
        let vault = self.manager.vault();
        let Some(snapshot) = vault.get(username) else {
            return;
        };
        let alpha = self.config.ewma_alpha;
        let score = alpha * target + (1.0 - alpha) * snapshot.health_score;
        vault.record_health(username, score);

        let mut state = self.state.lock().expect("monitor mutex poisoned");
        let history = state.histories.entry(username.to_string()).or_default();
        history.outcomes.push_back(success);
        while history.outcomes.len() > self.config.window {
            history.outcomes.pop_front();
        }
        let rate = if history.outcomes.is_empty() {
            0.0
        } else {
            let failures = history.outcomes.iter().filter(|ok| !**ok).count();
            failures as f64 / history.outcomes.len() as f64
        };

        let mut alerts = Vec::new();
        if score < self.config.critical_score {
            if !history.critical_latched {
                history.critical_latched = true;
                alerts.push(HealthAlert::Critical {
                    account: username.to_string(),
                    score,
                });
            }
        } else {
            history.critical_latched = false;
        }
        if score < self.config.degraded_score {
            if !history.degraded_latched {
                history.degraded_latched = true;
                alerts.push(HealthAlert::Degraded {
                    account: username.to_string(),
                    score,
                });
            }
        } else {
            history.degraded_latched = false;
        }
        if rate > self.config.max_failure_rate {
            if !history.rate_latched {
                history.rate_latched = true;
                alerts.push(HealthAlert::FailureRateExceeded {
                    account: username.to_string(),
                    rate,
                });
            }
        } else {
            history.rate_latched = false;
        }
        drop(state);

        for alert in alerts {
            tracing::warn!(account = username, alert = alert.event_type(), "health alert");
            self.config.listeners.emit(&alert);
        }
    }

    /// Count dispatchable accounts and fire the availability alert when
    /// the fleet shrinks below the minimum.
    fn check_availability(&self) {
        let available = self
            .manager
            .vault()
            .list_accounts()
            .iter()
            .filter(|a| {
                a.is_available()
                    && self.manager.breakers().breaker_for(&a.username).state()
                        != BreakerState::Open
            })
            .count();

        let mut state = self.state.lock().expect("monitor mutex poisoned");
        if available < self.config.min_available_accounts {
            if !state.availability_latched {
                state.availability_latched = true;
                drop(state);
                let alert = HealthAlert::AvailabilityLow {
                    available,
                    minimum: self.config.min_available_accounts,
                };
                tracing::error!(available, "available account count below minimum");
                self.config.listeners.emit(&alert);
            }
        } else {
            state.availability_latched = false;
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.task.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ManagerConfig, MonitorConfigBuilder};
    use quarry_breaker::{BreakerConfig, BreakerRegistry};
    use quarry_core::mock::ScriptedDriver;
    use quarry_core::{names, DriverError, FnListener, TemplateCatalog};
    use quarry_pool::PoolConfig;
    use quarry_vault::{AccountConfig, CredentialVault};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn account(username: &str, priority: u32) -> AccountConfig {
        AccountConfig {
            username: username.to_string(),
            password: "pw".to_string(),
            priority,
            options: Default::default(),
        }
    }

    fn manager(driver: &ScriptedDriver, accounts: Vec<AccountConfig>) -> Arc<ConnectionManager> {
        let vault = Arc::new(CredentialVault::from_accounts(accounts).unwrap());
        let breakers = Arc::new(BreakerRegistry::new(
            BreakerConfig::builder()
                .failure_threshold(2)
                .recovery_timeout(Duration::from_millis(50))
                .build(),
        ));
        let mut catalog = TemplateCatalog::new();
        catalog.insert(names::CHECK_HEALTH, "SELECT 1");
        Arc::new(ConnectionManager::new(
            vault,
            breakers,
            Arc::new(driver.clone()),
            catalog,
            ManagerConfig::builder()
                .pool(
                    PoolConfig::builder()
                        .min_size(0)
                        .max_size(2)
                        .connect_timeout(Duration::from_millis(200))
                        .build(),
                )
                .build(),
        ))
    }

    #[tokio::test]
    async fn healthy_probes_keep_score_high() {
        let driver = ScriptedDriver::new();
        let mgr = manager(&driver, vec![account("svc1", 1)]);
        let monitor = HealthMonitor::new(Arc::clone(&mgr), MonitorConfig::default());

        monitor.check_once().await;
        monitor.check_once().await;

        let score = mgr.vault().get("svc1").unwrap().health_score;
        assert!((score - 100.0).abs() < 1e-9, "score stays at 100, got {score}");
    }

    #[tokio::test]
    async fn failed_probes_decay_score_and_alert_on_crossings() {
        let driver = ScriptedDriver::new();
        let mgr = manager(&driver, vec![account("svc1", 1)]);

        let degraded = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&degraded);
        let monitor = HealthMonitor::new(
            Arc::clone(&mgr),
            MonitorConfigBuilder::new()
                .ewma_alpha(0.5)
                .listener(FnListener::new(move |alert: &HealthAlert| {
                    if matches!(alert, HealthAlert::Degraded { .. }) {
                        d.fetch_add(1, Ordering::SeqCst);
                    }
                }))
                .build(),
        );

        // Each failed probe halves the score: 100 -> 50 after one pass
        // (breaker threshold 2 keeps it closed through the first probe).
        driver.script_fail("svc1", DriverError::network("reset"));
        monitor.check_once().await;

        let score = mgr.vault().get("svc1").unwrap().health_score;
        assert!(score < 70.0, "expected degraded score, got {score}");
        assert_eq!(degraded.load(Ordering::SeqCst), 1);

        // Recovery unlatches; the next crossing alerts again.
        monitor.check_once().await; // healthy probe, 50 -> 75
        monitor.check_once().await; // 87.5
        driver.script_fail("svc1", DriverError::network("reset"));
        monitor.check_once().await; // ~43.75
        assert_eq!(degraded.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn availability_alert_fires_once_when_fleet_shrinks() {
        let driver = ScriptedDriver::new();
        let mgr = manager(&driver, vec![account("svc1", 1)]);

        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let monitor = HealthMonitor::new(
            Arc::clone(&mgr),
            MonitorConfigBuilder::new()
                .min_available_accounts(1)
                .listener(FnListener::new(move |alert: &HealthAlert| {
                    if matches!(alert, HealthAlert::AvailabilityLow { .. }) {
                        f.fetch_add(1, Ordering::SeqCst);
                    }
                }))
                .build(),
        );

        mgr.vault().mark_inactive("svc1");
        monitor.check_once().await;
        monitor.check_once().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1, "latched after first crossing");

        mgr.vault().mark_active("svc1");
        monitor.check_once().await;
        mgr.vault().mark_inactive("svc1");
        monitor.check_once().await;
        assert_eq!(fired.load(Ordering::SeqCst), 2, "re-fires after recovery");
    }

    #[tokio::test]
    async fn probes_recover_an_open_breaker() {
        let driver = ScriptedDriver::new();
        let mgr = manager(&driver, vec![account("svc1", 1)]);
        let monitor = HealthMonitor::new(Arc::clone(&mgr), MonitorConfig::default());

        let breaker = mgr.breakers().breaker_for("svc1");
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        // Not yet due: the probe pass skips the account entirely.
        monitor.check_once().await;
        assert_eq!(driver.executed_on("svc1"), 0);

        // After the backoff the pass probes half-open and successes close.
        tokio::time::sleep(Duration::from_millis(60)).await;
        monitor.check_once().await;
        monitor.check_once().await;
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
