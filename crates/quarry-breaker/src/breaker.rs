use crate::config::BreakerConfig;
use crate::events::BreakerEvent;
#[cfg(feature = "metrics")]
use metrics::{counter, gauge};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// State of an account's breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BreakerState {
    /// Calls are permitted.
    Closed = 0,
    /// Calls are rejected until the backoff elapses.
    Open = 1,
    /// Recovery probes are permitted.
    HalfOpen = 2,
}

impl BreakerState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => BreakerState::Open,
            2 => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Consistent snapshot of one breaker's counters.
#[derive(Debug, Clone)]
pub struct BreakerMetrics {
    pub state: BreakerState,
    /// Failures inside the current sliding window.
    pub failure_count: usize,
    /// Monotonic; never decremented, survives window expiry.
    pub total_failures: u64,
    /// Monotonic.
    pub total_successes: u64,
    pub half_open_successes: u32,
    /// Consecutive open episodes; drives the backoff exponent.
    pub open_episodes: u32,
    pub last_failure_at: Option<Instant>,
    pub last_success_at: Option<Instant>,
    /// Set exactly while the breaker is open.
    pub next_retry_at: Option<Instant>,
    pub time_since_state_change: Duration,
}

struct Cell {
    state: BreakerState,
    window: VecDeque<Instant>,
    total_failures: u64,
    total_successes: u64,
    half_open_successes: u32,
    open_episodes: u32,
    last_failure_at: Option<Instant>,
    last_success_at: Option<Instant>,
    next_retry_at: Option<Instant>,
    last_state_change: Instant,
}

impl Cell {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            window: VecDeque::new(),
            total_failures: 0,
            total_successes: 0,
            half_open_successes: 0,
            open_episodes: 0,
            last_failure_at: None,
            last_success_at: None,
            next_retry_at: None,
            last_state_change: Instant::now(),
        }
    }

    fn prune_window(&mut self, window: Duration, now: Instant) {
        while let Some(ts) = self.window.front() {
            if now.duration_since(*ts) > window {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Three-state gate in front of one warehouse account.
///
/// All operations are `&self` and safe under concurrent invocation; the
/// state machine transitions under a per-account mutex so rapid bursts
/// land in a consistent terminal state. None of the operations error:
/// outcomes are reported by mutation and observed via [`metrics`].
///
/// [`metrics`]: AccountBreaker::metrics
pub struct AccountBreaker {
    account: String,
    config: Arc<BreakerConfig>,
    cell: Mutex<Cell>,
    state_atomic: AtomicU8,
}

impl AccountBreaker {
    pub fn new(account: impl Into<String>, config: Arc<BreakerConfig>) -> Self {
        Self {
            account: account.into(),
            config,
            cell: Mutex::new(Cell::new()),
            state_atomic: AtomicU8::new(BreakerState::Closed as u8),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Current state without taking the mutex. Kept in sync with the
    /// guarded state on every transition.
    pub fn state(&self) -> BreakerState {
        BreakerState::from_u8(self.state_atomic.load(Ordering::Acquire))
    }

    /// Whether a call may proceed right now.
    ///
    /// Side-effectful in exactly one way: when the breaker is open and
    /// the backoff has elapsed, this performs the open → half-open
    /// transition and permits the call. Half-open permits concurrent
    /// probes; a burst that all fail re-opens once.
    pub fn can_execute(&self) -> bool {
        let mut cell = self.cell.lock().expect("breaker mutex poisoned");
        let now = Instant::now();
        match cell.state {
            BreakerState::Closed => {
                self.emit_permitted(&cell);
                true
            }
            BreakerState::Open => {
                let ready = cell.next_retry_at.map(|at| now >= at).unwrap_or(true);
                if ready {
                    self.transition(&mut cell, BreakerState::HalfOpen);
                    cell.half_open_successes = 0;
                    self.emit_permitted(&cell);
                    true
                } else {
                    let retry_in = cell.next_retry_at.map(|at| at.duration_since(now));
                    self.config
                        .event_listeners
                        .emit(&BreakerEvent::CallRejected {
                            account: self.account.clone(),
                            retry_in,
                        });
                    #[cfg(feature = "metrics")]
                    counter!("quarry_breaker_calls_total", "account" => self.account.clone(), "outcome" => "rejected")
                        .increment(1);
                    false
                }
            }
            BreakerState::HalfOpen => {
                self.emit_permitted(&cell);
                true
            }
        }
    }

    /// Record a breaker-worthy failure.
    pub fn record_failure(&self) {
        let mut cell = self.cell.lock().expect("breaker mutex poisoned");
        let now = Instant::now();
        cell.total_failures += 1;
        cell.last_failure_at = Some(now);

        self.config
            .event_listeners
            .emit(&BreakerEvent::FailureRecorded {
                account: self.account.clone(),
                state: cell.state,
            });
        #[cfg(feature = "metrics")]
        counter!("quarry_breaker_calls_total", "account" => self.account.clone(), "outcome" => "failure")
            .increment(1);

        match cell.state {
            BreakerState::Closed => {
                cell.window.push_back(now);
                cell.prune_window(self.config.time_window, now);
                if cell.window.len() >= self.config.failure_threshold as usize {
                    self.open(&mut cell, now);
                }
            }
            BreakerState::HalfOpen => {
                // The probe failed; back off again, one episode deeper.
                self.open(&mut cell, now);
            }
            BreakerState::Open => {
                // In-flight call that was permitted before the trip.
                cell.window.push_back(now);
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut cell = self.cell.lock().expect("breaker mutex poisoned");
        let now = Instant::now();
        cell.total_successes += 1;
        cell.last_success_at = Some(now);

        self.config
            .event_listeners
            .emit(&BreakerEvent::SuccessRecorded {
                account: self.account.clone(),
                state: cell.state,
            });
        #[cfg(feature = "metrics")]
        counter!("quarry_breaker_calls_total", "account" => self.account.clone(), "outcome" => "success")
            .increment(1);

        match cell.state {
            BreakerState::Closed => {
                // A success breaks the run of failures.
                cell.window.clear();
            }
            BreakerState::HalfOpen => {
                cell.half_open_successes += 1;
                if cell.half_open_successes >= self.config.success_threshold {
                    self.close(&mut cell);
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Force the breaker back to closed with zeroed counters.
    pub fn reset(&self) {
        let mut cell = self.cell.lock().expect("breaker mutex poisoned");
        self.close(&mut cell);
        cell.total_failures = 0;
        cell.total_successes = 0;
        cell.last_failure_at = None;
        cell.last_success_at = None;
    }

    /// Consistent snapshot of the breaker's counters.
    pub fn metrics(&self) -> BreakerMetrics {
        let mut cell = self.cell.lock().expect("breaker mutex poisoned");
        let now = Instant::now();
        if cell.state == BreakerState::Closed {
            cell.prune_window(self.config.time_window, now);
        }
        BreakerMetrics {
            state: cell.state,
            failure_count: cell.window.len(),
            total_failures: cell.total_failures,
            total_successes: cell.total_successes,
            half_open_successes: cell.half_open_successes,
            open_episodes: cell.open_episodes,
            last_failure_at: cell.last_failure_at,
            last_success_at: cell.last_success_at,
            next_retry_at: cell.next_retry_at,
            time_since_state_change: now.duration_since(cell.last_state_change),
        }
    }

    /// Backoff for the given consecutive open episode (0-based).
    fn backoff(&self, episode: u32) -> Duration {
        let base = self.config.recovery_timeout.as_secs_f64();
        let grown = base * self.config.backoff_multiplier.powi(episode as i32);
        let cap = self.config.max_backoff.as_secs_f64();
        if !grown.is_finite() || grown >= cap {
            self.config.max_backoff
        } else {
            Duration::from_secs_f64(grown)
        }
    }

    fn open(&self, cell: &mut Cell, now: Instant) {
        let wait = self.backoff(cell.open_episodes);
        cell.open_episodes = cell.open_episodes.saturating_add(1);
        cell.next_retry_at = Some(now + wait);
        self.transition(cell, BreakerState::Open);
    }

    fn close(&self, cell: &mut Cell) {
        cell.window.clear();
        cell.half_open_successes = 0;
        cell.open_episodes = 0;
        cell.next_retry_at = None;
        self.transition(cell, BreakerState::Closed);
    }

    fn transition(&self, cell: &mut Cell, to: BreakerState) {
        if cell.state == to {
            return;
        }
        let from = cell.state;
        cell.state = to;
        cell.last_state_change = Instant::now();
        self.state_atomic.store(to as u8, Ordering::Release);

        tracing::info!(
            account = %self.account,
            from = from.label(),
            to = to.label(),
            "breaker state transition"
        );
        self.config
            .event_listeners
            .emit(&BreakerEvent::StateTransition {
                account: self.account.clone(),
                from,
                to,
            });
        #[cfg(feature = "metrics")]
        {
            counter!(
                "quarry_breaker_transitions_total",
                "account" => self.account.clone(),
                "from" => from.label(),
                "to" => to.label()
            )
            .increment(1);
            gauge!("quarry_breaker_state", "account" => self.account.clone()).set(to as u8 as f64);
        }
    }

    fn emit_permitted(&self, cell: &Cell) {
        if self.config.event_listeners.is_empty() {
            return;
        }
        self.config
            .event_listeners
            .emit(&BreakerEvent::CallPermitted {
                account: self.account.clone(),
                state: cell.state,
            });
    }
}

/// Lazily-populated map of account name to breaker.
///
/// Every breaker in a registry shares one [`BreakerConfig`].
pub struct BreakerRegistry {
    config: Arc<BreakerConfig>,
    breakers: Mutex<std::collections::HashMap<String, Arc<AccountBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            breakers: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// The breaker for `account`, created closed on first reference.
    pub fn breaker_for(&self, account: &str) -> Arc<AccountBreaker> {
        let mut breakers = self.breakers.lock().expect("registry mutex poisoned");
        Arc::clone(breakers.entry(account.to_string()).or_insert_with(|| {
            Arc::new(AccountBreaker::new(account, Arc::clone(&self.config)))
        }))
    }

    /// The breaker for `account`, if one has ever been referenced.
    pub fn get(&self, account: &str) -> Option<Arc<AccountBreaker>> {
        self.breakers
            .lock()
            .expect("registry mutex poisoned")
            .get(account)
            .cloned()
    }

    /// Reset one account's breaker. Returns false for never-seen accounts.
    pub fn reset(&self, account: &str) -> bool {
        match self.get(account) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Snapshot of every referenced breaker's metrics.
    pub fn all_metrics(&self) -> Vec<(String, BreakerMetrics)> {
        let breakers = self.breakers.lock().expect("registry mutex poisoned");
        breakers
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.metrics()))
            .collect()
    }
}
