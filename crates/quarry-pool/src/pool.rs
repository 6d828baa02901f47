use crate::config::PoolConfig;
use crate::error::PoolError;
use quarry_core::{ConnectParams, Driver, DriverError, ErrorClass, Session};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// How a borrower hands a connection back.
#[derive(Debug, Clone, Copy)]
pub enum ConnOutcome {
    /// The call succeeded (or was never attempted).
    Ok,
    /// The call failed with this classification. Session-invalidating
    /// classes (auth, network, timeout) destroy the connection.
    Error(ErrorClass),
}

/// One live session, owned by its pool and leased to one borrower at a
/// time. Hand it back with [`ConnectionPool::release`]; dropping a leaked
/// lease loses the slot until the pool is recreated, so don't.
pub struct PooledConnection {
    id: u64,
    account: String,
    session: Box<dyn Session>,
    created_at: Instant,
    last_used_at: Instant,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("account", &self.account)
            .field("created_at", &self.created_at)
            .field("last_used_at", &self.last_used_at)
            .finish()
    }
}

impl PooledConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    /// The driver session, exclusively borrowed for the lease.
    pub fn session(&mut self) -> &mut dyn Session {
        self.session.as_mut()
    }
}

struct PoolInner {
    idle: VecDeque<PooledConnection>,
    /// idle + borrowed + currently connecting. Never exceeds `max_size`.
    live: usize,
    next_id: u64,
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub account: String,
    pub idle: usize,
    pub live: usize,
    pub max_size: usize,
}

/// Bounded pool of driver sessions for a single account.
///
/// Borrowing prefers an idle session, then creates below the cap, then
/// waits for a release. A background sweep pings idle sessions, expires
/// the long-idle, and replenishes to the minimum.
pub struct ConnectionPool {
    account: String,
    params: ConnectParams,
    driver: Arc<dyn Driver>,
    config: PoolConfig,
    inner: Mutex<PoolInner>,
    released: Notify,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new(params: ConnectParams, driver: Arc<dyn Driver>, config: PoolConfig) -> Self {
        Self {
            account: params.username.clone(),
            params,
            driver,
            config,
            inner: Mutex::new(PoolInner {
                idle: VecDeque::new(),
                live: 0,
                next_id: 0,
            }),
            released: Notify::new(),
            sweeper: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().expect("pool mutex poisoned");
        PoolStats {
            account: self.account.clone(),
            idle: inner.idle.len(),
            live: inner.live,
            max_size: self.config.max_size,
        }
    }

    /// Borrow a session, waiting up to `timeout` for one to free up.
    pub async fn borrow(&self, timeout: Duration) -> Result<PooledConnection, PoolError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(PoolError::Closed {
                    account: self.account.clone(),
                });
            }

            let reserved_id = {
                let mut inner = self.inner.lock().expect("pool mutex poisoned");
                if let Some(mut conn) = inner.idle.pop_front() {
                    conn.last_used_at = Instant::now();
                    return Ok(conn);
                }
                if inner.live < self.config.max_size {
                    inner.live += 1;
                    inner.next_id += 1;
                    Some(inner.next_id)
                } else {
                    None
                }
            };

            if let Some(id) = reserved_id {
                let remaining = deadline.saturating_duration_since(Instant::now());
                return self.connect_reserved(id, remaining).await;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PoolError::Timeout {
                    account: self.account.clone(),
                });
            }
            // A release may beat the registration; the loop re-checks
            // regardless of whether we woke by notify or deadline.
            let _ = tokio::time::timeout(remaining, self.released.notified()).await;
            if Instant::now() >= deadline {
                let inner = self.inner.lock().expect("pool mutex poisoned");
                if inner.idle.is_empty() {
                    return Err(PoolError::Timeout {
                        account: self.account.clone(),
                    });
                }
            }
        }
    }

    /// Hand a lease back. Healthy outcomes return the session to the idle
    /// set; invalidating outcomes destroy it. Never blocks the caller on
    /// driver I/O.
    pub fn release(&self, mut conn: PooledConnection, outcome: ConnOutcome) {
        let invalidated = match outcome {
            ConnOutcome::Ok => false,
            ConnOutcome::Error(class) => class.invalidates_session(),
        };
        let destroy = invalidated || !conn.session.is_up() || self.closed.load(Ordering::Acquire);

        if destroy {
            tracing::debug!(account = %self.account, id = conn.id, "destroying connection");
            self.forget_one();
            tokio::spawn(async move {
                conn.session.close().await;
            });
        } else {
            conn.last_used_at = Instant::now();
            let mut inner = self.inner.lock().expect("pool mutex poisoned");
            inner.idle.push_back(conn);
            drop(inner);
            self.released.notify_one();
        }
    }

    /// Start the background sweep.
    pub fn start(self: &Arc<Self>) {
        let pool = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(pool.config.health_check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The immediate first tick warms the pool to its minimum.
            loop {
                interval.tick().await;
                if pool.closed.load(Ordering::Acquire) {
                    break;
                }
                pool.sweep_once().await;
            }
        });
        *self.sweeper.lock().expect("pool mutex poisoned") = Some(handle);
    }

    /// Close the pool: stop the sweep, drain and close idle sessions,
    /// wake every waiter. Outstanding leases are destroyed on release.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(handle) = self.sweeper.lock().expect("pool mutex poisoned").take() {
            handle.abort();
        }
        let drained = {
            let mut inner = self.inner.lock().expect("pool mutex poisoned");
            let drained: Vec<_> = inner.idle.drain(..).collect();
            inner.live -= drained.len();
            drained
        };
        for mut conn in drained {
            conn.session.close().await;
        }
        self.released.notify_waiters();
    }

    /// One sweep pass: expire the long-idle (not below the minimum), ping
    /// the rest, replenish to the minimum.
    pub async fn sweep_once(&self) {
        let mut kept = Vec::new();
        let candidates = {
            let mut inner = self.inner.lock().expect("pool mutex poisoned");
            std::mem::take(&mut inner.idle)
        };

        let now = Instant::now();
        for mut conn in candidates {
            let expired = now.duration_since(conn.last_used_at) > self.config.max_idle_time;
            if expired && self.live_count() > self.config.min_size {
                tracing::debug!(account = %self.account, id = conn.id, "expiring idle connection");
                self.forget_one();
                conn.session.close().await;
                continue;
            }

            let healthy = matches!(
                tokio::time::timeout(self.config.health_check_timeout, conn.session.ping()).await,
                Ok(Ok(()))
            );
            if healthy {
                kept.push(conn);
            } else {
                tracing::warn!(account = %self.account, id = conn.id, "destroying unhealthy connection");
                self.forget_one();
                conn.session.close().await;
            }
        }

        {
            let mut inner = self.inner.lock().expect("pool mutex poisoned");
            for conn in kept {
                inner.idle.push_back(conn);
            }
        }

        // Replenish to the floor. A connect failure ends the pass; the
        // next sweep retries.
        while self.live_count() < self.config.min_size && !self.closed.load(Ordering::Acquire) {
            let id = {
                let mut inner = self.inner.lock().expect("pool mutex poisoned");
                if inner.live >= self.config.max_size {
                    break;
                }
                inner.live += 1;
                inner.next_id += 1;
                inner.next_id
            };
            match self.connect_reserved(id, self.config.connect_timeout).await {
                Ok(conn) => {
                    let mut inner = self.inner.lock().expect("pool mutex poisoned");
                    inner.idle.push_back(conn);
                    drop(inner);
                    self.released.notify_one();
                }
                Err(err) => {
                    tracing::warn!(account = %self.account, error = %err, "pool replenish failed");
                    break;
                }
            }
        }
    }

    /// Open a session for an already-reserved slot, giving the slot back
    /// on failure.
    async fn connect_reserved(
        &self,
        id: u64,
        timeout: Duration,
    ) -> Result<PooledConnection, PoolError> {
        let connected = tokio::time::timeout(timeout, self.driver.connect(&self.params)).await;
        let result = match connected {
            Ok(Ok(session)) => {
                let now = Instant::now();
                Ok(PooledConnection {
                    id,
                    account: self.account.clone(),
                    session,
                    created_at: now,
                    last_used_at: now,
                })
            }
            Ok(Err(source)) => Err(PoolError::Connect {
                account: self.account.clone(),
                source,
            }),
            Err(_) => Err(PoolError::Connect {
                account: self.account.clone(),
                source: DriverError::timeout("connect timed out"),
            }),
        };
        if result.is_err() {
            self.forget_one();
        }
        result
    }

    /// Drop one live slot and wake a waiter to claim it.
    fn forget_one(&self) {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        inner.live = inner.live.saturating_sub(1);
        drop(inner);
        self.released.notify_one();
    }

    fn live_count(&self) -> usize {
        self.inner.lock().expect("pool mutex poisoned").live
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.sweeper.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}
