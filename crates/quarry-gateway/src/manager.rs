use crate::config::ManagerConfig;
use async_trait::async_trait;
use quarry_breaker::BreakerRegistry;
use quarry_core::{
    names, AccessError, CallOptions, Driver, DriverError, ErrorClass, ExecuteOptions, QueryRows,
    TemplateCatalog, TemplateExecutor,
};
use quarry_pool::{ConnOutcome, ConnectionPool, PoolStats};
use quarry_vault::{AccountSnapshot, CredentialVault};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Additive health nudges on the dispatch path. The monitor's EWMA is
/// the authoritative scorer; these keep the score moving between probes.
const HEALTH_NUDGE_UP: f64 = 2.0;
const HEALTH_NUDGE_DOWN: f64 = 15.0;

/// The orchestrator between vault, breakers, and pools.
///
/// `execute_template` walks the ranked candidate accounts and returns the
/// first permissible account's rows, recording every outcome so breakers
/// and health scores see the truth. Query-level errors surface
/// immediately without failover; breaker-worthy errors advance exactly
/// one account's breaker each and fail over to the next candidate.
pub struct ConnectionManager {
    vault: Arc<CredentialVault>,
    breakers: Arc<BreakerRegistry>,
    driver: Arc<dyn Driver>,
    catalog: TemplateCatalog,
    config: ManagerConfig,
    pools: Mutex<HashMap<String, Arc<ConnectionPool>>>,
}

impl ConnectionManager {
    pub fn new(
        vault: Arc<CredentialVault>,
        breakers: Arc<BreakerRegistry>,
        driver: Arc<dyn Driver>,
        catalog: TemplateCatalog,
        config: ManagerConfig,
    ) -> Self {
        Self {
            vault,
            breakers,
            driver,
            catalog,
            config,
            pools: Mutex::new(HashMap::new()),
        }
    }

    pub fn vault(&self) -> &Arc<CredentialVault> {
        &self.vault
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Occupancy of every pool created so far.
    pub fn pool_stats(&self) -> Vec<PoolStats> {
        let pools = self.pools.lock().expect("pools mutex poisoned");
        pools.values().map(|p| p.stats()).collect()
    }

    /// Close every pool. Breaker and vault state stay in place.
    pub async fn close(&self) {
        let drained: Vec<_> = {
            let mut pools = self.pools.lock().expect("pools mutex poisoned");
            pools.drain().map(|(_, pool)| pool).collect()
        };
        for pool in drained {
            pool.close().await;
        }
    }

    /// Execute a named template on the best permissible account.
    pub async fn execute_template(
        &self,
        template: &str,
        params: &[serde_json::Value],
        opts: ExecuteOptions,
    ) -> Result<QueryRows, AccessError> {
        let sql = self.catalog.resolve(template)?.to_string();
        let timeout = opts.timeout.unwrap_or(self.config.default_timeout);

        let mut candidates: Vec<AccountSnapshot> = self
            .vault
            .ranked_accounts()
            .into_iter()
            .filter(AccountSnapshot::is_available)
            .collect();
        if let Some(preferred) = &opts.preferred_account {
            if let Some(pos) = candidates.iter().position(|a| &a.username == preferred) {
                let head = candidates.remove(pos);
                candidates.insert(0, head);
            }
        }

        for account in &candidates {
            let breaker = self.breakers.breaker_for(&account.username);
            if !breaker.can_execute() {
                continue;
            }

            let pool = self.pool_for(account);
            let mut conn = match pool.borrow(self.config.borrow_timeout()).await {
                Ok(conn) => conn,
                Err(err) => {
                    // A borrow failure is a connection failure for this
                    // account, distinguished from a query failure only in
                    // the log line.
                    tracing::warn!(
                        account = %account.username,
                        template,
                        error = %err,
                        "connection acquire failed; trying next account"
                    );
                    breaker.record_failure();
                    self.record_account_outcome(&account.username, false);
                    continue;
                }
            };

            let call_opts = CallOptions {
                timeout: Some(timeout),
                byte_cap: opts.byte_cap,
            };
            let started = Instant::now();
            let outcome =
                match tokio::time::timeout(timeout, conn.session().execute(&sql, params, call_opts))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(DriverError::timeout(format!(
                        "query exceeded {}ms deadline",
                        timeout.as_millis()
                    ))),
                };

            match outcome {
                Ok(rows) => {
                    pool.release(conn, ConnOutcome::Ok);
                    breaker.record_success();
                    self.record_account_outcome(&account.username, true);
                    tracing::debug!(
                        account = %account.username,
                        template,
                        rows = rows.row_count,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "template executed"
                    );
                    return Ok(rows);
                }
                Err(err) if err.class == ErrorClass::Query => {
                    // The account is fine; the statement is not. Neutral
                    // observation, no failover, session kept.
                    pool.release(conn, ConnOutcome::Error(ErrorClass::Query));
                    return Err(AccessError::Query {
                        account: account.username.clone(),
                        source: err,
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        account = %account.username,
                        template,
                        class = ?err.class,
                        error = %err,
                        "dispatch failed; failing over"
                    );
                    pool.release(conn, ConnOutcome::Error(err.class));
                    breaker.record_failure();
                    self.record_account_outcome(&account.username, false);
                    continue;
                }
            }
        }

        Err(AccessError::NoAccountsAvailable)
    }

    /// Probe one account through its own pool, still honoring the
    /// breaker contract (success/failure recorded). Returns the probe
    /// latency on success.
    pub(crate) async fn probe(
        &self,
        account: &AccountSnapshot,
        timeout: Duration,
    ) -> Result<Duration, DriverError> {
        let sql = self
            .catalog
            .get(names::CHECK_HEALTH)
            .unwrap_or("SELECT 1")
            .to_string();
        let breaker = self.breakers.breaker_for(&account.username);
        let pool = self.pool_for(account);

        let mut conn = match pool.borrow(timeout).await {
            Ok(conn) => conn,
            Err(err) => {
                breaker.record_failure();
                self.record_account_outcome(&account.username, false);
                return Err(err.as_driver_error());
            }
        };

        let call_opts = CallOptions {
            timeout: Some(timeout),
            byte_cap: None,
        };
        let started = Instant::now();
        let outcome =
            match tokio::time::timeout(timeout, conn.session().execute(&sql, &[], call_opts)).await
            {
                Ok(result) => result.map(|_| started.elapsed()),
                Err(_) => Err(DriverError::timeout("health probe timed out")),
            };

        match &outcome {
            Ok(_) => {
                pool.release(conn, ConnOutcome::Ok);
                breaker.record_success();
                self.record_account_outcome(&account.username, true);
            }
            Err(err) if err.class == ErrorClass::Query => {
                // A broken health template is not the account's fault.
                pool.release(conn, ConnOutcome::Error(ErrorClass::Query));
            }
            Err(err) => {
                pool.release(conn, ConnOutcome::Error(err.class));
                breaker.record_failure();
                self.record_account_outcome(&account.username, false);
            }
        }
        outcome
    }

    /// The pool for `account`, created and started on first use.
    fn pool_for(&self, account: &AccountSnapshot) -> Arc<ConnectionPool> {
        let mut pools = self.pools.lock().expect("pools mutex poisoned");
        let pool = pools.entry(account.username.clone()).or_insert_with(|| {
            let pool = Arc::new(ConnectionPool::new(
                account.params.clone(),
                Arc::clone(&self.driver),
                self.config.pool.clone(),
            ));
            pool.start();
            pool
        });
        Arc::clone(pool)
    }

    fn record_account_outcome(&self, username: &str, success: bool) {
        self.vault.record_outcome(username, success);
        let Some(snapshot) = self.vault.get(username) else {
            return;
        };
        let score = if success {
            snapshot.health_score + HEALTH_NUDGE_UP
        } else {
            snapshot.health_score - HEALTH_NUDGE_DOWN
        };
        self.vault.record_health(username, score);
    }
}

#[async_trait]
impl TemplateExecutor for ConnectionManager {
    async fn execute_template(
        &self,
        template: &str,
        params: &[serde_json::Value],
        opts: ExecuteOptions,
    ) -> Result<QueryRows, AccessError> {
        ConnectionManager::execute_template(self, template, params, opts).await
    }
}
