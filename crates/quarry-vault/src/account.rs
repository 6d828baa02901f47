use quarry_core::ConnectParams;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One service account as stored in the credential file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub username: String,
    pub password: String,
    /// Lower is preferred. Unique across the vault.
    pub priority: u32,
    /// Warehouse-specific connection settings, opaque to quarry.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl AccountConfig {
    /// The parameters the driver needs to open a session.
    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            username: self.username.clone(),
            password: self.password.clone(),
            options: self.options.clone(),
        }
    }
}

/// Mutable runtime state the vault tracks per account.
#[derive(Debug, Clone)]
pub(crate) struct AccountState {
    pub is_active: bool,
    pub in_cooldown: bool,
    pub consecutive_failures: u32,
    pub health_score: f64,
}

impl Default for AccountState {
    fn default() -> Self {
        Self {
            is_active: true,
            in_cooldown: false,
            consecutive_failures: 0,
            health_score: 100.0,
        }
    }
}

/// Point-in-time view of one account, config and runtime state combined.
///
/// Snapshots are copies; mutating the vault never invalidates one.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub username: String,
    pub priority: u32,
    pub is_active: bool,
    pub in_cooldown: bool,
    pub consecutive_failures: u32,
    /// 0 (dead) to 100 (healthy); maintained by the health monitor.
    pub health_score: f64,
    pub params: ConnectParams,
}

impl AccountSnapshot {
    /// Vault-local availability: active and not cooling down. The
    /// breaker's verdict is layered on by the connection manager.
    pub fn is_available(&self) -> bool {
        self.is_active && !self.in_cooldown
    }
}
