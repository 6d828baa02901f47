use crate::account::{AccountConfig, AccountSnapshot, AccountState};
use crate::crypto;
use crate::error::VaultError;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::RwLock;

struct Entry {
    config: AccountConfig,
    state: AccountState,
}

impl Entry {
    fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            username: self.config.username.clone(),
            priority: self.config.priority,
            is_active: self.state.is_active,
            in_cooldown: self.state.in_cooldown,
            consecutive_failures: self.state.consecutive_failures,
            health_score: self.state.health_score,
            params: self.config.connect_params(),
        }
    }
}

/// The account store: immutable configs loaded from the encrypted file,
/// plus the runtime state (activity, cooldown, health) the rest of the
/// core reads and writes.
///
/// All reads return [`AccountSnapshot`] copies. The availability
/// predicate that also consults the breaker lives in the connection
/// manager, not here.
pub struct CredentialVault {
    entries: RwLock<Vec<Entry>>,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.entries.read().map(|e| e.len()).unwrap_or(0);
        f.debug_struct("CredentialVault")
            .field("entries", &count)
            .finish()
    }
}

impl CredentialVault {
    /// Decrypt and load the credential file, enforcing priority
    /// uniqueness and marking every account active.
    pub fn load(path: impl AsRef<Path>, secret: &str) -> Result<Self, VaultError> {
        let path = path.as_ref();
        let envelope = std::fs::read_to_string(path).map_err(|source| VaultError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let plaintext = crypto::open_bytes(&envelope, secret)?;
        let accounts: Vec<AccountConfig> = serde_json::from_slice(&plaintext)?;
        tracing::info!(path = %path.display(), accounts = accounts.len(), "credential vault loaded");
        Self::from_accounts(accounts)
    }

    /// Build a vault from already-decrypted configs. Same validation as
    /// [`load`](Self::load).
    pub fn from_accounts(accounts: Vec<AccountConfig>) -> Result<Self, VaultError> {
        if accounts.is_empty() {
            return Err(VaultError::NoAccounts);
        }
        let mut sorted = accounts;
        sorted.sort_by_key(|a| a.priority);
        for pair in sorted.windows(2) {
            if pair[0].priority == pair[1].priority {
                return Err(VaultError::DuplicatePriority {
                    priority: pair[0].priority,
                    first: pair[0].username.clone(),
                    second: pair[1].username.clone(),
                });
            }
        }
        let mut names: Vec<&str> = sorted.iter().map(|a| a.username.as_str()).collect();
        names.sort_unstable();
        for pair in names.windows(2) {
            if pair[0] == pair[1] {
                return Err(VaultError::DuplicateAccount(pair[0].to_string()));
            }
        }

        let entries = sorted
            .into_iter()
            .map(|config| Entry {
                config,
                state: AccountState::default(),
            })
            .collect();
        Ok(Self {
            entries: RwLock::new(entries),
        })
    }

    /// Encrypt `accounts` to `path`. The inverse of [`load`](Self::load),
    /// used by operator tooling.
    pub fn seal(
        path: impl AsRef<Path>,
        secret: &str,
        accounts: &[AccountConfig],
        iterations: u32,
    ) -> Result<(), VaultError> {
        let path = path.as_ref();
        let plaintext = serde_json::to_vec(accounts)?;
        let envelope = crypto::seal_bytes(&plaintext, secret, iterations)?;
        std::fs::write(path, envelope).map_err(|source| VaultError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    /// Every account, ordered by priority (lower first).
    pub fn list_accounts(&self) -> Vec<AccountSnapshot> {
        let entries = self.entries.read().expect("vault lock poisoned");
        entries.iter().map(Entry::snapshot).collect()
    }

    /// Accounts ordered by `(priority ASC, health_score DESC)` — the
    /// candidate order the connection manager dispatches in.
    pub fn ranked_accounts(&self) -> Vec<AccountSnapshot> {
        let mut accounts = self.list_accounts();
        accounts.sort_by(|a, b| {
            a.priority.cmp(&b.priority).then(
                b.health_score
                    .partial_cmp(&a.health_score)
                    .unwrap_or(Ordering::Equal),
            )
        });
        accounts
    }

    pub fn get(&self, username: &str) -> Option<AccountSnapshot> {
        let entries = self.entries.read().expect("vault lock poisoned");
        entries
            .iter()
            .find(|e| e.config.username == username)
            .map(Entry::snapshot)
    }

    pub fn mark_active(&self, username: &str) -> bool {
        self.with_entry(username, |state| state.is_active = true)
    }

    pub fn mark_inactive(&self, username: &str) -> bool {
        self.with_entry(username, |state| state.is_active = false)
    }

    pub fn set_cooldown(&self, username: &str, in_cooldown: bool) -> bool {
        self.with_entry(username, |state| state.in_cooldown = in_cooldown)
    }

    /// Overwrite the account's health score, clamped to `[0, 100]`.
    /// The health monitor owns the scoring policy; the vault just stores.
    pub fn record_health(&self, username: &str, score: f64) -> bool {
        self.with_entry(username, |state| {
            state.health_score = score.clamp(0.0, 100.0);
        })
    }

    /// Track the consecutive-failure run for an account. Successes reset
    /// it.
    pub fn record_outcome(&self, username: &str, success: bool) -> bool {
        self.with_entry(username, |state| {
            if success {
                state.consecutive_failures = 0;
            } else {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("vault lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_entry(&self, username: &str, f: impl FnOnce(&mut AccountState)) -> bool {
        let mut entries = self.entries.write().expect("vault lock poisoned");
        match entries.iter_mut().find(|e| e.config.username == username) {
            Some(entry) => {
                f(&mut entry.state);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(username: &str, priority: u32) -> AccountConfig {
        AccountConfig {
            username: username.to_string(),
            password: "pw".to_string(),
            priority,
            options: Default::default(),
        }
    }

    #[test]
    fn load_round_trips_through_the_encrypted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.enc");
        let accounts = vec![account("svc2", 2), account("svc1", 1)];

        CredentialVault::seal(&path, "s3cret", &accounts, 100_000).unwrap();
        let vault = CredentialVault::load(&path, "s3cret").unwrap();

        let listed = vault.list_accounts();
        assert_eq!(listed.len(), 2);
        // Priority order, all active by default.
        assert_eq!(listed[0].username, "svc1");
        assert_eq!(listed[1].username, "svc2");
        assert!(listed.iter().all(|a| a.is_active));
        assert!(listed.iter().all(|a| (a.health_score - 100.0).abs() < f64::EPSILON));
    }

    #[test]
    fn load_rejects_wrong_secret() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.enc");
        CredentialVault::seal(&path, "s3cret", &[account("svc1", 1)], 100_000).unwrap();
        assert!(matches!(
            CredentialVault::load(&path, "oops"),
            Err(VaultError::Decrypt)
        ));
    }

    #[test]
    fn duplicate_priority_is_fatal() {
        let err =
            CredentialVault::from_accounts(vec![account("a", 1), account("b", 1)]).unwrap_err();
        assert!(matches!(err, VaultError::DuplicatePriority { priority: 1, .. }));
    }

    #[test]
    fn duplicate_username_is_fatal() {
        let err =
            CredentialVault::from_accounts(vec![account("a", 1), account("a", 2)]).unwrap_err();
        assert!(matches!(err, VaultError::DuplicateAccount(name) if name == "a"));
    }

    #[test]
    fn empty_vault_is_fatal() {
        assert!(matches!(
            CredentialVault::from_accounts(vec![]),
            Err(VaultError::NoAccounts)
        ));
    }

    #[test]
    fn ranking_prefers_priority_then_health() {
        let vault = CredentialVault::from_accounts(vec![
            account("low", 3),
            account("mid", 2),
            account("top", 1),
        ])
        .unwrap();
        vault.record_health("top", 10.0);
        vault.record_health("mid", 90.0);

        // Priority still dominates health.
        let ranked = vault.ranked_accounts();
        assert_eq!(ranked[0].username, "top");
        assert_eq!(ranked[1].username, "mid");
        assert_eq!(ranked[2].username, "low");
    }

    #[test]
    fn health_score_is_clamped() {
        let vault = CredentialVault::from_accounts(vec![account("a", 1)]).unwrap();
        vault.record_health("a", 250.0);
        assert!((vault.get("a").unwrap().health_score - 100.0).abs() < f64::EPSILON);
        vault.record_health("a", -5.0);
        assert!((vault.get("a").unwrap().health_score).abs() < f64::EPSILON);
    }

    #[test]
    fn activity_and_cooldown_flags() {
        let vault = CredentialVault::from_accounts(vec![account("a", 1)]).unwrap();
        assert!(vault.get("a").unwrap().is_available());

        vault.mark_inactive("a");
        assert!(!vault.get("a").unwrap().is_available());
        vault.mark_active("a");
        vault.set_cooldown("a", true);
        assert!(!vault.get("a").unwrap().is_available());
        vault.set_cooldown("a", false);
        assert!(vault.get("a").unwrap().is_available());

        assert!(!vault.mark_active("missing"));
    }

    #[test]
    fn consecutive_failures_reset_on_success() {
        let vault = CredentialVault::from_accounts(vec![account("a", 1)]).unwrap();
        vault.record_outcome("a", false);
        vault.record_outcome("a", false);
        assert_eq!(vault.get("a").unwrap().consecutive_failures, 2);
        vault.record_outcome("a", true);
        assert_eq!(vault.get("a").unwrap().consecutive_failures, 0);
    }
}
