//! Encrypted service-account vault.
//!
//! Account configs live in a single file sealed with AES-256-CBC under a
//! PBKDF2-stretched operator secret. At load the vault decrypts, parses,
//! enforces priority uniqueness, and marks every account active. At
//! runtime it stores the mutable per-account state (activity, cooldown,
//! consecutive failures, health score) and hands out ranked snapshots to
//! the connection manager.
//!
//! The vault never decides availability on its own: the full predicate
//! (`active ∧ ¬cooldown ∧ breaker permits`) belongs to the dispatch path.

pub use account::{AccountConfig, AccountSnapshot};
pub use error::VaultError;
pub use vault::CredentialVault;

mod account;
mod crypto;
mod error;
mod vault;
