//! Resilient multi-account access core for strict-lockout data
//! warehouses.
//!
//! Quarry multiplexes client queries across a small pool of
//! interchangeable service accounts, sheds load from failing accounts
//! before the warehouse locks them, recovers them in the background, and
//! presents one logical always-available connection facade. Each
//! component is available as an individual crate and as a feature of
//! this meta-crate.
//!
//! # Quick Start
//!
//! ```toml
//! [dependencies]
//! quarry = { version = "0.1", features = ["gateway", "scheduler"] }
//! ```
//!
//! # Components
//!
//! - **vault** — encrypted account store with priority ranking
//! - **breaker** — per-account three-state circuit breaker with
//!   exponential backoff and a sliding failure window
//! - **pool** — bounded per-account session pools with background sweeps
//! - **gateway** — ranked failover dispatch plus the health monitor
//! - **scheduler** — bounded FIFO query tickets under a concurrency cap
//! - **queue** — append-only NDJSON event ingest with rotation and dedup
//! - **insight** — subject/metric/value atoms with provenance hashes
//!
//! The wiring order mirrors the dependency order: load the vault, build
//! the breaker registry, hand both to the gateway with your driver, then
//! point the scheduler and insight store at the gateway.

pub use quarry_core as core;

#[cfg(feature = "breaker")]
pub use quarry_breaker as breaker;

#[cfg(feature = "gateway")]
pub use quarry_gateway as gateway;

#[cfg(feature = "insight")]
pub use quarry_insight as insight;

#[cfg(feature = "pool")]
pub use quarry_pool as pool;

#[cfg(feature = "queue")]
pub use quarry_queue as queue;

#[cfg(feature = "scheduler")]
pub use quarry_scheduler as scheduler;

#[cfg(feature = "vault")]
pub use quarry_vault as vault;
