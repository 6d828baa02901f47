//! Per-account circuit breaker for the Quarry warehouse access core.
//!
//! The warehouse locks a service account after a strict number of failed
//! calls. Each account therefore sits behind a three-state breaker that
//! sheds load from the account well before the warehouse would:
//!
//! - **Closed**: calls permitted. Failures accumulate in a sliding time
//!   window; a success breaks the run. At the failure threshold the
//!   breaker opens.
//! - **Open**: calls rejected until an exponentially backed-off deadline
//!   (per consecutive episode, capped) elapses, at which point the next
//!   [`can_execute`] moves to half-open and permits the call.
//! - **Half-open**: probe calls permitted. Enough successes close the
//!   breaker; any failure re-opens it one episode deeper.
//!
//! Breakers are created lazily through a [`BreakerRegistry`] and share
//! its configuration. All operations are `&self`, lock per account, and
//! never error; outcomes are observed via [`AccountBreaker::metrics`]
//! snapshots and [`BreakerEvent`]s.
//!
//! ```rust
//! use quarry_breaker::{BreakerConfig, BreakerRegistry, BreakerState};
//! use std::time::Duration;
//!
//! let registry = BreakerRegistry::new(
//!     BreakerConfig::builder()
//!         .failure_threshold(3)
//!         .recovery_timeout(Duration::from_secs(5))
//!         .build(),
//! );
//!
//! let breaker = registry.breaker_for("svc_reporting_1");
//! assert!(breaker.can_execute());
//! breaker.record_failure();
//! assert_eq!(breaker.state(), BreakerState::Closed);
//! ```
//!
//! [`can_execute`]: AccountBreaker::can_execute

pub use breaker::{AccountBreaker, BreakerMetrics, BreakerRegistry, BreakerState};
pub use config::{BreakerConfig, BreakerConfigBuilder};
pub use events::BreakerEvent;

mod breaker;
mod config;
mod events;
