//! Per-account warehouse connection pool.
//!
//! Each service account owns one pool of live driver sessions, bounded
//! between a minimum the background sweep keeps warm and a hard maximum.
//! Borrowers take an exclusive lease ([`PooledConnection`]) and hand it
//! back with an outcome; outcomes that invalidate the session (auth
//! rejection, network failure, timeout) destroy it instead of recycling
//! it. Sessions are never shared across pools or accounts.
//!
//! ```rust,no_run
//! use quarry_pool::{ConnectionPool, ConnOutcome, PoolConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example(driver: Arc<dyn quarry_core::Driver>, params: quarry_core::ConnectParams) {
//! let pool = Arc::new(ConnectionPool::new(params, driver, PoolConfig::default()));
//! pool.start(); // background sweep: ping idle, expire stale, refill to min
//!
//! let mut conn = pool.borrow(Duration::from_secs(10)).await.unwrap();
//! let result = conn
//!     .session()
//!     .execute("SELECT 1", &[], quarry_core::CallOptions::default())
//!     .await;
//! pool.release(conn, ConnOutcome::Ok);
//! # }
//! ```

pub use config::{PoolConfig, PoolConfigBuilder};
pub use error::PoolError;
pub use pool::{ConnOutcome, ConnectionPool, PoolStats, PooledConnection};

mod config;
mod error;
mod pool;
