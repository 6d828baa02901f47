use quarry_core::DriverError;
use thiserror::Error;

/// Borrow failures.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool is at capacity and nothing was released in time.
    #[error("timed out waiting for a `{account}` connection")]
    Timeout { account: String },

    /// The pool has been closed.
    #[error("pool for `{account}` is closed")]
    Closed { account: String },

    /// Opening a fresh session failed.
    #[error("failed to open a `{account}` connection: {source}")]
    Connect {
        account: String,
        #[source]
        source: DriverError,
    },
}

impl PoolError {
    /// The failure as the dispatch path records it against the account's
    /// breaker: every borrow failure is a connection-level failure.
    pub fn as_driver_error(&self) -> DriverError {
        match self {
            PoolError::Timeout { account } => {
                DriverError::timeout(format!("connection acquire timed out for `{account}`"))
            }
            PoolError::Closed { account } => {
                DriverError::network(format!("pool for `{account}` is closed"))
            }
            PoolError::Connect { source, .. } => source.clone(),
        }
    }
}
