//! The warehouse driver contract.
//!
//! The wire protocol is an external dependency. The core only requires
//! that the driver can open a session for an account, execute a statement,
//! answer a ping, and classify its failures via [`DriverError`].

use crate::error::DriverError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Static connection parameters for one service account, as the driver
/// consumes them.
///
/// Everything beyond the username is opaque to the core; warehouse-specific
/// settings (host, role, warehouse name) travel in `options`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectParams {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Rows returned by a successful execute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub rows: Vec<serde_json::Value>,
    pub row_count: usize,
}

impl QueryRows {
    pub fn new(rows: Vec<serde_json::Value>) -> Self {
        let row_count = rows.len();
        Self { rows, row_count }
    }
}

/// Options a session receives with each call.
///
/// Advisory from the driver's point of view: the dispatch path enforces
/// the deadline itself, but drivers that can push a statement timeout or
/// a result-size cap down to the warehouse should.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
    pub byte_cap: Option<u64>,
}

/// Per-call options on the dispatch path.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Deadline for the driver call. `None` means the caller accepts the
    /// component default.
    pub timeout: Option<Duration>,
    /// Try this account first when it is available; fall through to the
    /// ranked candidates otherwise.
    pub preferred_account: Option<String>,
    /// Advisory cap on result size, passed through to the driver.
    pub byte_cap: Option<u64>,
}

impl ExecuteOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }
}

/// Opens sessions against the warehouse.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Session>, DriverError>;
}

/// One live warehouse session.
///
/// Sessions are owned exclusively by the pool that created them; borrowers
/// get `&mut` access for the duration of a lease, so implementations need
/// no interior locking.
#[async_trait]
pub trait Session: Send + Sync + std::fmt::Debug {
    /// Execute a statement with positional parameters.
    async fn execute(
        &mut self,
        sql: &str,
        params: &[serde_json::Value],
        opts: CallOptions,
    ) -> Result<QueryRows, DriverError>;

    /// Lightweight liveness probe.
    async fn ping(&mut self) -> Result<(), DriverError>;

    /// Close the session. Best-effort; errors are swallowed by the driver.
    async fn close(&mut self);

    /// Cheap, synchronous view of whether the session believes it is
    /// still connected.
    fn is_up(&self) -> bool;
}
