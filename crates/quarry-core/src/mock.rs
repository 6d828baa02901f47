//! Scripted in-memory driver.
//!
//! Tests script per-account outcomes ahead of time; unscripted calls
//! succeed with a single `{"ok": 1}` row. Outcomes are consumed FIFO per
//! account, so a test can express "first call on `svc1` is rejected, the
//! second succeeds" without touching a warehouse.

use crate::driver::{CallOptions, ConnectParams, Driver, QueryRows, Session};
use crate::error::DriverError;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted call outcome.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Return these rows.
    Rows(QueryRows),
    /// Fail with this error.
    Fail(DriverError),
    /// Sleep this long, then return the default rows. Drives timeout
    /// paths: script a hang longer than the caller's deadline.
    Hang(Duration),
}

#[derive(Debug, Default)]
struct State {
    scripts: HashMap<String, VecDeque<ScriptedOutcome>>,
    connect_errors: HashMap<String, VecDeque<DriverError>>,
    ping_errors: HashMap<String, VecDeque<DriverError>>,
    connects: HashMap<String, usize>,
    executed: Vec<(String, String)>,
}

/// A [`Driver`] whose sessions replay scripted outcomes.
#[derive(Clone, Default)]
pub struct ScriptedDriver {
    state: Arc<Mutex<State>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for the next unscripted execute on `account`.
    pub fn script(&self, account: &str, outcome: ScriptedOutcome) {
        let mut state = self.state.lock().unwrap();
        state
            .scripts
            .entry(account.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Queue a failing execute on `account`.
    pub fn script_fail(&self, account: &str, err: DriverError) {
        self.script(account, ScriptedOutcome::Fail(err));
    }

    /// Queue a successful execute on `account` with the given rows.
    pub fn script_rows(&self, account: &str, rows: QueryRows) {
        self.script(account, ScriptedOutcome::Rows(rows));
    }

    /// Make the next `connect` for `account` fail.
    pub fn fail_next_connect(&self, account: &str, err: DriverError) {
        let mut state = self.state.lock().unwrap();
        state
            .connect_errors
            .entry(account.to_string())
            .or_default()
            .push_back(err);
    }

    /// Make the next `ping` on a session for `account` fail.
    pub fn fail_next_ping(&self, account: &str, err: DriverError) {
        let mut state = self.state.lock().unwrap();
        state
            .ping_errors
            .entry(account.to_string())
            .or_default()
            .push_back(err);
    }

    /// How many sessions have been opened for `account`.
    pub fn connect_count(&self, account: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.connects.get(account).copied().unwrap_or(0)
    }

    /// Every executed statement so far, as `(account, sql)` pairs in
    /// call order.
    pub fn executed(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().executed.clone()
    }

    /// How many statements have executed on `account`.
    pub fn executed_on(&self, account: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.executed.iter().filter(|(a, _)| a == account).count()
    }

    fn default_rows() -> QueryRows {
        QueryRows::new(vec![json!({"ok": 1})])
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Session>, DriverError> {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(errs) = state.connect_errors.get_mut(&params.username) {
                if let Some(err) = errs.pop_front() {
                    return Err(err);
                }
            }
            *state.connects.entry(params.username.clone()).or_insert(0) += 1;
        }
        Ok(Box::new(ScriptedSession {
            account: params.username.clone(),
            state: Arc::clone(&self.state),
            up: true,
        }))
    }
}

#[derive(Debug)]
struct ScriptedSession {
    account: String,
    state: Arc<Mutex<State>>,
    up: bool,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn execute(
        &mut self,
        sql: &str,
        _params: &[serde_json::Value],
        _opts: CallOptions,
    ) -> Result<QueryRows, DriverError> {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            state
                .executed
                .push((self.account.clone(), sql.to_string()));
            state
                .scripts
                .get_mut(&self.account)
                .and_then(VecDeque::pop_front)
        };
        match outcome {
            None => Ok(ScriptedDriver::default_rows()),
            Some(ScriptedOutcome::Rows(rows)) => Ok(rows),
            Some(ScriptedOutcome::Fail(err)) => Err(err),
            Some(ScriptedOutcome::Hang(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(ScriptedDriver::default_rows())
            }
        }
    }

    async fn ping(&mut self) -> Result<(), DriverError> {
        let err = {
            let mut state = self.state.lock().unwrap();
            state
                .ping_errors
                .get_mut(&self.account)
                .and_then(VecDeque::pop_front)
        };
        match err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn close(&mut self) {
        self.up = false;
    }

    fn is_up(&self) -> bool {
        self.up
    }
}
