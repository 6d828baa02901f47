use crate::config::SchedulerConfig;
use crate::ticket::{QueryTicket, TicketOptions, TicketStatus};
use chrono::Utc;
use quarry_core::{ExecuteOptions, TemplateExecutor};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Ticket creation failures.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The pending queue is at its configured depth.
    #[error("ticket queue is full ({depth} pending)")]
    QueueFull { depth: usize },

    /// The scheduler has been closed.
    #[error("scheduler is closed")]
    Closed,
}

/// Counters exposed to operators.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub pending: usize,
    pub active: usize,
    pub tracked: usize,
    pub total_created: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_cancelled: u64,
}

struct SchedState {
    tickets: HashMap<Uuid, QueryTicket>,
    queue: VecDeque<Uuid>,
    active: usize,
    total_created: u64,
    total_completed: u64,
    total_failed: u64,
    total_cancelled: u64,
}

struct Inner {
    executor: Arc<dyn TemplateExecutor>,
    config: SchedulerConfig,
    state: Mutex<SchedState>,
    signal: Notify,
    closed: AtomicBool,
}

/// Bounded FIFO of query tickets with a global concurrency cap.
///
/// [`create_ticket`] returns synchronously with a `Pending` snapshot;
/// the dispatcher task pops FIFO while fewer than `max_concurrent`
/// executions are in flight and runs each through the
/// [`TemplateExecutor`]. Completion order is not enqueue order — only
/// dispatch order is.
///
/// The scheduler is the single writer of ticket state; callers always
/// receive clones.
///
/// [`create_ticket`]: TicketScheduler::create_ticket
pub struct TicketScheduler {
    inner: Arc<Inner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TicketScheduler {
    pub fn new(executor: Arc<dyn TemplateExecutor>, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                executor,
                config,
                state: Mutex::new(SchedState {
                    tickets: HashMap::new(),
                    queue: VecDeque::new(),
                    active: 0,
                    total_created: 0,
                    total_completed: 0,
                    total_failed: 0,
                    total_cancelled: 0,
                }),
                signal: Notify::new(),
                closed: AtomicBool::new(false),
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the dispatcher and the garbage-collection sweep.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().expect("scheduler mutex poisoned");
        if !tasks.is_empty() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        tasks.push(tokio::spawn(async move {
            loop {
                inner.signal.notified().await;
                Inner::dispatch_ready(&inner);
            }
        }));

        let inner = Arc::clone(&self.inner);
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(inner.config.sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                Inner::sweep_once(&inner);
            }
        }));
    }

    /// Enqueue a query and return its `Pending` ticket immediately.
    pub fn create_ticket(
        &self,
        template: impl Into<String>,
        params: Vec<serde_json::Value>,
        opts: TicketOptions,
    ) -> Result<QueryTicket, SchedulerError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::Closed);
        }
        let ticket = QueryTicket::new(template.into(), params, opts);
        let snapshot = {
            let mut state = self.inner.state.lock().expect("scheduler mutex poisoned");
            if state.queue.len() >= self.inner.config.max_queue_depth {
                return Err(SchedulerError::QueueFull {
                    depth: state.queue.len(),
                });
            }
            state.queue.push_back(ticket.ticket_id);
            state.total_created += 1;
            let snapshot = ticket.clone();
            state.tickets.insert(ticket.ticket_id, ticket);
            snapshot
        };
        tracing::debug!(ticket = %snapshot.ticket_id, template = %snapshot.template, "ticket created");
        self.inner.signal.notify_one();
        Ok(snapshot)
    }

    /// Cancel a pending ticket. Returns false for running, terminal, or
    /// unknown tickets — cancellation is only valid before dispatch.
    pub fn cancel_ticket(&self, id: Uuid) -> bool {
        let mut state = self.inner.state.lock().expect("scheduler mutex poisoned");
        let Some(ticket) = state.tickets.get_mut(&id) else {
            return false;
        };
        if ticket.status != TicketStatus::Pending {
            return false;
        }
        ticket.status = TicketStatus::Cancelled;
        ticket.completed_at = Some(Utc::now());
        state.queue.retain(|queued| *queued != id);
        state.total_cancelled += 1;
        tracing::debug!(ticket = %id, "ticket cancelled");
        true
    }

    /// Snapshot of one ticket.
    pub fn get_ticket(&self, id: Uuid) -> Option<QueryTicket> {
        let state = self.inner.state.lock().expect("scheduler mutex poisoned");
        state.tickets.get(&id).cloned()
    }

    /// Snapshot of the scheduler counters.
    pub fn stats(&self) -> SchedulerStats {
        let state = self.inner.state.lock().expect("scheduler mutex poisoned");
        SchedulerStats {
            pending: state.queue.len(),
            active: state.active,
            tracked: state.tickets.len(),
            total_created: state.total_created,
            total_completed: state.total_completed,
            total_failed: state.total_failed,
            total_cancelled: state.total_cancelled,
        }
    }

    /// Drop terminal tickets older than the retention window. The sweep
    /// task calls this on its interval; exposed for tests and operators.
    pub fn sweep_once(&self) {
        Inner::sweep_once(&self.inner);
    }

    /// Stop the dispatcher and sweep. Pending tickets stay queued but
    /// will not be dispatched; running executions finish.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let mut tasks = self.tasks.lock().expect("scheduler mutex poisoned");
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for TicketScheduler {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

impl Inner {
    /// Pop and launch pending tickets while capacity remains. Ticket
    /// state moves to `Running` under the lock, in FIFO pop order.
    fn dispatch_ready(inner: &Arc<Inner>) {
        loop {
            let job = {
                let mut state = inner.state.lock().expect("scheduler mutex poisoned");
                if state.active >= inner.config.max_concurrent {
                    None
                } else {
                    let mut next = None;
                    while let Some(id) = state.queue.pop_front() {
                        // Re-check: the ticket may have been cancelled
                        // between enqueue and pop.
                        let SchedState { tickets, active, .. } = &mut *state;
                        match tickets.get_mut(&id) {
                            Some(ticket) if ticket.status == TicketStatus::Pending => {
                                ticket.status = TicketStatus::Running;
                                ticket.started_at = Some(Utc::now());
                                *active += 1;
                                next = Some((
                                    id,
                                    ticket.template.clone(),
                                    ticket.params.clone(),
                                    ticket.timeout,
                                    ticket.byte_cap,
                                ));
                                break;
                            }
                            _ => continue,
                        }
                    }
                    next
                }
            };

            let Some((id, template, params, timeout, byte_cap)) = job else {
                return;
            };
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                let opts = ExecuteOptions {
                    timeout,
                    byte_cap,
                    ..Default::default()
                };
                let result = inner.executor.execute_template(&template, &params, opts).await;

                let mut state = inner.state.lock().expect("scheduler mutex poisoned");
                if let Some(ticket) = state.tickets.get_mut(&id) {
                    ticket.completed_at = Some(Utc::now());
                    match result {
                        Ok(rows) => {
                            ticket.status = TicketStatus::Completed;
                            ticket.progress = 100;
                            ticket.result = Some(rows);
                            state.total_completed += 1;
                        }
                        Err(err) => {
                            ticket.status = TicketStatus::Failed;
                            ticket.error = Some(err.to_string());
                            state.total_failed += 1;
                        }
                    }
                }
                state.active -= 1;
                drop(state);
                inner.signal.notify_one();
            });
        }
    }

    fn sweep_once(inner: &Arc<Inner>) {
        let retention = inner.config.ticket_retention;
        let mut state = inner.state.lock().expect("scheduler mutex poisoned");
        let before = state.tickets.len();
        state
            .tickets
            .retain(|_, ticket| !(ticket.status.is_terminal() && ticket.age() >= retention));
        let swept = before - state.tickets.len();
        if swept > 0 {
            tracing::debug!(swept, "swept expired tickets");
        }
    }
}
