use chrono::{DateTime, Utc};
use quarry_core::QueryRows;
use std::time::Duration;
use uuid::Uuid;

/// Ticket lifecycle. Transitions are monotone:
/// `Pending → {Running → {Completed, Failed} | Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TicketStatus {
    /// Terminal states are never left and are eligible for garbage
    /// collection.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TicketStatus::Completed | TicketStatus::Failed | TicketStatus::Cancelled
        )
    }
}

/// Per-ticket options supplied at creation.
#[derive(Debug, Clone, Default)]
pub struct TicketOptions {
    /// Deadline for the execution once dispatched.
    pub timeout: Option<Duration>,
    /// Advisory cap on result size.
    pub byte_cap: Option<u64>,
}

/// A handle for one asynchronous query execution.
///
/// Callers only ever see clones; the scheduler is the single writer.
#[derive(Debug, Clone)]
pub struct QueryTicket {
    pub ticket_id: Uuid,
    pub status: TicketStatus,
    pub template: String,
    pub params: Vec<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<QueryRows>,
    pub error: Option<String>,
    /// 0 at creation, 100 on completion.
    pub progress: u8,
    pub byte_cap: Option<u64>,
    pub(crate) timeout: Option<Duration>,
}

impl QueryTicket {
    pub(crate) fn new(
        template: String,
        params: Vec<serde_json::Value>,
        opts: TicketOptions,
    ) -> Self {
        Self {
            ticket_id: Uuid::new_v4(),
            status: TicketStatus::Pending,
            template,
            params,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            progress: 0,
            byte_cap: opts.byte_cap,
            timeout: opts.timeout,
        }
    }

    /// Age of the ticket since creation.
    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.created_at)
            .to_std()
            .unwrap_or_default()
    }
}
