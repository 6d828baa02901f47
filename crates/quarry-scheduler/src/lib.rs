//! Bounded asynchronous query ticket scheduler.
//!
//! Clients get a ticket back synchronously and poll it for the result;
//! executions run in the background through a [`TemplateExecutor`]
//! (in production, the connection manager), at most `max_concurrent` at
//! a time, dispatched strictly FIFO. Cancellation is only valid while a
//! ticket is still pending; a running execution is never interrupted.
//!
//! ```rust,no_run
//! use quarry_scheduler::{SchedulerConfig, TicketOptions, TicketScheduler};
//! use std::sync::Arc;
//!
//! # async fn example(executor: Arc<dyn quarry_core::TemplateExecutor>) {
//! let scheduler = TicketScheduler::new(executor, SchedulerConfig::default());
//! scheduler.start();
//!
//! let ticket = scheduler
//!     .create_ticket("DAILY_ROLLUP", vec![], TicketOptions::default())
//!     .unwrap();
//! // ... later ...
//! let snapshot = scheduler.get_ticket(ticket.ticket_id);
//! # }
//! ```
//!
//! [`TemplateExecutor`]: quarry_core::TemplateExecutor

pub use config::{SchedulerConfig, SchedulerConfigBuilder};
pub use scheduler::{SchedulerError, SchedulerStats, TicketScheduler};
pub use ticket::{QueryTicket, TicketOptions, TicketStatus};

mod config;
mod scheduler;
mod ticket;
