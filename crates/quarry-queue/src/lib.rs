//! Durable NDJSON event-ingest queue.
//!
//! The asynchronous counterpart of the synchronous query path: clients
//! push enrichment events, the queue appends them as newline-delimited
//! JSON to a single active file, rotates on size or age, deduplicates by
//! `activity_id`, and rejects pushes with backpressure once the active
//! file is full. Rotated files are immutable and announced on the event
//! fan-out for the remote-storage uploader to collect.
//!
//! Each record on disk is the caller's payload plus four reserved
//! fields: `activity_id`, `ts`, `_queued_at`, `_queue_sequence`.
//! Payloads that redefine a reserved field are rejected.

pub use config::{QueueConfig, QueueConfigBuilder};
pub use error::QueueError;
pub use queue::{EventQueue, PushOutcome, QueueEvent, QueueHealth, QueueStats};
pub use record::{EventRecord, RESERVED_FIELDS};

mod config;
mod error;
mod queue;
mod record;
