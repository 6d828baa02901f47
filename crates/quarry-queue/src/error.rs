use thiserror::Error;

/// Push and lifecycle failures.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The active file holds `max_events` events; backpressure is on
    /// until rotation makes room.
    #[error("event queue is at capacity ({max_events} events)")]
    AtCapacity { max_events: u64 },

    /// The payload redefines one of the reserved enrichment fields.
    #[error("payload redefines reserved field `{0}`")]
    ReservedField(String),

    #[error("event queue I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("event failed to serialize: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("event queue is closed")]
    Closed,
}

impl QueueError {
    pub fn is_at_capacity(&self) -> bool {
        matches!(self, QueueError::AtCapacity { .. })
    }
}
