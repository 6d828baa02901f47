use crate::breaker::BreakerState;
use quarry_core::ComponentEvent;
use std::time::Duration;

/// Events emitted by an account's breaker.
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    /// The breaker moved between states.
    StateTransition {
        account: String,
        from: BreakerState,
        to: BreakerState,
    },
    /// A call was allowed through.
    CallPermitted {
        account: String,
        state: BreakerState,
    },
    /// A call was refused because the breaker is open.
    CallRejected {
        account: String,
        /// Time until the next half-open probe window, if known.
        retry_in: Option<Duration>,
    },
    /// A success was recorded.
    SuccessRecorded {
        account: String,
        state: BreakerState,
    },
    /// A failure was recorded.
    FailureRecorded {
        account: String,
        state: BreakerState,
    },
}

impl ComponentEvent for BreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BreakerEvent::StateTransition { .. } => "state_transition",
            BreakerEvent::CallPermitted { .. } => "call_permitted",
            BreakerEvent::CallRejected { .. } => "call_rejected",
            BreakerEvent::SuccessRecorded { .. } => "success_recorded",
            BreakerEvent::FailureRecorded { .. } => "failure_recorded",
        }
    }

    fn component(&self) -> &str {
        match self {
            BreakerEvent::StateTransition { account, .. }
            | BreakerEvent::CallPermitted { account, .. }
            | BreakerEvent::CallRejected { account, .. }
            | BreakerEvent::SuccessRecorded { account, .. }
            | BreakerEvent::FailureRecorded { account, .. } => account,
        }
    }
}
