//! Property tests for the account breaker.
//!
//! Invariants tested:
//! - Every reachable state is a valid transition of the documented FSM
//! - The windowed failure count never exceeds the failures recorded
//! - Crossing the threshold without an intervening success always opens
//! - Monotonic totals never decrease

use proptest::prelude::*;
use quarry_breaker::{BreakerConfig, BreakerRegistry, BreakerState};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Op {
    Failure,
    Success,
    CanExecute,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Failure),
        2 => Just(Op::Success),
        2 => Just(Op::CanExecute),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any operation sequence leaves the breaker in a legal state with
    /// coherent counters. The recovery timeout is long, so open states
    /// cannot silently half-open mid-sequence.
    #[test]
    fn state_machine_stays_coherent(ops in proptest::collection::vec(op_strategy(), 1..120)) {
        let registry = BreakerRegistry::new(
            BreakerConfig::builder()
                .failure_threshold(3)
                .success_threshold(2)
                .recovery_timeout(Duration::from_secs(600))
                .build(),
        );
        let breaker = registry.breaker_for("svc1");

        let mut failures_recorded: u64 = 0;
        let mut successes_recorded: u64 = 0;

        for op in &ops {
            match op {
                Op::Failure => {
                    breaker.record_failure();
                    failures_recorded += 1;
                }
                Op::Success => {
                    breaker.record_success();
                    successes_recorded += 1;
                }
                Op::CanExecute => {
                    let permitted = breaker.can_execute();
                    // With a 10-minute recovery timeout an open breaker
                    // must keep rejecting.
                    if breaker.state() == BreakerState::Open {
                        prop_assert!(!permitted);
                    }
                }
            }

            let metrics = breaker.metrics();
            prop_assert_eq!(metrics.total_failures, failures_recorded);
            prop_assert_eq!(metrics.total_successes, successes_recorded);
            prop_assert!(metrics.failure_count as u64 <= failures_recorded);
            match metrics.state {
                BreakerState::Open => prop_assert!(metrics.next_retry_at.is_some()),
                BreakerState::Closed => prop_assert!(metrics.next_retry_at.is_none()),
                BreakerState::HalfOpen => {}
            }
        }
    }

    /// N consecutive failures from closed, threshold <= N, no successes:
    /// the breaker is open with a future retry deadline.
    #[test]
    fn threshold_crossing_always_opens(extra in 0usize..10) {
        let threshold = 3u32;
        let registry = BreakerRegistry::new(
            BreakerConfig::builder()
                .failure_threshold(threshold)
                .recovery_timeout(Duration::from_secs(600))
                .build(),
        );
        let breaker = registry.breaker_for("svc1");

        for _ in 0..(threshold as usize + extra) {
            breaker.record_failure();
        }

        prop_assert_eq!(breaker.state(), BreakerState::Open);
        let metrics = breaker.metrics();
        prop_assert!(metrics.failure_count >= threshold as usize);
        prop_assert!(metrics.next_retry_at.is_some());
    }

    /// Reset always lands closed with zeroed counters, whatever came
    /// before.
    #[test]
    fn reset_is_total(ops in proptest::collection::vec(op_strategy(), 0..40)) {
        let registry = BreakerRegistry::new(BreakerConfig::default());
        let breaker = registry.breaker_for("svc1");
        for op in &ops {
            match op {
                Op::Failure => breaker.record_failure(),
                Op::Success => breaker.record_success(),
                Op::CanExecute => {
                    breaker.can_execute();
                }
            }
        }

        breaker.reset();
        let metrics = breaker.metrics();
        prop_assert_eq!(metrics.state, BreakerState::Closed);
        prop_assert_eq!(metrics.failure_count, 0);
        prop_assert_eq!(metrics.total_failures, 0);
        prop_assert_eq!(metrics.total_successes, 0);
        prop_assert_eq!(metrics.next_retry_at, None);
    }
}
