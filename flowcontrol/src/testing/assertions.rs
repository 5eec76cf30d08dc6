//! Assertions for barrier instances and release payloads.

use crate::core::{BarrierPositionType, BarrierState};
use crate::model::{BarrierExecutionInstance, BarrierResponseData};

/// Asserts the barrier's state.
pub fn assert_barrier_state(instance: &BarrierExecutionInstance, expected: BarrierState) {
    assert_eq!(
        instance.barrier_state, expected,
        "Expected barrier {} to be {}, got {}",
        instance.identifier, expected, instance.barrier_state
    );
}

/// Asserts the payload released waiters with a failure in `state`.
pub fn assert_released_with_failure(response: &BarrierResponseData, state: BarrierState) {
    assert!(response.failed, "Expected a failure release, got {response:?}");
    assert_eq!(response.barrier_state, state);
    assert!(
        response.error_message.is_some(),
        "Failure release without an error message"
    );
}

/// Asserts how many positions have a runtime id bound at `kind`.
pub fn assert_bound_count(
    instance: &BarrierExecutionInstance,
    kind: BarrierPositionType,
    expected: usize,
) {
    let bound = instance
        .positions()
        .iter()
        .filter(|p| p.runtime_id(kind).is_some())
        .count();
    assert_eq!(
        bound, expected,
        "Expected {expected} positions bound at {kind} on barrier {}, got {bound}",
        instance.identifier
    );
}
