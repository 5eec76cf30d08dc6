//! Barrier lifecycle events.
//!
//! The service emits one event per observable lifecycle step. Sinks decide
//! what to do with them: log, collect for tests, or drop.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::model::BarrierExecutionInstance;

/// A barrier instance was created for a plan execution.
pub const BARRIER_CREATED: &str = "barrier.created";
/// A runtime branch was bound to one or more positions.
pub const BARRIER_POSITION_BOUND: &str = "barrier.position_bound";
/// A barrier left `STANDING`.
pub const BARRIER_STATE_CHANGED: &str = "barrier.state_changed";
/// Waiters parked on a barrier were released.
pub const BARRIER_RELEASED: &str = "barrier.released";
/// A plan execution's barriers were deleted.
pub const BARRIER_TEARDOWN: &str = "barrier.teardown";

/// Standard event payload describing an instance.
#[must_use]
pub fn instance_payload(instance: &BarrierExecutionInstance) -> serde_json::Value {
    serde_json::json!({
        "uuid": instance.uuid,
        "identifier": instance.identifier,
        "plan_execution_id": instance.plan_execution_id,
        "state": instance.barrier_state,
        "positions": instance.positions().len(),
    })
}
