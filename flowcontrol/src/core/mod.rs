//! Core barrier types: lifecycle state, position levels and engine statuses.

mod status;

pub use status::{BarrierPositionType, BarrierState, ExecutionStatus, ParticipantState};
