//! Persisted barrier data model.
//!
//! One [`BarrierExecutionInstance`] exists per `(plan_execution_id, identifier)`.
//! Its setup info is a union of everything discovered so far; its position
//! list only ever grows, and runtime ids inside a position bind at most once.

mod instance;
mod position;
mod response;

pub use instance::{BarrierExecutionInstance, BarrierSetupInfo, StageDetail};
pub use position::{BarrierPosition, BarrierPositionInfo};
pub use response::BarrierResponseData;
