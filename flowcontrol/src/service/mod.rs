//! Barrier coordination service.
//!
//! This module provides:
//! - `BarrierService`, the coordinator the execution engine calls
//! - The collaborator ports it consumes

mod coordinator;
mod ports;


pub use coordinator::{BarrierService, PLAN_FAILED_MESSAGE, TEARDOWN_MESSAGE};
pub use ports::{NodeStatusProvider, WaitNotifyEngine};
