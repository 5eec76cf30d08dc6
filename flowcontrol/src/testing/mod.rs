//! Testing utilities for barrier coordination.
//!
//! This module provides:
//! - Sample pipeline definitions
//! - Scripted status and wait/notify collaborators
//! - Assertions for barrier instances

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{assert_barrier_state, assert_bound_count, assert_released_with_failure};
pub use fixtures::{
    bound_step_barrier, strategy_copy_positions, BROKEN_PIPELINE_YAML,
    LOOPING_STEP_GROUP_PIPELINE_YAML, MATRIX_PIPELINE_YAML, MATRIX_STAGE_PIPELINE_YAML,
    THREE_BARRIER_PIPELINE_YAML, UNDECLARED_BARRIER_PIPELINE_YAML,
};
pub use mocks::{RecordingWaitNotify, StaticStatusProvider};
