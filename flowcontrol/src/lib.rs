//! # Flowcontrol
//!
//! Barrier synchronization for a pipeline-orchestration engine.
//!
//! A barrier is a named rendezvous point. Stages, step groups and steps that
//! reference it, including the copies a matrix or loop strategy fans out at
//! runtime, must all reach it before any of them proceeds. Flowcontrol
//! provides:
//!
//! - **Definition scanning**: barrier declarations and references from pipeline YAML
//! - **Persisted barrier state**: one instance per barrier per plan execution,
//!   mutated only through atomic store updates
//! - **Position binding**: concrete runtime branches bound to structural positions,
//!   per strategy copy
//! - **A one-way state machine**: `STANDING` to `DOWN`, `ENDURE` or `TIMED_OUT`,
//!   releasing parked branches exactly once
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowcontrol::prelude::*;
//!
//! let waits = Arc::new(InMemoryWaitNotify::new());
//! let service = Arc::new(BarrierService::new(
//!     Arc::new(InMemoryBarrierStore::new()),
//!     engine_statuses,
//!     waits.clone(),
//! ));
//!
//! // When the plan starts
//! BarrierInitializer::new(service.clone())
//!     .on_plan_start(&plan_execution_id, &pipeline_yaml)
//!     .await?;
//!
//! // When a branch reaches its barrier step
//! let response = BarrierStep::new(service, waits)
//!     .execute(&plan_execution_id, &parameters)
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod definition;
pub mod errors;
pub mod events;
pub mod model;
pub mod observability;
pub mod observers;
pub mod service;
pub mod step;
pub mod store;
pub mod testing;
pub mod utils;
pub mod waitnotify;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::BarrierServiceConfig;
    pub use crate::core::{BarrierPositionType, BarrierState, ExecutionStatus, ParticipantState};
    pub use crate::definition::{BarrierDefinitionScanner, BarrierPositionResolver};
    pub use crate::errors::{BarrierDefinitionError, FlowControlError, Result, StoreError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::model::{
        BarrierExecutionInstance, BarrierPosition, BarrierPositionInfo, BarrierResponseData,
        BarrierSetupInfo, StageDetail,
    };
    pub use crate::observers::{
        BarrierDropper, BarrierInitializer, BarrierPositionHelper, NodeStartInfo,
        NodeStatusUpdate, ObserverChain, OrchestrationObserver, StrategyCopy, StrategyExpansion,
    };
    pub use crate::service::{BarrierService, NodeStatusProvider, WaitNotifyEngine};
    pub use crate::step::{BarrierStep, BarrierStepParameters};
    pub use crate::store::{BarrierStore, InMemoryBarrierStore};
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
    pub use crate::waitnotify::{InMemoryWaitNotify, WaitHandle};
}
