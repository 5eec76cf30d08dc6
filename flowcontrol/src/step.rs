//! The barrier step: what a branch runs when it reaches a barrier.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::core::BarrierState;
use crate::errors::{FlowControlError, Result};
use crate::model::BarrierResponseData;
use crate::service::BarrierService;
use crate::waitnotify::InMemoryWaitNotify;

/// Parameters of a barrier step, as compiled from `spec.barrierRef`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarrierStepParameters {
    /// The referenced barrier identifier.
    #[serde(alias = "barrierRef")]
    pub identifier: String,
}

/// Parks a branch on its barrier until the barrier is released.
///
/// `waits` must be the same engine the service signals, otherwise a parked
/// branch is never resumed.
#[derive(Debug, Clone)]
pub struct BarrierStep {
    service: Arc<BarrierService>,
    waits: Arc<InMemoryWaitNotify>,
}

impl BarrierStep {
    /// Creates a barrier step.
    #[must_use]
    pub fn new(service: Arc<BarrierService>, waits: Arc<InMemoryWaitNotify>) -> Self {
        Self { service, waits }
    }

    /// Waits at the barrier.
    ///
    /// Returns at once if the barrier already left `STANDING`. Otherwise the
    /// branch parks on the barrier's uuid, ticks the barrier once (it may be
    /// the last participant) and yields until released. A failed release is
    /// returned as a response with `failed` set, not as an error.
    #[instrument(skip(self), fields(identifier = %parameters.identifier))]
    pub async fn execute(
        &self,
        plan_execution_id: &str,
        parameters: &BarrierStepParameters,
    ) -> Result<BarrierResponseData> {
        let instance = self
            .service
            .find_by_identifier_and_plan_execution_id(&parameters.identifier, plan_execution_id)
            .await?
            .ok_or_else(|| FlowControlError::not_found(&parameters.identifier))?;

        match instance.barrier_state {
            BarrierState::Down => return Ok(BarrierResponseData::down()),
            state @ (BarrierState::Endure | BarrierState::TimedOut) => {
                return Ok(BarrierResponseData::failure(
                    state,
                    format!("Barrier {} was already released with state {state}", instance.identifier),
                ));
            }
            BarrierState::Standing => {}
        }

        let handle = self.waits.await_done(&instance.uuid);
        self.service.update(&instance).await?;
        debug!(barrier_id = %instance.uuid, released = handle.is_ready(), "Waiting at barrier");
        handle.wait().await
    }
}
