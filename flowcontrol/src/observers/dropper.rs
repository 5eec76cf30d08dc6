//! Ticks barriers when participants or plans change status.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{NodeStatusUpdate, OrchestrationObserver};
use crate::core::{BarrierState, ExecutionStatus};
use crate::errors::{FlowControlError, Result};
use crate::model::BarrierExecutionInstance;
use crate::service::BarrierService;

/// Drives the barrier state machine from engine status changes.
#[derive(Debug, Clone)]
pub struct BarrierDropper {
    service: Arc<BarrierService>,
}

impl BarrierDropper {
    /// Creates a dropper.
    #[must_use]
    pub fn new(service: Arc<BarrierService>) -> Self {
        Self { service }
    }

    async fn tick_all(&self, barriers: Vec<BarrierExecutionInstance>) -> Result<()> {
        for barrier in barriers {
            if barrier.notified {
                continue;
            }
            match self.service.update(&barrier).await {
                Ok(ticked) if ticked.barrier_state != barrier.barrier_state => {
                    debug!(
                        barrier_id = %ticked.uuid,
                        to = %ticked.barrier_state,
                        "Barrier dropped"
                    );
                }
                Ok(_) => {}
                // Torn down between the query and the tick.
                Err(FlowControlError::NotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl OrchestrationObserver for BarrierDropper {
    async fn on_node_status_update(&self, update: &NodeStatusUpdate) -> Result<()> {
        let barriers = self
            .service
            .find_by_position(&update.plan_execution_id, update.kind, &update.setup_id)
            .await?;
        self.tick_all(barriers).await
    }

    async fn on_plan_status_update(
        &self,
        plan_execution_id: &str,
        _status: ExecutionStatus,
    ) -> Result<()> {
        let barriers = self
            .service
            .find_by_plan_execution_id_and_state_in(plan_execution_id, &[BarrierState::Standing])
            .await?;
        self.tick_all(barriers).await
    }
}
