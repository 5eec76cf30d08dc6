//! Creates a plan's barriers when it starts.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::OrchestrationObserver;
use crate::errors::Result;
use crate::service::BarrierService;

/// Scans the pipeline for barriers and saves one `STANDING` instance per
/// declared barrier.
///
/// A repeated start for the same plan is ignored.
#[derive(Debug, Clone)]
pub struct BarrierInitializer {
    service: Arc<BarrierService>,
}

impl BarrierInitializer {
    /// Creates an initializer.
    #[must_use]
    pub fn new(service: Arc<BarrierService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl OrchestrationObserver for BarrierInitializer {
    async fn on_plan_start(&self, plan_execution_id: &str, pipeline_yaml: &str) -> Result<()> {
        let resolved = self.service.resolve_barriers(pipeline_yaml)?;
        if resolved.is_empty() {
            return Ok(());
        }

        let existing = self
            .service
            .find_by_plan_execution_id_and_state_in(plan_execution_id, &[])
            .await?;
        if !existing.is_empty() {
            debug!(plan_execution_id, "Barriers already initialized");
            return Ok(());
        }

        let saved = self
            .service
            .save_all(resolved.into_instances(plan_execution_id))
            .await?;
        info!(plan_execution_id, barriers = saved.len(), "Initialized barriers");
        Ok(())
    }
}
