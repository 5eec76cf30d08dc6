//! Binds started branches to barrier positions.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};

use super::{NodeStartInfo, OrchestrationObserver, StrategyExpansion};
use crate::core::BarrierState;
use crate::errors::Result;
use crate::service::BarrierService;

/// Adds a position per strategy copy and calls `update_position` for every
/// started node.
///
/// Nodes inside a strategy are bound per concrete copy when
/// `strategy_aware_positions` is on. With it off, expansions are ignored
/// and a start binds every copy of its setup.
#[derive(Debug, Clone)]
pub struct BarrierPositionHelper {
    service: Arc<BarrierService>,
}

impl BarrierPositionHelper {
    /// Creates a helper.
    #[must_use]
    pub fn new(service: Arc<BarrierService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl OrchestrationObserver for BarrierPositionHelper {
    async fn on_strategy_expanded(&self, expansion: &StrategyExpansion) -> Result<()> {
        if !self.service.config().strategy_aware_positions {
            return Ok(());
        }
        let standing = self
            .service
            .find_by_plan_execution_id_and_state_in(
                &expansion.plan_execution_id,
                &[BarrierState::Standing],
            )
            .await?;
        for instance in standing {
            let positions = expansion.copy_positions(instance.positions());
            if positions.is_empty() {
                continue;
            }
            let copies = positions.len();
            self.service
                .update_barrier_position_info_list_and_strategy_concurrency(
                    &instance.identifier,
                    &expansion.plan_execution_id,
                    positions,
                    &expansion.strategy_setup_id,
                    expansion.concurrency,
                )
                .await?;
            debug!(
                identifier = %instance.identifier,
                strategy_setup_id = %expansion.strategy_setup_id,
                copies,
                "Added strategy copies to barrier"
            );
        }
        Ok(())
    }

    async fn on_node_start(&self, node: &NodeStartInfo) -> Result<()> {
        let use_additional_filters =
            self.service.config().strategy_aware_positions && node.inside_strategy;

        let bound = self
            .service
            .update_position(
                &node.plan_execution_id,
                node.kind,
                &node.setup_id,
                &node.runtime_id,
                node.stage_runtime_id.as_deref(),
                node.step_group_runtime_id.as_deref(),
                use_additional_filters,
            )
            .await?;
        trace!(runtime_id = %node.runtime_id, barriers = bound.len(), "Node start handled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BarrierServiceConfig;
    use crate::core::BarrierPositionType;
    use crate::model::{BarrierExecutionInstance, BarrierSetupInfo};
    use crate::observers::StrategyCopy;
    use crate::store::InMemoryBarrierStore;
    use crate::testing::{
        assert_bound_count, strategy_copy_positions, RecordingWaitNotify, StaticStatusProvider,
    };

    async fn matrix_service(config: BarrierServiceConfig) -> (Arc<BarrierService>, String) {
        let service = BarrierService::new(
            Arc::new(InMemoryBarrierStore::new()),
            Arc::new(StaticStatusProvider::new()),
            Arc::new(RecordingWaitNotify::new()),
        )
        .with_config(config);
        let saved = service
            .save(BarrierExecutionInstance::new(
                "plan1",
                BarrierSetupInfo::new("b1", "b1"),
                strategy_copy_positions(),
            ))
            .await
            .unwrap();
        (Arc::new(service), saved.uuid)
    }

    fn step_start() -> NodeStartInfo {
        NodeStartInfo::new("plan1", BarrierPositionType::Step, "step", "stepRun")
            .with_ancestors(Some("stageRun1".into()), Some("groupRun2".into()))
            .inside_strategy()
    }

    #[tokio::test]
    async fn test_node_inside_strategy_binds_its_own_copy() {
        let (service, uuid) = matrix_service(BarrierServiceConfig::default()).await;
        let helper = BarrierPositionHelper::new(service.clone());

        helper.on_node_start(&step_start()).await.unwrap();

        let loaded = service.get(&uuid).await.unwrap();
        assert_bound_count(&loaded, BarrierPositionType::Step, 1);
    }

    #[tokio::test]
    async fn test_expansion_skips_barriers_outside_the_strategy() {
        let (service, uuid) = matrix_service(BarrierServiceConfig::default()).await;
        let helper = BarrierPositionHelper::new(service.clone());
        let before = service.get(&uuid).await.unwrap();

        let expansion = StrategyExpansion::new(
            "plan1",
            BarrierPositionType::Stage,
            "elsewhere",
            "elsewhere_strategy",
            2,
        )
        .with_copy(StrategyCopy::new("s1"))
        .with_copy(StrategyCopy::new("s2"));
        helper.on_strategy_expanded(&expansion).await.unwrap();

        let after = service.get(&uuid).await.unwrap();
        assert_eq!(after.positions(), before.positions());
        assert!(after.setup_info.strategy_concurrency_map.is_empty());
    }

    #[tokio::test]
    async fn test_strategy_awareness_can_be_switched_off() {
        let config = BarrierServiceConfig::default().with_strategy_aware_positions(false);
        let (service, uuid) = matrix_service(config).await;
        let helper = BarrierPositionHelper::new(service.clone());

        helper.on_node_start(&step_start()).await.unwrap();

        let loaded = service.get(&uuid).await.unwrap();
        assert_bound_count(&loaded, BarrierPositionType::Step, 4);
    }
}
