//! Execution engine hooks that drive barriers.
//!
//! The engine reports plan starts, strategy expansions, node starts and
//! status changes to a chain of observers. Three of them keep barriers
//! current:
//! - [`BarrierInitializer`] creates a plan's barriers when it starts
//! - [`BarrierPositionHelper`] adds a position per strategy copy and binds
//!   started branches to positions
//! - [`BarrierDropper`] ticks barriers when a participant's status changes

mod dropper;
mod initializer;
mod position_helper;

#[cfg(test)]
mod lifecycle_tests;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

pub use dropper::BarrierDropper;
pub use initializer::BarrierInitializer;
pub use position_helper::BarrierPositionHelper;

use crate::core::{BarrierPositionType, ExecutionStatus};
use crate::errors::Result;
use crate::model::BarrierPosition;

/// A node that just started running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStartInfo {
    /// Owning plan execution.
    pub plan_execution_id: String,
    /// Structural level of the node.
    pub kind: BarrierPositionType,
    /// Setup id of the node.
    pub setup_id: String,
    /// Runtime id of this concrete execution.
    pub runtime_id: String,
    /// Runtime id of the enclosing stage.
    pub stage_runtime_id: Option<String>,
    /// Runtime id of the enclosing step group.
    pub step_group_runtime_id: Option<String>,
    /// True if the node runs inside a matrix or loop expansion.
    pub inside_strategy: bool,
}

impl NodeStartInfo {
    /// Creates start info for a node outside any strategy.
    #[must_use]
    pub fn new(
        plan_execution_id: impl Into<String>,
        kind: BarrierPositionType,
        setup_id: impl Into<String>,
        runtime_id: impl Into<String>,
    ) -> Self {
        Self {
            plan_execution_id: plan_execution_id.into(),
            kind,
            setup_id: setup_id.into(),
            runtime_id: runtime_id.into(),
            stage_runtime_id: None,
            step_group_runtime_id: None,
            inside_strategy: false,
        }
    }

    /// Sets the ancestor runtime ids.
    #[must_use]
    pub fn with_ancestors(
        mut self,
        stage_runtime_id: Option<String>,
        step_group_runtime_id: Option<String>,
    ) -> Self {
        self.stage_runtime_id = stage_runtime_id;
        self.step_group_runtime_id = step_group_runtime_id;
        self
    }

    /// Marks the node as running inside a strategy.
    #[must_use]
    pub fn inside_strategy(mut self) -> Self {
        self.inside_strategy = true;
        self
    }
}

/// One concrete copy produced by a matrix, repeat or parallelism strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyCopy {
    /// Runtime id of the copy (a stage, step group or step execution).
    pub runtime_id: String,
    /// Runtime id of the stage the copy runs in, for group and step copies.
    pub stage_runtime_id: Option<String>,
    /// Runtime id of the step group the copy runs in, for step copies.
    pub step_group_runtime_id: Option<String>,
}

impl StrategyCopy {
    /// Creates a copy with no ancestors.
    #[must_use]
    pub fn new(runtime_id: impl Into<String>) -> Self {
        Self {
            runtime_id: runtime_id.into(),
            stage_runtime_id: None,
            step_group_runtime_id: None,
        }
    }

    /// Sets the ancestor runtime ids.
    #[must_use]
    pub fn with_ancestors(
        mut self,
        stage_runtime_id: Option<String>,
        step_group_runtime_id: Option<String>,
    ) -> Self {
        self.stage_runtime_id = stage_runtime_id;
        self.step_group_runtime_id = step_group_runtime_id;
        self
    }

    fn position_for(&self, template: &BarrierPosition, kind: BarrierPositionType) -> BarrierPosition {
        let mut position = template.unbound_from(kind);
        if let Some(stage) = &self.stage_runtime_id {
            position = position.with_runtime_id(BarrierPositionType::Stage, stage.clone());
        }
        if let Some(group) = &self.step_group_runtime_id {
            position = position.with_runtime_id(BarrierPositionType::StepGroup, group.clone());
        }
        position.with_runtime_id(kind, self.runtime_id.clone())
    }
}

/// A strategy node that was expanded into concrete copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyExpansion {
    /// Owning plan execution.
    pub plan_execution_id: String,
    /// Setup id of the expanded node.
    pub setup_id: String,
    /// Setup id of the strategy.
    pub strategy_setup_id: String,
    /// Structural level of the expanded node.
    pub kind: BarrierPositionType,
    /// The copies, in creation order.
    pub copies: Vec<StrategyCopy>,
    /// Declared max parallel copies.
    pub concurrency: u32,
}

impl StrategyExpansion {
    /// Creates an expansion with no copies yet.
    #[must_use]
    pub fn new(
        plan_execution_id: impl Into<String>,
        kind: BarrierPositionType,
        setup_id: impl Into<String>,
        strategy_setup_id: impl Into<String>,
        concurrency: u32,
    ) -> Self {
        Self {
            plan_execution_id: plan_execution_id.into(),
            setup_id: setup_id.into(),
            strategy_setup_id: strategy_setup_id.into(),
            kind,
            copies: Vec::new(),
            concurrency,
        }
    }

    /// Adds a copy.
    #[must_use]
    pub fn with_copy(mut self, copy: StrategyCopy) -> Self {
        self.copies.push(copy);
        self
    }

    /// One position per copy for every distinct position of `existing`
    /// that sits under the expanded node.
    ///
    /// Each carries the copy's runtime id at the expanded level plus its
    /// ancestor runtime ids; deeper levels stay unbound for node starts.
    #[must_use]
    pub fn copy_positions(&self, existing: &[BarrierPosition]) -> Vec<BarrierPosition> {
        let mut templates: Vec<&BarrierPosition> = Vec::new();
        for position in existing
            .iter()
            .filter(|p| p.setup_id(self.kind) == Some(self.setup_id.as_str()))
        {
            if !templates.iter().any(|template| template.same_setup(position)) {
                templates.push(position);
            }
        }
        templates
            .into_iter()
            .flat_map(|template| {
                self.copies
                    .iter()
                    .map(move |copy| copy.position_for(template, self.kind))
            })
            .collect()
    }
}

/// A node whose status changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatusUpdate {
    /// Owning plan execution.
    pub plan_execution_id: String,
    /// Structural level of the node.
    pub kind: BarrierPositionType,
    /// Setup id of the node.
    pub setup_id: String,
    /// Runtime id of this concrete execution.
    pub runtime_id: String,
    /// The new status.
    pub status: ExecutionStatus,
}

/// Engine lifecycle hook. Every method defaults to doing nothing.
#[async_trait]
pub trait OrchestrationObserver: Send + Sync {
    /// Called once when a plan execution starts.
    async fn on_plan_start(&self, _plan_execution_id: &str, _pipeline_yaml: &str) -> Result<()> {
        Ok(())
    }

    /// Called when a strategy node was expanded into concrete copies,
    /// before any of the copies start.
    async fn on_strategy_expanded(&self, _expansion: &StrategyExpansion) -> Result<()> {
        Ok(())
    }

    /// Called when a node starts.
    async fn on_node_start(&self, _node: &NodeStartInfo) -> Result<()> {
        Ok(())
    }

    /// Called when a node's status changes.
    async fn on_node_status_update(&self, _update: &NodeStatusUpdate) -> Result<()> {
        Ok(())
    }

    /// Called when a plan's aggregate status changes.
    async fn on_plan_status_update(
        &self,
        _plan_execution_id: &str,
        _status: ExecutionStatus,
    ) -> Result<()> {
        Ok(())
    }
}

/// Fans engine callbacks out to observers in registration order.
///
/// Every observer sees every callback; the first error is returned after
/// all of them ran.
#[derive(Default, Clone)]
pub struct ObserverChain {
    observers: Vec<Arc<dyn OrchestrationObserver>>,
}

impl std::fmt::Debug for ObserverChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverChain")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ObserverChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an observer.
    pub fn add(&mut self, observer: Arc<dyn OrchestrationObserver>) {
        self.observers.push(observer);
    }

    /// Number of observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Returns true if there are no observers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Reports a plan start.
    pub async fn plan_started(&self, plan_execution_id: &str, pipeline_yaml: &str) -> Result<()> {
        let mut first_error = None;
        for observer in &self.observers {
            if let Err(err) = observer.on_plan_start(plan_execution_id, pipeline_yaml).await {
                warn!(plan_execution_id, error = %err, "Plan start observer failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Reports a strategy expansion.
    pub async fn strategy_expanded(&self, expansion: &StrategyExpansion) -> Result<()> {
        let mut first_error = None;
        for observer in &self.observers {
            if let Err(err) = observer.on_strategy_expanded(expansion).await {
                warn!(
                    strategy_setup_id = %expansion.strategy_setup_id,
                    error = %err,
                    "Strategy expansion observer failed"
                );
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Reports a node start.
    pub async fn node_started(&self, node: &NodeStartInfo) -> Result<()> {
        let mut first_error = None;
        for observer in &self.observers {
            if let Err(err) = observer.on_node_start(node).await {
                warn!(runtime_id = %node.runtime_id, error = %err, "Node start observer failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Reports a node status change.
    pub async fn node_status_updated(&self, update: &NodeStatusUpdate) -> Result<()> {
        let mut first_error = None;
        for observer in &self.observers {
            if let Err(err) = observer.on_node_status_update(update).await {
                warn!(runtime_id = %update.runtime_id, error = %err, "Node status observer failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Reports a plan status change.
    pub async fn plan_status_updated(
        &self,
        plan_execution_id: &str,
        status: ExecutionStatus,
    ) -> Result<()> {
        let mut first_error = None;
        for observer in &self.observers {
            if let Err(err) = observer.on_plan_status_update(plan_execution_id, status).await {
                warn!(plan_execution_id, error = %err, "Plan status observer failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FlowControlError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl OrchestrationObserver for Recording {
        async fn on_node_start(&self, node: &NodeStartInfo) -> Result<()> {
            self.calls.lock().push(node.runtime_id.clone());
            if self.fail {
                return Err(FlowControlError::not_found(&node.runtime_id));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_chain_runs_every_observer_and_returns_first_error() {
        let failing = Arc::new(Recording {
            fail: true,
            ..Recording::default()
        });
        let healthy = Arc::new(Recording::default());
        let mut chain = ObserverChain::new();
        chain.add(failing.clone());
        chain.add(healthy.clone());
        assert_eq!(chain.len(), 2);

        let node = NodeStartInfo::new("plan", BarrierPositionType::Step, "step", "run");
        let err = chain.node_started(&node).await.unwrap_err();

        assert!(matches!(err, FlowControlError::NotFound { .. }));
        assert_eq!(*healthy.calls.lock(), vec!["run".to_string()]);
    }

    #[test]
    fn test_expansion_adds_one_position_per_copy_and_template() {
        let inside = BarrierPosition::step("stage", Some("loop".into()), "wait")
            .with_strategy("loop_strategy", BarrierPositionType::StepGroup)
            .with_runtime_id(BarrierPositionType::Stage, "stageRun");
        let outside = BarrierPosition::step("stage", None, "other");
        let expansion = StrategyExpansion::new(
            "plan",
            BarrierPositionType::StepGroup,
            "loop",
            "loop_strategy",
            2,
        )
        .with_copy(StrategyCopy::new("groupRun1").with_ancestors(Some("stageRun".into()), None))
        .with_copy(StrategyCopy::new("groupRun2").with_ancestors(Some("stageRun".into()), None));

        let copies = expansion.copy_positions(&[inside.clone(), inside, outside]);

        let groups: Vec<_> = copies
            .iter()
            .map(|p| p.step_group_runtime_id.as_deref())
            .collect();
        assert_eq!(groups, vec![Some("groupRun1"), Some("groupRun2")]);
        assert!(copies
            .iter()
            .all(|p| p.stage_runtime_id.as_deref() == Some("stageRun") && p.step_runtime_id.is_none()));
    }

    #[tokio::test]
    async fn test_default_hooks_do_nothing() {
        let mut chain = ObserverChain::new();
        chain.add(Arc::new(Recording::default()));

        chain.plan_started("plan", "pipeline: {}").await.unwrap();
        chain
            .strategy_expanded(&StrategyExpansion::new(
                "plan",
                BarrierPositionType::Stage,
                "stage",
                "stage_strategy",
                1,
            ))
            .await
            .unwrap();
        chain
            .plan_status_updated("plan", ExecutionStatus::Failed)
            .await
            .unwrap();
    }
}
