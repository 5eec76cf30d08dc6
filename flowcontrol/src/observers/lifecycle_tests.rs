//! Plan lifecycles driven through the full observer chain.

use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{
    BarrierDropper, BarrierInitializer, BarrierPositionHelper, NodeStartInfo, NodeStatusUpdate,
    ObserverChain, StrategyCopy, StrategyExpansion,
};
use crate::core::{BarrierPositionType, BarrierState, ExecutionStatus};
use crate::model::BarrierExecutionInstance;
use crate::service::BarrierService;
use crate::store::InMemoryBarrierStore;
use crate::testing::{
    assert_barrier_state, assert_bound_count, RecordingWaitNotify, StaticStatusProvider,
    LOOPING_STEP_GROUP_PIPELINE_YAML, MATRIX_STAGE_PIPELINE_YAML,
};

const PLAN: &str = "plan1";

struct Lifecycle {
    chain: ObserverChain,
    service: Arc<BarrierService>,
    statuses: Arc<StaticStatusProvider>,
    notifier: Arc<RecordingWaitNotify>,
}

impl Lifecycle {
    async fn start(yaml: &str) -> Self {
        let statuses = Arc::new(StaticStatusProvider::new());
        let notifier = Arc::new(RecordingWaitNotify::new());
        let service = Arc::new(BarrierService::new(
            Arc::new(InMemoryBarrierStore::new()),
            statuses.clone(),
            notifier.clone(),
        ));
        let mut chain = ObserverChain::new();
        chain.add(Arc::new(BarrierInitializer::new(service.clone())));
        chain.add(Arc::new(BarrierPositionHelper::new(service.clone())));
        chain.add(Arc::new(BarrierDropper::new(service.clone())));
        chain.plan_started(PLAN, yaml).await.unwrap();
        Self {
            chain,
            service,
            statuses,
            notifier,
        }
    }

    async fn barrier(&self) -> BarrierExecutionInstance {
        self.service
            .find_by_identifier_and_plan_execution_id("myBarrierId1", PLAN)
            .await
            .unwrap()
            .unwrap()
    }

    async fn start_node(&self, node: NodeStartInfo) {
        self.chain.node_started(&node).await.unwrap();
    }

    async fn arrive(&self, setup_id: &str, runtime_id: &str) {
        self.statuses.set_node(runtime_id, ExecutionStatus::AsyncWaiting);
        self.chain
            .node_status_updated(&NodeStatusUpdate {
                plan_execution_id: PLAN.into(),
                kind: BarrierPositionType::Step,
                setup_id: setup_id.into(),
                runtime_id: runtime_id.into(),
                status: ExecutionStatus::AsyncWaiting,
            })
            .await
            .unwrap();
    }

    async fn run_plain_stage(&self) {
        self.start_node(NodeStartInfo::new(
            PLAN,
            BarrierPositionType::Stage,
            "plainStage",
            "plainStageRun",
        ))
        .await;
        self.start_node(
            NodeStartInfo::new(PLAN, BarrierPositionType::Step, "barrierPlain", "plainStep")
                .with_ancestors(Some("plainStageRun".into()), None),
        )
        .await;
        self.arrive("barrierPlain", "plainStep").await;
    }
}

fn step_runtime_ids(instance: &BarrierExecutionInstance) -> BTreeSet<String> {
    instance
        .positions()
        .iter()
        .filter_map(|p| p.step_runtime_id.clone())
        .collect()
}

#[tokio::test]
async fn test_matrix_stage_copies_each_hold_the_barrier() {
    let life = Lifecycle::start(MATRIX_STAGE_PIPELINE_YAML).await;
    assert_eq!(life.barrier().await.positions().len(), 2);

    let expansion = StrategyExpansion::new(
        PLAN,
        BarrierPositionType::Stage,
        "matrixStage",
        "matrixStage_strategy",
        2,
    )
    .with_copy(StrategyCopy::new("matrixRun1"))
    .with_copy(StrategyCopy::new("matrixRun2"));
    life.chain.strategy_expanded(&expansion).await.unwrap();

    let expanded = life.barrier().await;
    assert_eq!(expanded.positions().len(), 3);
    assert_bound_count(&expanded, BarrierPositionType::Stage, 2);
    assert_eq!(
        expanded.setup_info.strategy_concurrency_map.get("matrixStage_strategy"),
        Some(&2)
    );

    for (stage_run, step_run) in [("matrixRun1", "matrixStep1"), ("matrixRun2", "matrixStep2")] {
        life.start_node(
            NodeStartInfo::new(PLAN, BarrierPositionType::Stage, "matrixStage", stage_run)
                .inside_strategy(),
        )
        .await;
        life.start_node(
            NodeStartInfo::new(PLAN, BarrierPositionType::Step, "barrierInMatrix", step_run)
                .with_ancestors(Some(stage_run.into()), None)
                .inside_strategy(),
        )
        .await;
    }
    life.run_plain_stage().await;
    life.arrive("barrierInMatrix", "matrixStep1").await;

    let waiting = life.barrier().await;
    assert_barrier_state(&waiting, BarrierState::Standing);
    assert!(life.notifier.released().is_empty());

    life.arrive("barrierInMatrix", "matrixStep2").await;

    let dropped = life.barrier().await;
    assert_barrier_state(&dropped, BarrierState::Down);
    let expected: BTreeSet<String> = ["matrixStep1", "matrixStep2", "plainStep"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(step_runtime_ids(&dropped), expected);
    assert_eq!(life.notifier.released_for(&dropped.uuid).len(), 1);
}

#[tokio::test]
async fn test_looping_step_group_iterations_each_hold_the_barrier() {
    let life = Lifecycle::start(LOOPING_STEP_GROUP_PIPELINE_YAML).await;
    life.start_node(NodeStartInfo::new(
        PLAN,
        BarrierPositionType::Stage,
        "loopStage",
        "loopStageRun",
    ))
    .await;

    let expansion = StrategyExpansion::new(
        PLAN,
        BarrierPositionType::StepGroup,
        "loopGroup",
        "loopGroup_strategy",
        2,
    )
    .with_copy(StrategyCopy::new("iteration1").with_ancestors(Some("loopStageRun".into()), None))
    .with_copy(StrategyCopy::new("iteration2").with_ancestors(Some("loopStageRun".into()), None));
    life.chain.strategy_expanded(&expansion).await.unwrap();
    // Redelivery claims the same entries.
    life.chain.strategy_expanded(&expansion).await.unwrap();

    let expanded = life.barrier().await;
    assert_eq!(expanded.positions().len(), 3);
    assert_bound_count(&expanded, BarrierPositionType::StepGroup, 2);

    life.run_plain_stage().await;
    for (group_run, step_run) in [("iteration1", "loopStep1"), ("iteration2", "loopStep2")] {
        life.start_node(
            NodeStartInfo::new(PLAN, BarrierPositionType::Step, "barrierInLoop", step_run)
                .with_ancestors(Some("loopStageRun".into()), Some(group_run.into()))
                .inside_strategy(),
        )
        .await;
    }
    life.arrive("barrierInLoop", "loopStep2").await;
    assert_barrier_state(&life.barrier().await, BarrierState::Standing);

    life.arrive("barrierInLoop", "loopStep1").await;

    let dropped = life.barrier().await;
    assert_barrier_state(&dropped, BarrierState::Down);
    assert_bound_count(&dropped, BarrierPositionType::Step, 3);
    let iteration_of = |step: &str| {
        dropped
            .positions()
            .iter()
            .find(|p| p.step_runtime_id.as_deref() == Some(step))
            .and_then(|p| p.step_group_runtime_id.clone())
    };
    assert_eq!(iteration_of("loopStep1").as_deref(), Some("iteration1"));
    assert_eq!(iteration_of("loopStep2").as_deref(), Some("iteration2"));
    assert_eq!(life.notifier.released_for(&dropped.uuid).len(), 1);
}
