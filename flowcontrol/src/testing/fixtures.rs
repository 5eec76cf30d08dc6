//! Sample pipeline definitions and position builders.

use crate::core::BarrierPositionType;
use crate::model::{BarrierExecutionInstance, BarrierPosition, BarrierSetupInfo};

/// Three declared barriers referenced from five barrier steps.
///
/// `myBarrierId1` is referenced twice in `stage1` and once in `stage2`,
/// `myBarrierId2` once inside step group `sg1`, `myBarrierId3` once in
/// `stage3`.
pub const THREE_BARRIER_PIPELINE_YAML: &str = r"
pipeline:
  identifier: barrierPipeline
  name: barrierPipeline
  flowControl:
    barriers:
      - identifier: myBarrierId1
        name: myBarrier1Name
      - identifier: myBarrierId2
        name: myBarrier2Name
      - identifier: myBarrierId3
        name: myBarrier3Name
  stages:
    - stage:
        identifier: stage1
        name: stage1
        type: Custom
        spec:
          execution:
            steps:
              - step:
                  identifier: barrier1
                  name: barrier1
                  type: Barrier
                  timeout: 10m
                  spec:
                    barrierRef: myBarrierId1
              - stepGroup:
                  identifier: sg1
                  name: sg1
                  steps:
                    - step:
                        identifier: barrier2
                        type: Barrier
                        spec:
                          barrierRef: myBarrierId2
              - parallel:
                  - step:
                      identifier: barrier1Again
                      type: Barrier
                      spec:
                        barrierRef: myBarrierId1
                  - step:
                      identifier: shell
                      type: ShellScript
                      spec:
                        shell: Bash
                        source:
                          type: Inline
                          spec:
                            script: echo hello
    - parallel:
        - stage:
            identifier: stage2
            name: stage2
            type: Custom
            spec:
              execution:
                steps:
                  - step:
                      identifier: barrier1InStage2
                      type: Barrier
                      spec:
                        barrierRef: myBarrierId1
        - stage:
            identifier: stage3
            name: stage3
            type: Custom
            spec:
              execution:
                steps:
                  - step:
                      identifier: barrier3
                      type: Barrier
                      spec:
                        barrierRef: myBarrierId3
";

/// Declares six barriers but references a seventh.
pub const UNDECLARED_BARRIER_PIPELINE_YAML: &str = r"
pipeline:
  identifier: undeclared
  flowControl:
    barriers:
      - identifier: myBarrierId1
      - identifier: myBarrierId2
      - identifier: myBarrierId3
      - identifier: myBarrierId4
      - identifier: myBarrierId5
      - identifier: myBarrierId6
  stages:
    - stage:
        identifier: stage1
        spec:
          execution:
            steps:
              - step:
                  identifier: barrier1
                  type: Barrier
                  spec:
                    barrierRef: myBarrierId1
              - step:
                  identifier: barrier7
                  type: Barrier
                  spec:
                    barrierRef: myBarrierId7
";

/// Not valid YAML.
pub const BROKEN_PIPELINE_YAML: &str = r"
pipeline:
  flowControl:
    barriers: [
      - identifier: myBarrierId1
  stages:
";

/// A barrier step inside a looping step group inside a matrix stage.
pub const MATRIX_PIPELINE_YAML: &str = r"
pipeline:
  identifier: matrixPipeline
  flowControl:
    barriers:
      - identifier: myBarrierId1
        name: myBarrier1Name
  stages:
    - stage:
        identifier: matrixStage
        type: Custom
        strategy:
          matrix:
            os: [linux, windows]
          maxConcurrency: 2
        spec:
          execution:
            steps:
              - stepGroup:
                  identifier: sgMatrix
                  strategy:
                    repeat:
                      times: 2
                  steps:
                    - step:
                        identifier: barrierInMatrix
                        type: Barrier
                        spec:
                          barrierRef: myBarrierId1
";

/// One barrier shared by a matrix stage and a plain parallel stage.
pub const MATRIX_STAGE_PIPELINE_YAML: &str = r"
pipeline:
  identifier: matrixStagePipeline
  flowControl:
    barriers:
      - identifier: myBarrierId1
        name: myBarrier1Name
  stages:
    - parallel:
        - stage:
            identifier: matrixStage
            type: Custom
            strategy:
              matrix:
                os: [linux, windows]
              maxConcurrency: 2
            spec:
              execution:
                steps:
                  - step:
                      identifier: barrierInMatrix
                      type: Barrier
                      spec:
                        barrierRef: myBarrierId1
        - stage:
            identifier: plainStage
            type: Custom
            spec:
              execution:
                steps:
                  - step:
                      identifier: barrierPlain
                      type: Barrier
                      spec:
                        barrierRef: myBarrierId1
";

/// One barrier shared by a looping step group and a plain parallel stage.
pub const LOOPING_STEP_GROUP_PIPELINE_YAML: &str = r"
pipeline:
  identifier: loopPipeline
  flowControl:
    barriers:
      - identifier: myBarrierId1
        name: myBarrier1Name
  stages:
    - parallel:
        - stage:
            identifier: loopStage
            type: Custom
            spec:
              execution:
                steps:
                  - stepGroup:
                      identifier: loopGroup
                      strategy:
                        repeat:
                          times: 2
                        maxConcurrency: 2
                      steps:
                        - step:
                            identifier: barrierInLoop
                            type: Barrier
                            spec:
                              barrierRef: myBarrierId1
        - stage:
            identifier: plainStage
            type: Custom
            spec:
              execution:
                steps:
                  - step:
                      identifier: barrierPlain
                      type: Barrier
                      spec:
                        barrierRef: myBarrierId1
";

/// A single-position barrier bound to `step_runtime_id` in `stage1`.
#[must_use]
pub fn bound_step_barrier(
    plan_execution_id: &str,
    identifier: &str,
    step_runtime_id: &str,
) -> BarrierExecutionInstance {
    BarrierExecutionInstance::new(
        plan_execution_id,
        BarrierSetupInfo::new(identifier, identifier).with_stage("stage1"),
        vec![BarrierPosition::step("stage1", None, "step1")
            .with_runtime_id(BarrierPositionType::Stage, "stageRun1")
            .with_runtime_id(BarrierPositionType::Step, step_runtime_id)],
    )
}

/// Four unbound step positions, one per combination of two stage copies
/// and two step group copies of a looping step group.
#[must_use]
pub fn strategy_copy_positions() -> Vec<BarrierPosition> {
    let mut positions = Vec::with_capacity(4);
    for stage_run in ["stageRun1", "stageRun2"] {
        for group_run in ["groupRun1", "groupRun2"] {
            positions.push(
                BarrierPosition::step("stage", Some("group".into()), "step")
                    .with_strategy("group_strategy", BarrierPositionType::StepGroup)
                    .with_runtime_id(BarrierPositionType::Stage, stage_run)
                    .with_runtime_id(BarrierPositionType::StepGroup, group_run),
            );
        }
    }
    positions
}
