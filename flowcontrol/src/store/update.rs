//! Store-agnostic update descriptors.
//!
//! Each variant describes one atomic document update. `apply` is the
//! reference semantics every backend must reproduce; it reports whether the
//! document changed so the store can skip no-op writes.

use crate::core::{BarrierPositionType, BarrierState};
use crate::model::{BarrierExecutionInstance, BarrierPosition, BarrierSetupInfo};

/// Selects the positions inside a document that a runtime-id bind applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSelector {
    /// Level whose setup id must match and whose runtime id is written.
    pub kind: BarrierPositionType,
    /// Setup id at that level.
    pub setup_id: String,
    /// Ancestor filters; `None` disables them (single-copy plans).
    pub ancestors: Option<AncestorRuntimeIds>,
}

/// Runtime ids of the ancestors of a started node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AncestorRuntimeIds {
    /// Runtime id of the enclosing stage.
    pub stage_runtime_id: Option<String>,
    /// Runtime id of the enclosing step group.
    pub step_group_runtime_id: Option<String>,
}

impl PositionSelector {
    /// Selects every position with the setup id.
    #[must_use]
    pub fn all(kind: BarrierPositionType, setup_id: impl Into<String>) -> Self {
        Self {
            kind,
            setup_id: setup_id.into(),
            ancestors: None,
        }
    }

    /// Selects only positions inside the given concrete strategy copy.
    #[must_use]
    pub fn within(
        kind: BarrierPositionType,
        setup_id: impl Into<String>,
        stage_runtime_id: Option<String>,
        step_group_runtime_id: Option<String>,
    ) -> Self {
        Self {
            kind,
            setup_id: setup_id.into(),
            ancestors: Some(AncestorRuntimeIds {
                stage_runtime_id,
                step_group_runtime_id,
            }),
        }
    }

    /// Returns true if the position is selected.
    #[must_use]
    pub fn selects(&self, position: &BarrierPosition) -> bool {
        if position.setup_id(self.kind) != Some(self.setup_id.as_str()) {
            return false;
        }
        let Some(ancestors) = &self.ancestors else {
            return true;
        };
        // Strategy roots are bound when the strategy expands, not here.
        if position.strategy_node_type == Some(self.kind) {
            return false;
        }
        match self.kind {
            BarrierPositionType::Stage => true,
            BarrierPositionType::StepGroup => {
                position.stage_runtime_id == ancestors.stage_runtime_id
            }
            BarrierPositionType::Step => {
                position.stage_runtime_id == ancestors.stage_runtime_id
                    && (position.step_group_setup_id.is_none()
                        || position.step_group_runtime_id == ancestors.step_group_runtime_id)
            }
        }
    }
}

/// One atomic document update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarrierUpdate {
    /// Moves the state along an edge of the transition table.
    ///
    /// Combine with a state filter to get compare-and-set.
    SetState(BarrierState),
    /// Like `SetState`, also storing the failure message waiters receive.
    Transition {
        /// Target state.
        state: BarrierState,
        /// Failure message, `None` for `DOWN`.
        message: Option<String>,
    },
    /// Records that waiters were released.
    MarkNotified,
    /// Unions setup info and appends positions.
    Merge {
        /// Setup info to union in.
        setup_info: BarrierSetupInfo,
        /// Positions to append.
        positions: Vec<BarrierPosition>,
    },
    /// Writes a runtime id into the selected positions, where still unbound.
    BindRuntimeId {
        /// Which positions.
        selector: PositionSelector,
        /// The runtime id to bind.
        runtime_id: String,
    },
    /// Writes the runtime ids of supplied positions onto matching unbound
    /// entries, appends the rest, and records a strategy's concurrency.
    AbsorbPositions {
        /// Positions carrying runtime ids.
        positions: Vec<BarrierPosition>,
        /// Strategy setup id.
        strategy_id: String,
        /// Declared max parallel copies.
        concurrency: u32,
    },
}

impl BarrierUpdate {
    /// Applies the update in place. Returns true if anything changed.
    pub fn apply(&self, instance: &mut BarrierExecutionInstance) -> bool {
        match self {
            Self::SetState(next) => {
                if instance.barrier_state.can_transition_to(*next) {
                    instance.barrier_state = *next;
                    true
                } else {
                    false
                }
            }
            Self::Transition { state, message } => {
                if instance.barrier_state.can_transition_to(*state) {
                    instance.barrier_state = *state;
                    instance.release_message.clone_from(message);
                    true
                } else {
                    false
                }
            }
            Self::MarkNotified => !std::mem::replace(&mut instance.notified, true),
            Self::Merge {
                setup_info,
                positions,
            } => {
                let before = instance.setup_info.clone();
                instance.setup_info.merge(setup_info);
                instance
                    .position_info
                    .barrier_position_list
                    .extend(positions.iter().cloned());
                before != instance.setup_info || !positions.is_empty()
            }
            Self::BindRuntimeId {
                selector,
                runtime_id,
            } => {
                let mut changed = false;
                for position in &mut instance.position_info.barrier_position_list {
                    if selector.selects(position) && position.runtime_id(selector.kind).is_none() {
                        changed |= position.bind(selector.kind, runtime_id);
                    }
                }
                changed
            }
            Self::AbsorbPositions {
                positions,
                strategy_id,
                concurrency,
            } => {
                let mut changed = instance
                    .setup_info
                    .strategy_concurrency_map
                    .insert(strategy_id.clone(), *concurrency)
                    != Some(*concurrency);
                let list = &mut instance.position_info.barrier_position_list;
                let mut claimed = vec![false; list.len()];
                for supplied in positions {
                    let slot = list.iter().enumerate().position(|(i, existing)| {
                        !claimed.get(i).copied().unwrap_or(true)
                            && existing.same_setup(supplied)
                            && existing.accepts_runtime_ids_of(supplied)
                    });
                    match slot {
                        Some(i) => {
                            claimed[i] = true;
                            let before = list[i].clone();
                            list[i].absorb_runtime_ids(supplied);
                            changed |= before != list[i];
                        }
                        None => {
                            list.push(supplied.clone());
                            changed = true;
                        }
                    }
                }
                changed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn instance(positions: Vec<BarrierPosition>) -> BarrierExecutionInstance {
        BarrierExecutionInstance::new("plan", BarrierSetupInfo::new("b", "b"), positions)
    }

    fn matrix_positions() -> Vec<BarrierPosition> {
        let mut positions = Vec::new();
        for stage in ["stageRun1", "stageRun2"] {
            for group in ["groupRun1", "groupRun2"] {
                positions.push(
                    BarrierPosition::step("stage", Some("group".into()), "step")
                        .with_strategy("groupStrategy", BarrierPositionType::StepGroup)
                        .with_runtime_id(BarrierPositionType::Stage, stage)
                        .with_runtime_id(BarrierPositionType::StepGroup, group),
                );
            }
        }
        positions
    }

    #[test]
    fn test_set_state_follows_transition_table() {
        let mut doc = instance(vec![]);
        assert!(BarrierUpdate::SetState(BarrierState::Down).apply(&mut doc));
        assert!(!BarrierUpdate::SetState(BarrierState::Endure).apply(&mut doc));
        assert_eq!(doc.barrier_state, BarrierState::Down);
    }

    #[test]
    fn test_transition_keeps_release_message() {
        let mut doc = instance(vec![]);
        let update = BarrierUpdate::Transition {
            state: BarrierState::TimedOut,
            message: Some("participant expired".into()),
        };
        assert!(update.apply(&mut doc));
        assert!(!update.apply(&mut doc));
        assert_eq!(doc.barrier_state, BarrierState::TimedOut);
        assert_eq!(doc.release_message.as_deref(), Some("participant expired"));
    }

    #[test]
    fn test_mark_notified_once() {
        let mut doc = instance(vec![]);
        assert!(BarrierUpdate::MarkNotified.apply(&mut doc));
        assert!(!BarrierUpdate::MarkNotified.apply(&mut doc));
    }

    #[test]
    fn test_bind_without_ancestors_hits_every_copy() {
        let mut doc = instance(vec![
            BarrierPosition::step("stage", None, "step"),
            BarrierPosition::step("stage", None, "step"),
            BarrierPosition::step("stage", None, "other"),
        ]);
        let update = BarrierUpdate::BindRuntimeId {
            selector: PositionSelector::all(BarrierPositionType::Step, "step"),
            runtime_id: "run".into(),
        };
        assert!(update.apply(&mut doc));

        let bound: Vec<_> = doc.positions().iter().map(|p| p.step_runtime_id.clone()).collect();
        assert_eq!(bound, vec![Some("run".into()), Some("run".into()), None]);
    }

    #[test]
    fn test_bind_within_copy_hits_exactly_one() {
        let mut doc = instance(matrix_positions());
        let update = BarrierUpdate::BindRuntimeId {
            selector: PositionSelector::within(
                BarrierPositionType::Step,
                "step",
                Some("stageRun2".into()),
                Some("groupRun1".into()),
            ),
            runtime_id: "stepRun".into(),
        };
        assert!(update.apply(&mut doc));

        let bound: Vec<_> = doc
            .positions()
            .iter()
            .filter(|p| p.step_runtime_id.is_some())
            .collect();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].stage_runtime_id.as_deref(), Some("stageRun2"));
        assert_eq!(bound[0].step_group_runtime_id.as_deref(), Some("groupRun1"));
    }

    #[test]
    fn test_bind_skips_strategy_root() {
        let mut doc = instance(matrix_positions());
        let update = BarrierUpdate::BindRuntimeId {
            selector: PositionSelector::within(
                BarrierPositionType::StepGroup,
                "group",
                Some("stageRun1".into()),
                None,
            ),
            runtime_id: "x".into(),
        };
        assert!(!update.apply(&mut doc));
    }

    #[test]
    fn test_bind_never_rebinds() {
        let mut doc = instance(vec![BarrierPosition::step("stage", None, "step")
            .with_runtime_id(BarrierPositionType::Step, "first")]);
        let update = BarrierUpdate::BindRuntimeId {
            selector: PositionSelector::all(BarrierPositionType::Step, "step"),
            runtime_id: "second".into(),
        };
        assert!(!update.apply(&mut doc));
        assert_eq!(doc.positions()[0].step_runtime_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_merge_unions_and_appends() {
        let mut doc = instance(vec![BarrierPosition::step("stage1", None, "step1")]);
        doc.setup_info = doc.setup_info.clone().with_stage("stage1");
        let update = BarrierUpdate::Merge {
            setup_info: BarrierSetupInfo::new("b", "b")
                .with_stage("stage1")
                .with_stage("stage2"),
            positions: vec![BarrierPosition::step("stage2", None, "step2")],
        };
        assert!(update.apply(&mut doc));
        assert_eq!(doc.setup_info.stages.len(), 2);
        assert_eq!(doc.positions().len(), 2);
    }

    #[test]
    fn test_absorb_positions_claims_then_appends() {
        let mut doc = instance(vec![
            BarrierPosition::step("stage", None, "step")
                .with_strategy("s", BarrierPositionType::Stage),
            BarrierPosition::step("stage", None, "unrelated"),
        ]);
        let update = BarrierUpdate::AbsorbPositions {
            positions: vec![
                BarrierPosition::step("stage", None, "step")
                    .with_runtime_id(BarrierPositionType::Stage, "copyA"),
                BarrierPosition::step("stage", None, "step")
                    .with_strategy("s", BarrierPositionType::Stage)
                    .with_runtime_id(BarrierPositionType::Stage, "copyB"),
            ],
            strategy_id: "s".into(),
            concurrency: 2,
        };
        assert!(update.apply(&mut doc));

        assert_eq!(doc.setup_info.strategy_concurrency_map.get("s"), Some(&2));
        assert_eq!(doc.positions().len(), 3);
        assert_eq!(doc.positions()[0].stage_runtime_id.as_deref(), Some("copyA"));
        assert_eq!(
            doc.positions()[0].strategy_node_type,
            Some(BarrierPositionType::Stage)
        );
        assert_eq!(doc.positions()[1].stage_runtime_id, None);
        assert_eq!(doc.positions()[2].stage_runtime_id.as_deref(), Some("copyB"));
    }
}
