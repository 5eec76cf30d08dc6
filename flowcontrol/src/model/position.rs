//! Barrier positions: structural coordinates bound to runtime branches.

use serde::{Deserialize, Serialize};

use crate::core::BarrierPositionType;

/// A structural coordinate at which a concrete branch checks in.
///
/// Setup ids are known when the plan is compiled. Runtime ids are bound one
/// by one as concrete branches start; a bound runtime id is never reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarrierPosition {
    /// Setup id of the stage.
    pub stage_setup_id: Option<String>,
    /// Runtime id of the concrete stage execution.
    pub stage_runtime_id: Option<String>,
    /// Setup id of the innermost enclosing step group.
    pub step_group_setup_id: Option<String>,
    /// Runtime id of the concrete step group execution.
    pub step_group_runtime_id: Option<String>,
    /// Setup id of the barrier step.
    pub step_setup_id: Option<String>,
    /// Runtime id of the concrete step execution.
    pub step_runtime_id: Option<String>,
    /// Setup id of the innermost enclosing strategy, if any.
    pub strategy_setup_id: Option<String>,
    /// Which structural level the enclosing strategy expands.
    pub strategy_node_type: Option<BarrierPositionType>,
}

impl BarrierPosition {
    /// Creates a position for a barrier step.
    #[must_use]
    pub fn step(
        stage_setup_id: impl Into<String>,
        step_group_setup_id: Option<String>,
        step_setup_id: impl Into<String>,
    ) -> Self {
        Self {
            stage_setup_id: Some(stage_setup_id.into()),
            step_group_setup_id,
            step_setup_id: Some(step_setup_id.into()),
            ..Self::default()
        }
    }

    /// Sets the enclosing strategy.
    #[must_use]
    pub fn with_strategy(
        mut self,
        strategy_setup_id: impl Into<String>,
        node_type: BarrierPositionType,
    ) -> Self {
        self.strategy_setup_id = Some(strategy_setup_id.into());
        self.strategy_node_type = Some(node_type);
        self
    }

    /// Sets a runtime id, consuming self. Test and fixture helper.
    #[must_use]
    pub fn with_runtime_id(mut self, kind: BarrierPositionType, runtime_id: impl Into<String>) -> Self {
        *self.runtime_slot(kind) = Some(runtime_id.into());
        self
    }

    /// Returns the setup id at the given level.
    #[must_use]
    pub fn setup_id(&self, kind: BarrierPositionType) -> Option<&str> {
        match kind {
            BarrierPositionType::Stage => self.stage_setup_id.as_deref(),
            BarrierPositionType::StepGroup => self.step_group_setup_id.as_deref(),
            BarrierPositionType::Step => self.step_setup_id.as_deref(),
        }
    }

    /// Returns the runtime id at the given level.
    #[must_use]
    pub fn runtime_id(&self, kind: BarrierPositionType) -> Option<&str> {
        match kind {
            BarrierPositionType::Stage => self.stage_runtime_id.as_deref(),
            BarrierPositionType::StepGroup => self.step_group_runtime_id.as_deref(),
            BarrierPositionType::Step => self.step_runtime_id.as_deref(),
        }
    }

    fn runtime_slot(&mut self, kind: BarrierPositionType) -> &mut Option<String> {
        match kind {
            BarrierPositionType::Stage => &mut self.stage_runtime_id,
            BarrierPositionType::StepGroup => &mut self.step_group_runtime_id,
            BarrierPositionType::Step => &mut self.step_runtime_id,
        }
    }

    /// Binds a runtime id at the given level.
    ///
    /// Returns false without writing if a different id is already bound.
    pub fn bind(&mut self, kind: BarrierPositionType, runtime_id: &str) -> bool {
        let slot = self.runtime_slot(kind);
        match slot {
            Some(existing) => existing == runtime_id,
            None => {
                *slot = Some(runtime_id.to_string());
                true
            }
        }
    }

    /// The deepest structural level this position has a setup id for.
    #[must_use]
    pub fn leaf_type(&self) -> BarrierPositionType {
        if self.step_setup_id.is_some() {
            BarrierPositionType::Step
        } else if self.step_group_setup_id.is_some() {
            BarrierPositionType::StepGroup
        } else {
            BarrierPositionType::Stage
        }
    }

    /// Runtime id of the branch whose status decides this position.
    #[must_use]
    pub fn participant_runtime_id(&self) -> Option<&str> {
        self.runtime_id(self.leaf_type())
    }

    /// Returns true once the leaf runtime id is bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.participant_runtime_id().is_some()
    }

    /// A copy with the runtime ids at `kind` and every deeper level cleared.
    #[must_use]
    pub fn unbound_from(&self, kind: BarrierPositionType) -> Self {
        let mut position = self.clone();
        position.step_runtime_id = None;
        if kind != BarrierPositionType::Step {
            position.step_group_runtime_id = None;
        }
        if kind == BarrierPositionType::Stage {
            position.stage_runtime_id = None;
        }
        position
    }

    /// Returns true if both positions point at the same structural coordinate.
    #[must_use]
    pub fn same_setup(&self, other: &Self) -> bool {
        self.stage_setup_id == other.stage_setup_id
            && self.step_group_setup_id == other.step_group_setup_id
            && self.step_setup_id == other.step_setup_id
    }

    /// Returns true if every runtime id `other` carries is either unbound
    /// here or already equal.
    #[must_use]
    pub fn accepts_runtime_ids_of(&self, other: &Self) -> bool {
        [
            BarrierPositionType::Stage,
            BarrierPositionType::StepGroup,
            BarrierPositionType::Step,
        ]
        .into_iter()
        .all(|kind| match (self.runtime_id(kind), other.runtime_id(kind)) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => true,
        })
    }

    /// Copies the runtime ids and strategy coordinates `other` carries onto
    /// this position. Absent values never clear what is already bound.
    pub fn absorb_runtime_ids(&mut self, other: &Self) {
        for kind in [
            BarrierPositionType::Stage,
            BarrierPositionType::StepGroup,
            BarrierPositionType::Step,
        ] {
            if let Some(id) = other.runtime_id(kind) {
                let id = id.to_string();
                self.runtime_slot(kind).get_or_insert(id);
            }
        }
        if other.strategy_setup_id.is_some() {
            self.strategy_setup_id.clone_from(&other.strategy_setup_id);
        }
        if other.strategy_node_type.is_some() {
            self.strategy_node_type = other.strategy_node_type;
        }
    }
}

/// Ordered, append-only list of positions for one barrier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarrierPositionInfo {
    /// The barrier these positions belong to.
    pub barrier_identifier: String,
    /// Positions in discovery order.
    #[serde(default)]
    pub barrier_position_list: Vec<BarrierPosition>,
}

impl BarrierPositionInfo {
    /// Creates position info for a barrier.
    #[must_use]
    pub fn new(barrier_identifier: impl Into<String>, positions: Vec<BarrierPosition>) -> Self {
        Self {
            barrier_identifier: barrier_identifier.into(),
            barrier_position_list: positions,
        }
    }

    /// Returns the number of positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.barrier_position_list.len()
    }

    /// Returns true if there are no positions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.barrier_position_list.is_empty()
    }

    /// Returns true if every position has its participant bound.
    #[must_use]
    pub fn all_bound(&self) -> bool {
        self.barrier_position_list.iter().all(BarrierPosition::is_bound)
    }
}
