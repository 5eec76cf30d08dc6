//! The persisted barrier execution instance.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::position::{BarrierPosition, BarrierPositionInfo};
use crate::core::BarrierState;
use crate::utils::{generate_uuid_v7, now_utc, Timestamp};

/// A stage known to reference a barrier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDetail {
    /// Stage identifier.
    pub identifier: String,
}

impl StageDetail {
    /// Creates a stage detail.
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }
}

/// Setup-time description of a barrier.
///
/// `stages` and `strategy_setup_ids` are sets: order never matters and
/// re-discovery collapses duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarrierSetupInfo {
    /// Display name.
    pub name: String,
    /// Barrier identifier.
    pub identifier: String,
    /// Stages referencing this barrier.
    #[serde(default)]
    pub stages: BTreeSet<StageDetail>,
    /// Setup ids of strategies enclosing any reference.
    #[serde(default)]
    pub strategy_setup_ids: BTreeSet<String>,
    /// Declared max parallel copies per strategy setup id.
    #[serde(default)]
    pub strategy_concurrency_map: BTreeMap<String, u32>,
}

impl BarrierSetupInfo {
    /// Creates setup info with no references yet.
    #[must_use]
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            ..Self::default()
        }
    }

    /// Adds a referencing stage.
    #[must_use]
    pub fn with_stage(mut self, identifier: impl Into<String>) -> Self {
        self.stages.insert(StageDetail::new(identifier));
        self
    }

    /// Adds an enclosing strategy.
    #[must_use]
    pub fn with_strategy_setup_id(mut self, id: impl Into<String>) -> Self {
        self.strategy_setup_ids.insert(id.into());
        self
    }

    /// Unions another discovery of the same barrier into this one.
    pub fn merge(&mut self, other: &Self) {
        self.stages.extend(other.stages.iter().cloned());
        self.strategy_setup_ids
            .extend(other.strategy_setup_ids.iter().cloned());
        for (strategy, concurrency) in &other.strategy_concurrency_map {
            self.strategy_concurrency_map
                .insert(strategy.clone(), *concurrency);
        }
    }
}

/// One barrier per `(plan_execution_id, identifier)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarrierExecutionInstance {
    /// Opaque unique id; also the wait/notify correlation id.
    pub uuid: String,
    /// Display name.
    pub name: String,
    /// Logical barrier name, unique within a plan execution.
    pub identifier: String,
    /// Owning plan execution.
    pub plan_execution_id: String,
    /// Lifecycle state.
    #[serde(default)]
    pub barrier_state: BarrierState,
    /// Setup-time description.
    pub setup_info: BarrierSetupInfo,
    /// Positions and their runtime bindings.
    pub position_info: BarrierPositionInfo,
    /// Set once waiters were released for the terminal state.
    #[serde(default)]
    pub notified: bool,
    /// Failure message chosen when the barrier left `STANDING`; replayed
    /// if the release has to be sent again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_message: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub last_updated_at: Timestamp,
}

impl BarrierExecutionInstance {
    /// Creates a `STANDING` instance from setup and position info.
    #[must_use]
    pub fn new(
        plan_execution_id: impl Into<String>,
        setup_info: BarrierSetupInfo,
        positions: Vec<BarrierPosition>,
    ) -> Self {
        let now = now_utc();
        Self {
            uuid: generate_uuid_v7().to_string(),
            name: setup_info.name.clone(),
            identifier: setup_info.identifier.clone(),
            plan_execution_id: plan_execution_id.into(),
            barrier_state: BarrierState::Standing,
            position_info: BarrierPositionInfo::new(setup_info.identifier.clone(), positions),
            setup_info,
            notified: false,
            release_message: None,
            created_at: now,
            last_updated_at: now,
        }
    }

    /// Overrides the generated uuid.
    #[must_use]
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    /// Overrides the state.
    #[must_use]
    pub fn with_state(mut self, state: BarrierState) -> Self {
        self.barrier_state = state;
        self
    }

    /// Positions in discovery order.
    #[must_use]
    pub fn positions(&self) -> &[BarrierPosition] {
        &self.position_info.barrier_position_list
    }

    /// Returns true if a stage with this identifier references the barrier.
    #[must_use]
    pub fn references_stage(&self, stage_identifier: &str) -> bool {
        self.setup_info
            .stages
            .iter()
            .any(|stage| stage.identifier == stage_identifier)
    }

    /// Bound positions per strategy setup id.
    #[must_use]
    pub fn bound_copies_per_strategy(&self) -> BTreeMap<String, u32> {
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for position in self.positions().iter().filter(|p| p.is_bound()) {
            if let Some(strategy) = &position.strategy_setup_id {
                *counts.entry(strategy.clone()).or_default() += 1;
            }
        }
        counts
    }

    /// Strategies that declared more copies than have checked in.
    ///
    /// Returns `(strategy_setup_id, bound, declared)` triples.
    #[must_use]
    pub fn under_filled_strategies(&self) -> Vec<(String, u32, u32)> {
        let bound = self.bound_copies_per_strategy();
        self.setup_info
            .strategy_concurrency_map
            .iter()
            .filter_map(|(strategy, declared)| {
                let seen = bound.get(strategy).copied().unwrap_or(0);
                (seen < *declared).then(|| (strategy.clone(), seen, *declared))
            })
            .collect()
    }
}
