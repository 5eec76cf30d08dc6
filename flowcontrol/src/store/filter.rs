//! Store-agnostic query predicates.

use crate::core::{BarrierPositionType, BarrierState};
use crate::model::{BarrierExecutionInstance, BarrierPosition};

/// Matches a document if at least one of its positions matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionFilter {
    /// Structural level the ids refer to.
    pub kind: BarrierPositionType,
    /// Required setup id at that level.
    pub setup_id: Option<String>,
    /// Required runtime id at that level.
    pub runtime_id: Option<String>,
}

impl PositionFilter {
    /// Matches positions by setup id.
    #[must_use]
    pub fn setup(kind: BarrierPositionType, setup_id: impl Into<String>) -> Self {
        Self {
            kind,
            setup_id: Some(setup_id.into()),
            runtime_id: None,
        }
    }

    /// Matches positions by bound runtime id.
    #[must_use]
    pub fn runtime(kind: BarrierPositionType, runtime_id: impl Into<String>) -> Self {
        Self {
            kind,
            setup_id: None,
            runtime_id: Some(runtime_id.into()),
        }
    }

    /// Returns true if the position matches.
    #[must_use]
    pub fn matches(&self, position: &BarrierPosition) -> bool {
        let setup_ok = self
            .setup_id
            .as_deref()
            .map_or(true, |id| position.setup_id(self.kind) == Some(id));
        let runtime_ok = self
            .runtime_id
            .as_deref()
            .map_or(true, |id| position.runtime_id(self.kind) == Some(id));
        setup_ok && runtime_ok
    }
}

/// Conjunction of optional criteria. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarrierFilter {
    /// Document uuid.
    pub uuid: Option<String>,
    /// Owning plan execution must be one of these.
    pub plan_execution_ids: Option<Vec<String>>,
    /// Barrier identifier.
    pub identifier: Option<String>,
    /// State must be one of these.
    pub states: Option<Vec<BarrierState>>,
    /// A stage with this identifier must reference the barrier.
    pub stage_identifier: Option<String>,
    /// Some position must match.
    pub position: Option<PositionFilter>,
    /// Notified flag.
    pub notified: Option<bool>,
    /// The position list must equal this one exactly.
    pub position_list: Option<Vec<BarrierPosition>>,
}

impl BarrierFilter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by uuid.
    #[must_use]
    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Filters by a single plan execution.
    #[must_use]
    pub fn plan_execution_id(mut self, id: impl Into<String>) -> Self {
        self.plan_execution_ids = Some(vec![id.into()]);
        self
    }

    /// Filters by a set of plan executions.
    #[must_use]
    pub fn plan_execution_ids(mut self, ids: &[String]) -> Self {
        self.plan_execution_ids = Some(ids.to_vec());
        self
    }

    /// Filters by barrier identifier.
    #[must_use]
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Filters by a single state.
    #[must_use]
    pub fn state(self, state: BarrierState) -> Self {
        self.states(&[state])
    }

    /// Filters by a set of states.
    #[must_use]
    pub fn states(mut self, states: &[BarrierState]) -> Self {
        self.states = Some(states.to_vec());
        self
    }

    /// Filters by referencing stage.
    #[must_use]
    pub fn stage_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.stage_identifier = Some(identifier.into());
        self
    }

    /// Filters by a matching position.
    #[must_use]
    pub fn position(mut self, position: PositionFilter) -> Self {
        self.position = Some(position);
        self
    }

    /// Filters by the notified flag.
    #[must_use]
    pub fn notified(mut self, notified: bool) -> Self {
        self.notified = Some(notified);
        self
    }

    /// Requires the position list to be unchanged from `positions`.
    ///
    /// Combined with a state filter this makes a transition conditional on
    /// the positions it was evaluated against.
    #[must_use]
    pub fn position_list(mut self, positions: &[BarrierPosition]) -> Self {
        self.position_list = Some(positions.to_vec());
        self
    }

    /// Returns true if the document satisfies every criterion.
    #[must_use]
    pub fn matches(&self, instance: &BarrierExecutionInstance) -> bool {
        if self.uuid.as_ref().is_some_and(|uuid| *uuid != instance.uuid) {
            return false;
        }
        if self
            .plan_execution_ids
            .as_ref()
            .is_some_and(|ids| !ids.contains(&instance.plan_execution_id))
        {
            return false;
        }
        if self
            .identifier
            .as_ref()
            .is_some_and(|id| *id != instance.identifier)
        {
            return false;
        }
        if self
            .states
            .as_ref()
            .is_some_and(|states| !states.contains(&instance.barrier_state))
        {
            return false;
        }
        if self
            .stage_identifier
            .as_deref()
            .is_some_and(|stage| !instance.references_stage(stage))
        {
            return false;
        }
        if self
            .position
            .as_ref()
            .is_some_and(|filter| !instance.positions().iter().any(|p| filter.matches(p)))
        {
            return false;
        }
        if self.notified.is_some_and(|flag| flag != instance.notified) {
            return false;
        }
        if self
            .position_list
            .as_deref()
            .is_some_and(|positions| positions != instance.positions())
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BarrierSetupInfo;

    fn instance(plan: &str, identifier: &str, stage: &str) -> BarrierExecutionInstance {
        BarrierExecutionInstance::new(
            plan,
            BarrierSetupInfo::new(identifier, identifier).with_stage(stage),
            vec![BarrierPosition::step(stage, None, format!("{identifier}-step"))
                .with_runtime_id(BarrierPositionType::Step, "run-1")],
        )
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(BarrierFilter::new().matches(&instance("p", "b", "s")));
    }

    #[test]
    fn test_conjunction() {
        let doc = instance("plan1", "b1", "stage1");

        assert!(BarrierFilter::new()
            .plan_execution_id("plan1")
            .identifier("b1")
            .state(BarrierState::Standing)
            .matches(&doc));
        assert!(!BarrierFilter::new()
            .plan_execution_id("plan1")
            .state(BarrierState::Down)
            .matches(&doc));
        assert!(!BarrierFilter::new().stage_identifier("stage2").matches(&doc));
    }

    #[test]
    fn test_position_list_must_be_unchanged() {
        let mut doc = instance("plan1", "b1", "stage1");
        let evaluated = doc.positions().to_vec();
        let filter = BarrierFilter::new().position_list(&evaluated);
        assert!(filter.matches(&doc));

        doc.position_info
            .barrier_position_list
            .push(BarrierPosition::step("stage1", None, "lateCopy"));
        assert!(!filter.matches(&doc));
    }

    #[test]
    fn test_position_filters() {
        let doc = instance("plan1", "b1", "stage1");

        assert!(BarrierFilter::new()
            .position(PositionFilter::setup(BarrierPositionType::Step, "b1-step"))
            .matches(&doc));
        assert!(BarrierFilter::new()
            .position(PositionFilter::runtime(BarrierPositionType::Step, "run-1"))
            .matches(&doc));
        assert!(!BarrierFilter::new()
            .position(PositionFilter::runtime(BarrierPositionType::Stage, "run-1"))
            .matches(&doc));
    }
}
