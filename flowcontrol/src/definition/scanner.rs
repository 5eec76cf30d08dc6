//! Walks a pipeline definition for barrier declarations and references.

use tracing::debug;

use super::yaml::{
    strategy_setup_id, PipelineDocument, StageElement, StageNode, StepElement, StepNode,
};
use crate::core::BarrierPositionType;
use crate::errors::BarrierDefinitionError;
use crate::model::BarrierPosition;

/// A barrier declared under `pipeline.flowControl.barriers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarrierDeclaration {
    /// Barrier identifier.
    pub identifier: String,
    /// Display name; defaults to the identifier.
    pub name: String,
}

/// A barrier step found somewhere inside a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarrierReference {
    /// The referenced barrier identifier.
    pub barrier_ref: String,
    /// Identifier of the enclosing stage.
    pub stage_identifier: String,
    /// Structural coordinate of the barrier step.
    pub position: BarrierPosition,
    /// Every strategy enclosing the step, outermost first.
    pub strategy_setup_ids: Vec<String>,
}

/// Raw scanner output, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScannedDefinition {
    /// Declarations in declaration order.
    pub declarations: Vec<BarrierDeclaration>,
    /// References in document order.
    pub references: Vec<BarrierReference>,
}

/// Where the walk currently is.
#[derive(Debug, Clone, Default)]
struct Scope {
    stage_identifier: String,
    stage_setup_id: String,
    step_group_setup_id: Option<String>,
    strategies: Vec<(String, BarrierPositionType)>,
}

impl Scope {
    fn enter_strategy(&self, strategy: Option<String>, kind: BarrierPositionType) -> Self {
        let mut next = self.clone();
        if let Some(id) = strategy {
            next.strategies.push((id, kind));
        }
        next
    }
}

/// Finds barrier declarations and references in a pipeline YAML.
#[derive(Debug, Default, Clone, Copy)]
pub struct BarrierDefinitionScanner;

impl BarrierDefinitionScanner {
    /// Creates a scanner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Scans a pipeline YAML.
    ///
    /// Malformed YAML, or a barrier step without `barrierRef`, is an
    /// extraction error. Referential integrity is checked by the resolver.
    pub fn scan(&self, yaml: &str) -> Result<ScannedDefinition, BarrierDefinitionError> {
        let document: PipelineDocument = serde_yaml::from_str(yaml)
            .map_err(|e| BarrierDefinitionError::extraction(e.to_string()))?;

        let declarations = document
            .pipeline
            .flow_control
            .unwrap_or_default()
            .barriers
            .into_iter()
            .map(|barrier| BarrierDeclaration {
                name: barrier.name.unwrap_or_else(|| barrier.identifier.clone()),
                identifier: barrier.identifier,
            })
            .collect();

        let mut references = Vec::new();
        for element in &document.pipeline.stages {
            walk_stage_element(element, &mut references)?;
        }

        debug!(
            references = references.len(),
            "Scanned pipeline definition for barriers"
        );

        Ok(ScannedDefinition {
            declarations,
            references,
        })
    }
}

fn walk_stage_element(
    element: &StageElement,
    out: &mut Vec<BarrierReference>,
) -> Result<(), BarrierDefinitionError> {
    if let Some(stage) = &element.stage {
        walk_stage(stage, out)?;
    }
    for nested in element.parallel.iter().flatten() {
        walk_stage_element(nested, out)?;
    }
    Ok(())
}

fn walk_stage(stage: &StageNode, out: &mut Vec<BarrierReference>) -> Result<(), BarrierDefinitionError> {
    let scope = Scope {
        stage_identifier: stage.identifier.clone(),
        stage_setup_id: stage.setup_id().to_string(),
        ..Scope::default()
    }
    .enter_strategy(
        strategy_setup_id(stage.strategy.as_ref(), stage.setup_id()),
        BarrierPositionType::Stage,
    );

    if let Some(execution) = stage.spec.as_ref().and_then(|spec| spec.execution.as_ref()) {
        for element in execution.steps.iter().chain(&execution.rollback_steps) {
            walk_step_element(element, &scope, out)?;
        }
    }
    Ok(())
}

fn walk_step_element(
    element: &StepElement,
    scope: &Scope,
    out: &mut Vec<BarrierReference>,
) -> Result<(), BarrierDefinitionError> {
    if let Some(step) = &element.step {
        visit_step(step, scope, out)?;
    }
    if let Some(group) = &element.step_group {
        let mut inner = scope.enter_strategy(
            strategy_setup_id(group.strategy.as_ref(), group.setup_id()),
            BarrierPositionType::StepGroup,
        );
        inner.step_group_setup_id = Some(group.setup_id().to_string());
        for nested in group.steps.iter().chain(&group.rollback_steps) {
            walk_step_element(nested, &inner, out)?;
        }
    }
    for nested in element.parallel.iter().flatten() {
        walk_step_element(nested, scope, out)?;
    }
    Ok(())
}

fn visit_step(
    step: &StepNode,
    scope: &Scope,
    out: &mut Vec<BarrierReference>,
) -> Result<(), BarrierDefinitionError> {
    if !step.is_barrier() {
        return Ok(());
    }
    let barrier_ref = step.barrier_ref().ok_or_else(|| {
        BarrierDefinitionError::extraction(format!(
            "barrier step '{}' has no barrierRef",
            step.identifier
        ))
    })?;

    let scope = scope.enter_strategy(
        strategy_setup_id(step.strategy.as_ref(), step.setup_id()),
        BarrierPositionType::Step,
    );
    let mut position = BarrierPosition::step(
        scope.stage_setup_id.clone(),
        scope.step_group_setup_id.clone(),
        step.setup_id(),
    );
    if let Some((strategy, kind)) = scope.strategies.last() {
        position = position.with_strategy(strategy.clone(), *kind);
    }

    out.push(BarrierReference {
        barrier_ref: barrier_ref.to_string(),
        stage_identifier: scope.stage_identifier.clone(),
        position,
        strategy_setup_ids: scope.strategies.iter().map(|(id, _)| id.clone()).collect(),
    });
    Ok(())
}
