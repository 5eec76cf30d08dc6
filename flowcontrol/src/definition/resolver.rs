//! Turns scanner output into per-barrier setup info and positions.

use std::collections::HashMap;
use tracing::debug;

use super::scanner::{BarrierDefinitionScanner, ScannedDefinition};
use crate::errors::BarrierDefinitionError;
use crate::model::{BarrierExecutionInstance, BarrierPositionInfo, BarrierSetupInfo};

/// Setup info and positions for every declared barrier, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedBarriers {
    /// One entry per declared barrier.
    pub setup_infos: Vec<BarrierSetupInfo>,
    /// One entry per declared barrier, same order as `setup_infos`.
    pub position_infos: Vec<BarrierPositionInfo>,
}

impl ResolvedBarriers {
    /// Returns the number of declared barriers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.setup_infos.len()
    }

    /// Returns true if nothing was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.setup_infos.is_empty()
    }

    /// Positions of one barrier.
    #[must_use]
    pub fn positions_of(&self, identifier: &str) -> Option<&BarrierPositionInfo> {
        self.position_infos
            .iter()
            .find(|info| info.barrier_identifier == identifier)
    }

    /// Builds one `STANDING` instance per barrier for a plan execution.
    #[must_use]
    pub fn into_instances(self, plan_execution_id: &str) -> Vec<BarrierExecutionInstance> {
        self.setup_infos
            .into_iter()
            .zip(self.position_infos)
            .map(|(setup, positions)| {
                BarrierExecutionInstance::new(
                    plan_execution_id,
                    setup,
                    positions.barrier_position_list,
                )
            })
            .collect()
    }
}

/// Resolves barrier references against declarations.
#[derive(Debug, Default, Clone, Copy)]
pub struct BarrierPositionResolver {
    scanner: BarrierDefinitionScanner,
}

impl BarrierPositionResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans and resolves a pipeline YAML.
    pub fn resolve_yaml(&self, yaml: &str) -> Result<ResolvedBarriers, BarrierDefinitionError> {
        self.resolve(self.scanner.scan(yaml)?)
    }

    /// Resolves scanner output.
    ///
    /// Every reference must name a declared barrier; the first one that
    /// doesn't fails the whole resolution.
    pub fn resolve(
        &self,
        scanned: ScannedDefinition,
    ) -> Result<ResolvedBarriers, BarrierDefinitionError> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut resolved = ResolvedBarriers::default();

        for declaration in scanned.declarations {
            if index.contains_key(&declaration.identifier) {
                continue;
            }
            index.insert(declaration.identifier.clone(), resolved.setup_infos.len());
            resolved.position_infos.push(BarrierPositionInfo::new(
                declaration.identifier.clone(),
                Vec::new(),
            ));
            resolved
                .setup_infos
                .push(BarrierSetupInfo::new(declaration.identifier, declaration.name));
        }

        for reference in scanned.references {
            let slot = *index
                .get(&reference.barrier_ref)
                .ok_or_else(|| BarrierDefinitionError::undeclared(&reference.barrier_ref))?;

            let setup = &mut resolved.setup_infos[slot];
            setup.stages.insert(crate::model::StageDetail::new(reference.stage_identifier));
            setup.strategy_setup_ids.extend(reference.strategy_setup_ids);
            resolved.position_infos[slot]
                .barrier_position_list
                .push(reference.position);
        }

        debug!(barriers = resolved.len(), "Resolved barrier positions");
        Ok(resolved)
    }

    /// Setup info for every declared barrier.
    pub fn barrier_setup_info_list(
        &self,
        yaml: &str,
    ) -> Result<Vec<BarrierSetupInfo>, BarrierDefinitionError> {
        Ok(self.resolve_yaml(yaml)?.setup_infos)
    }

    /// Position info for every declared barrier.
    pub fn barrier_position_info_list(
        &self,
        yaml: &str,
    ) -> Result<Vec<BarrierPositionInfo>, BarrierDefinitionError> {
        Ok(self.resolve_yaml(yaml)?.position_infos)
    }
}
