//! Scripted collaborators for barrier tests.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

use crate::core::ExecutionStatus;
use crate::errors::{FlowControlError, Result};
use crate::model::BarrierResponseData;
use crate::service::{NodeStatusProvider, WaitNotifyEngine};

/// Node and plan statuses set by the test.
///
/// Unknown nodes report no status; unknown plans report `Running`.
#[derive(Debug, Default)]
pub struct StaticStatusProvider {
    nodes: RwLock<HashMap<String, ExecutionStatus>>,
    plans: RwLock<HashMap<String, ExecutionStatus>>,
}

impl StaticStatusProvider {
    /// Creates a provider with no statuses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a node status, builder style.
    #[must_use]
    pub fn with_node(self, runtime_id: impl Into<String>, status: ExecutionStatus) -> Self {
        self.set_node(runtime_id, status);
        self
    }

    /// Sets a plan status, builder style.
    #[must_use]
    pub fn with_plan(self, plan_execution_id: impl Into<String>, status: ExecutionStatus) -> Self {
        self.set_plan(plan_execution_id, status);
        self
    }

    /// Sets a node status.
    pub fn set_node(&self, runtime_id: impl Into<String>, status: ExecutionStatus) {
        self.nodes.write().insert(runtime_id.into(), status);
    }

    /// Sets a plan status.
    pub fn set_plan(&self, plan_execution_id: impl Into<String>, status: ExecutionStatus) {
        self.plans.write().insert(plan_execution_id.into(), status);
    }
}

#[async_trait]
impl NodeStatusProvider for StaticStatusProvider {
    async fn node_status(&self, runtime_id: &str) -> Result<Option<ExecutionStatus>> {
        Ok(self.nodes.read().get(runtime_id).copied())
    }

    async fn plan_status(&self, plan_execution_id: &str) -> Result<ExecutionStatus> {
        Ok(self
            .plans
            .read()
            .get(plan_execution_id)
            .copied()
            .unwrap_or(ExecutionStatus::Running))
    }
}

/// Records every release and can be told to fail the next few.
#[derive(Debug, Default)]
pub struct RecordingWaitNotify {
    released: Mutex<Vec<(String, BarrierResponseData)>>,
    forgotten: Mutex<Vec<String>>,
    failures_left: Mutex<usize>,
}

impl RecordingWaitNotify {
    /// Creates a recorder that accepts every release.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `count` releases.
    #[must_use]
    pub fn failing(count: usize) -> Self {
        Self {
            failures_left: Mutex::new(count),
            ..Self::default()
        }
    }

    /// All accepted releases in order.
    #[must_use]
    pub fn released(&self) -> Vec<(String, BarrierResponseData)> {
        self.released.lock().clone()
    }

    /// Releases accepted for one correlation id.
    #[must_use]
    pub fn released_for(&self, correlation_id: &str) -> Vec<BarrierResponseData> {
        self.released
            .lock()
            .iter()
            .filter(|(id, _)| id == correlation_id)
            .map(|(_, response)| response.clone())
            .collect()
    }

    /// Correlation ids the service asked to forget, in order.
    #[must_use]
    pub fn forgotten(&self) -> Vec<String> {
        self.forgotten.lock().clone()
    }
}

#[async_trait]
impl WaitNotifyEngine for RecordingWaitNotify {
    async fn done_with(&self, correlation_id: &str, response: BarrierResponseData) -> Result<()> {
        {
            let mut failures_left = self.failures_left.lock();
            if *failures_left > 0 {
                *failures_left -= 1;
                return Err(FlowControlError::notify(correlation_id, "scripted failure"));
            }
        }
        self.released
            .lock()
            .push((correlation_id.to_string(), response));
        Ok(())
    }

    async fn forget(&self, correlation_ids: &[String]) -> Result<()> {
        self.forgotten.lock().extend_from_slice(correlation_ids);
        Ok(())
    }
}
