//! Collaborators the barrier service consumes.

use async_trait::async_trait;

use crate::core::ExecutionStatus;
use crate::errors::Result;
use crate::model::BarrierResponseData;

/// Reads node and plan statuses from the execution engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeStatusProvider: Send + Sync {
    /// Status of one concrete node. `None` if the engine has no record yet.
    async fn node_status(&self, runtime_id: &str) -> Result<Option<ExecutionStatus>>;

    /// Aggregate status of a plan execution.
    async fn plan_status(&self, plan_execution_id: &str) -> Result<ExecutionStatus>;
}

/// Resumes branches parked on a correlation id.
///
/// Implementations must be idempotent per correlation id: a repeated
/// signal for an already released id is accepted and ignored.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WaitNotifyEngine: Send + Sync {
    /// Releases every waiter on `correlation_id` with `response`.
    async fn done_with(&self, correlation_id: &str, response: BarrierResponseData) -> Result<()>;

    /// Drops whatever the engine keeps for correlation ids whose barriers
    /// were deleted.
    async fn forget(&self, _correlation_ids: &[String]) -> Result<()> {
        Ok(())
    }
}
