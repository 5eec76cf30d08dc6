//! Payload delivered to branches parked on a barrier.

use serde::{Deserialize, Serialize};

use crate::core::BarrierState;

/// What a waiting branch receives when a barrier is released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarrierResponseData {
    /// True if the branch should apply its failure strategy.
    pub failed: bool,
    /// Why the barrier released with a failure.
    pub error_message: Option<String>,
    /// The terminal state of the barrier.
    pub barrier_state: BarrierState,
}

impl BarrierResponseData {
    /// Success payload for a barrier that went down.
    #[must_use]
    pub fn down() -> Self {
        Self {
            failed: false,
            error_message: None,
            barrier_state: BarrierState::Down,
        }
    }

    /// Failure payload.
    #[must_use]
    pub fn failure(state: BarrierState, message: impl Into<String>) -> Self {
        Self {
            failed: true,
            error_message: Some(message.into()),
            barrier_state: state,
        }
    }

    /// Converts to a JSON value for the wait/notify collaborator.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "failed": self.failed,
            "errorMessage": self.error_message,
            "barrierState": self.barrier_state,
        })
    }
}
