//! Barrier state, position type and execution status enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The lifecycle state of a barrier execution instance.
///
/// `Standing` is the only non-terminal state. Every other state is reached
/// through exactly one edge out of `Standing` and has no exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarrierState {
    /// Waiting for participants to arrive.
    Standing,
    /// Every participant arrived; branches may proceed.
    Down,
    /// Released without success; waiters apply their own failure strategy.
    Endure,
    /// A participant's own deadline expired.
    TimedOut,
}

impl Default for BarrierState {
    fn default() -> Self {
        Self::Standing
    }
}

impl fmt::Display for BarrierState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standing => write!(f, "STANDING"),
            Self::Down => write!(f, "DOWN"),
            Self::Endure => write!(f, "ENDURE"),
            Self::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

impl FromStr for BarrierState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STANDING" => Ok(Self::Standing),
            "DOWN" => Ok(Self::Down),
            "ENDURE" => Ok(Self::Endure),
            "TIMED_OUT" => Ok(Self::TimedOut),
            _ => Err(format!("Invalid barrier state: {s}")),
        }
    }
}

impl BarrierState {
    /// Returns true if no further transitions are allowed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Standing)
    }

    /// Returns true if waiters are released with a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Endure | Self::TimedOut)
    }

    /// Returns true if the transition `self -> next` is in the transition table.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Standing, Self::Down | Self::Endure | Self::TimedOut)
        )
    }
}

/// Structural level of a barrier position or of an enclosing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarrierPositionType {
    /// A stage.
    Stage,
    /// A step group inside a stage.
    StepGroup,
    /// A step.
    Step,
}

impl fmt::Display for BarrierPositionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage => write!(f, "STAGE"),
            Self::StepGroup => write!(f, "STEP_GROUP"),
            Self::Step => write!(f, "STEP"),
        }
    }
}

/// Execution status of a node or of a whole plan, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Scheduled but not started.
    Queued,
    /// Currently running.
    Running,
    /// Suspended, waiting on an asynchronous callback.
    AsyncWaiting,
    /// Completed successfully.
    Succeeded,
    /// Skipped by a condition.
    Skipped,
    /// Failed, but the failure was ignored by a failure strategy.
    IgnoreFailed,
    /// Failed.
    Failed,
    /// Errored out.
    Errored,
    /// Aborted by a user or an interrupt.
    Aborted,
    /// The node's own deadline passed.
    Expired,
    /// Being torn down.
    Discontinuing,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::AsyncWaiting => "ASYNC_WAITING",
            Self::Succeeded => "SUCCEEDED",
            Self::Skipped => "SKIPPED",
            Self::IgnoreFailed => "IGNORE_FAILED",
            Self::Failed => "FAILED",
            Self::Errored => "ERRORED",
            Self::Aborted => "ABORTED",
            Self::Expired => "EXPIRED",
            Self::Discontinuing => "DISCONTINUING",
        };
        f.write_str(s)
    }
}

impl ExecutionStatus {
    /// Statuses that count as having reached the barrier.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Skipped | Self::IgnoreFailed | Self::AsyncWaiting
        )
    }

    /// Statuses that mean the branch will never reach the barrier.
    #[must_use]
    pub fn is_broke(&self) -> bool {
        matches!(self, Self::Failed | Self::Errored | Self::Aborted)
    }

    /// Returns true if the node's deadline passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }
}

/// Where a single bound participant stands relative to the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantState {
    /// Not there yet (or not started).
    Approaching,
    /// Reached the barrier.
    Arrived,
    /// Will never arrive.
    Abandoned,
    /// Its deadline expired.
    TimedOut,
}

impl ParticipantState {
    /// Classifies a node status. `None` means the engine has no record yet.
    #[must_use]
    pub fn from_status(status: Option<ExecutionStatus>) -> Self {
        match status {
            Some(s) if s.is_expired() => Self::TimedOut,
            Some(s) if s.is_broke() => Self::Abandoned,
            Some(s) if s.is_positive() => Self::Arrived,
            _ => Self::Approaching,
        }
    }
}
