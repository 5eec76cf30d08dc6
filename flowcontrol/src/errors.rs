//! Error types for barrier coordination.
//!
//! Definition errors are caller-visible validation failures and are never
//! retried. Store conflicts are expected to be transient and are retried at
//! the repository boundary rather than inside the coordinator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FlowControlError>;

/// The main error type for flowcontrol operations.
#[derive(Debug, Error)]
pub enum FlowControlError {
    /// No barrier instance exists with the given id.
    #[error("Barrier Execution Instance with id [{id}] not found")]
    NotFound {
        /// The missing id.
        id: String,
    },

    /// The pipeline definition could not be turned into barrier definitions.
    #[error("{0}")]
    Definition(#[from] BarrierDefinitionError),

    /// The persisted-document store rejected an operation.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// The wait/notify collaborator could not be signalled.
    #[error("Failed to notify waiters on [{correlation_id}]: {reason}")]
    Notify {
        /// The correlation id that should have been released.
        correlation_id: String,
        /// Why the signal failed.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FlowControlError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates a notify error.
    #[must_use]
    pub fn notify(correlation_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Notify {
            correlation_id: correlation_id.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_transient(),
            Self::Notify { .. } => true,
            Self::NotFound { .. } | Self::Definition(_) | Self::Serialization(_) => false,
        }
    }
}

impl From<serde_json::Error> for FlowControlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Diagnostic metadata attached to definition errors.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "BARRIER-002-UNDECLARED").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Errors raised while scanning a pipeline definition for barriers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BarrierDefinitionError {
    /// The definition is malformed or has an unexpected structure.
    #[error("Could not extract barrier definitions from yaml: {reason}")]
    Extraction {
        /// What went wrong while parsing.
        reason: String,
    },

    /// A stage or step references a barrier that `flowControl` never declares.
    #[error("Barrier Identifier {identifier} was not present in flowControl")]
    UndeclaredBarrier {
        /// The referenced identifier.
        identifier: String,
    },
}

impl BarrierDefinitionError {
    /// Creates an extraction error.
    #[must_use]
    pub fn extraction(reason: impl Into<String>) -> Self {
        Self::Extraction {
            reason: reason.into(),
        }
    }

    /// Creates an undeclared-barrier error.
    #[must_use]
    pub fn undeclared(identifier: impl Into<String>) -> Self {
        Self::UndeclaredBarrier {
            identifier: identifier.into(),
        }
    }

    /// Returns diagnostic info with a stable code and fix hint.
    #[must_use]
    pub fn error_info(&self) -> ErrorInfo {
        match self {
            Self::Extraction { reason } => ErrorInfo::new(
                "BARRIER-001-EXTRACT",
                "Could not extract barrier definitions from yaml",
            )
            .with_fix_hint("Check that the pipeline yaml is well formed.")
            .with_context_entry("reason", reason.clone()),
            Self::UndeclaredBarrier { identifier } => ErrorInfo::new(
                "BARRIER-002-UNDECLARED",
                format!("Barrier '{identifier}' is referenced but not declared"),
            )
            .with_fix_hint("Declare the barrier under pipeline.flowControl.barriers.")
            .with_context_entry("identifier", identifier.clone()),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let info = self.error_info();
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(info.code));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Some(hint) = info.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        if !info.context.is_empty() {
            map.insert("context".to_string(), serde_json::json!(info.context));
        }
        map
    }
}

/// Errors surfaced by a [`crate::store::BarrierStore`] backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A unique key was violated by an insert.
    #[error("Duplicate barrier instance: {key}")]
    Duplicate {
        /// The violated key.
        key: String,
    },

    /// An atomic update lost a race and may be retried.
    #[error("Concurrent modification of barrier instance {id}")]
    Conflict {
        /// The contested document id.
        id: String,
    },

    /// The backend failed.
    #[error("Barrier store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns true if the error is expected to clear on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Backend(_))
    }
}
