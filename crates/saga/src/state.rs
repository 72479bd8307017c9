//! Saga and work-item lifecycles.

use serde::{Deserialize, Serialize};

use crate::error::SagaError;

/// Lifecycle of one order's saga.
///
/// ```text
/// NotStarted ──► Running ──┬──► Completed
///                          └──► Compensating ──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    #[default]
    NotStarted,
    Running,
    /// A step failed; applied effects are being undone.
    Compensating,
    Completed,
    Failed,
}

impl SagaState {
    /// Returns true if the saga can begin compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::Running => "Running",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of one courier work item inside the worker.
///
/// ```text
/// Received ──► Fulfilling ──┬──► ResolvedSuccess
///     │                     └──► ResolvedFailure
///     └────────────────────────► ResolvedFailure   (unparseable item)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WorkItemState {
    #[default]
    Received,
    Fulfilling,
    ResolvedSuccess,
    ResolvedFailure,
}

impl WorkItemState {
    /// Moves to `next`, rejecting any edge not in the diagram above.
    pub fn transition(self, next: WorkItemState) -> Result<WorkItemState, SagaError> {
        use WorkItemState::*;
        match (self, next) {
            (Received, Fulfilling)
            | (Received, ResolvedFailure)
            | (Fulfilling, ResolvedSuccess)
            | (Fulfilling, ResolvedFailure) => Ok(next),
            _ => Err(SagaError::InvalidState {
                expected: format!("a successor of {}", self.as_str()),
                actual: next.as_str().to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemState::Received => "Received",
            WorkItemState::Fulfilling => "Fulfilling",
            WorkItemState::ResolvedSuccess => "ResolvedSuccess",
            WorkItemState::ResolvedFailure => "ResolvedFailure",
        }
    }
}

impl std::fmt::Display for WorkItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
