use eyre::{Result, eyre};
use log::{error, info, warn};
use std::fmt;

/// Lifecycle shared by the deploy and verify workflows. There is no
/// cancelled state: a submitted transaction cannot be withdrawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    Initiated,
    Submitted,
    Completed,
    Failed(String),
}

impl WorkflowState {
    pub fn can_transition_to(&self, next: &WorkflowState) -> bool {
        matches!(
            (self, next),
            (WorkflowState::Initiated, WorkflowState::Submitted)
                | (WorkflowState::Initiated, WorkflowState::Failed(_))
                | (WorkflowState::Submitted, WorkflowState::Completed)
                | (WorkflowState::Submitted, WorkflowState::Failed(_))
        )
    }

    pub fn transition(&mut self, next: WorkflowState) -> Result<()> {
        if !self.can_transition_to(&next) {
            return Err(eyre!("Invalid workflow transition: {} -> {}", self, next));
        }
        *self = next;
        Ok(())
    }

    /// Like `transition`, logging the move under the `workflow` label. An
    /// illegal move is logged and ignored.
    pub fn advance(&mut self, workflow: &str, next: WorkflowState) {
        let previous = self.clone();
        match self.transition(next) {
            Ok(()) if matches!(self, WorkflowState::Failed(_)) => {
                error!("{} {} -> {}", workflow, previous, self)
            }
            Ok(()) => info!("{} {} -> {}", workflow, previous, self),
            Err(e) => warn!("{}: {}", workflow, e),
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Initiated => write!(f, "Initiated"),
            WorkflowState::Submitted => write!(f, "Submitted"),
            WorkflowState::Completed => write!(f, "Completed"),
            WorkflowState::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}
