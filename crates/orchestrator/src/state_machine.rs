use collect_core::TaskStatus;

use crate::error::{OrchestratorError, Result};

/// Legal moves of a collection task. Terminal statuses have no exits.
pub struct TaskStateMachine;

impl TaskStateMachine {
    pub fn validate_transition(from: &TaskStatus, to: &TaskStatus) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &TaskStatus) -> &'static [TaskStatus] {
        match from {
            TaskStatus::Pending => &[
                TaskStatus::Running,
                TaskStatus::Failed,
                TaskStatus::TimedOut,
            ],
            TaskStatus::Running => &[
                TaskStatus::Completed,
                TaskStatus::Failed,
                TaskStatus::TimedOut,
            ],
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::TimedOut => &[],
        }
    }

    pub fn can_transition(from: &TaskStatus, to: &TaskStatus) -> bool {
        Self::validate_transition(from, to).is_ok()
    }

    pub fn next_status(current: &TaskStatus) -> Option<TaskStatus> {
        match current {
            TaskStatus::Pending => Some(TaskStatus::Running),
            TaskStatus::Running => Some(TaskStatus::Completed),
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::TimedOut => None,
        }
    }
}
