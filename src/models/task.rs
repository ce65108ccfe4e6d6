//! Task model and task-level state machine

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::UnknownStatus;

/// Task database model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub document_id: Option<String>,
    pub algorithm_image: String,
    pub dataset_ref: String,
    pub container_handle: Option<String>,
    pub status: TaskStatus,
    /// Stage that was in flight when the task failed
    pub failed_stage: Option<TaskStatus>,
    /// Append-only failure history
    pub error_log: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Both execution inputs are present
    pub fn has_execution_inputs(&self) -> bool {
        !self.algorithm_image.trim().is_empty() && !self.dataset_ref.trim().is_empty()
    }

    /// Provisioning failures may be retried by re-invoking preparation
    pub fn can_retry_preparation(&self) -> bool {
        self.status == TaskStatus::Failed && self.failed_stage == Some(TaskStatus::Preparing)
    }
}

/// Task status
///
/// ```text
/// created → analyzing → analyzed → preparing → executing → completed
///              ↓                       ↓            ↓
///            failed                  failed       failed
/// ```
///
/// `analyzed` and `completed` are resting states that allow re-entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Created,
    Analyzing,
    Analyzed,
    Preparing,
    Executing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 7] = [
        Self::Created,
        Self::Analyzing,
        Self::Analyzed,
        Self::Preparing,
        Self::Executing,
        Self::Completed,
        Self::Failed,
    ];

    /// Get status as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Analyzing => "analyzing",
            Self::Analyzed => "analyzed",
            Self::Preparing => "preparing",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Legal successor states.
    ///
    /// `failed → preparing` is not listed here; it is only legal for a task
    /// whose failure happened while preparing, see [`Task::can_retry_preparation`].
    pub fn successors(&self) -> &'static [TaskStatus] {
        match self {
            Self::Created => &[Self::Analyzing],
            Self::Analyzing => &[Self::Analyzed, Self::Failed],
            Self::Analyzed => &[Self::Analyzing, Self::Preparing, Self::Executing],
            Self::Preparing => &[Self::Preparing, Self::Executing, Self::Failed],
            Self::Executing => &[Self::Completed, Self::Failed],
            Self::Completed => &[Self::Preparing, Self::Executing],
            Self::Failed => &[],
        }
    }

    /// Check the transition table
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        self.successors().contains(&next)
    }

    /// Transition table plus the `failed → preparing` retry edge. Callers
    /// taking the retry edge gate it on [`Task::can_retry_preparation`].
    pub fn can_move_to(&self, next: TaskStatus) -> bool {
        self.can_transition_to(next) || (*self == Self::Failed && next == Self::Preparing)
    }

    /// States that have a legal edge into `next`
    pub fn predecessors(next: TaskStatus) -> Vec<TaskStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    /// A stage is running (only these may move to `failed`)
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Analyzing | Self::Preparing | Self::Executing)
    }

    /// Check if this is the absorbing failure state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

text_column!(TaskStatus);

/// Create task request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTaskRequest {
    /// Requirement document to analyze
    pub document_id: Option<String>,

    /// Algorithm image reference, e.g. `registry.local/algo:v1`
    #[validate(
        length(min = 1, max = 255),
        custom(function = "crate::utils::validation::validate_image_ref")
    )]
    pub algorithm_image: String,

    /// Host path of the dataset mounted into the container
    #[validate(
        length(min = 1, max = 1024),
        custom(function = "crate::utils::validation::validate_dataset_ref")
    )]
    pub dataset_ref: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("running".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_transition_table() {
        assert!(TaskStatus::Created.can_transition_to(TaskStatus::Analyzing));
        assert!(!TaskStatus::Created.can_transition_to(TaskStatus::Executing));
        assert!(TaskStatus::Analyzed.can_transition_to(TaskStatus::Analyzing));
        assert!(TaskStatus::Completed.can_transition_to(TaskStatus::Executing));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Analyzing));
        assert!(!TaskStatus::Analyzed.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Failed.successors().is_empty());
    }

    #[test]
    fn test_retry_edge_is_the_only_exit_from_failed() {
        assert!(TaskStatus::Failed.can_move_to(TaskStatus::Preparing));
        assert!(!TaskStatus::Failed.can_move_to(TaskStatus::Executing));
        assert!(!TaskStatus::Failed.can_move_to(TaskStatus::Analyzing));
        assert!(TaskStatus::Analyzed.can_move_to(TaskStatus::Preparing));
        assert!(!TaskStatus::Created.can_move_to(TaskStatus::Preparing));
    }

    #[test]
    fn test_failed_only_reachable_from_in_flight_states() {
        let sources = TaskStatus::predecessors(TaskStatus::Failed);
        assert_eq!(
            sources,
            vec![TaskStatus::Analyzing, TaskStatus::Preparing, TaskStatus::Executing]
        );
        assert!(sources.iter().all(TaskStatus::is_in_flight));
    }

    #[test]
    fn test_create_task_request_validation() {
        let ok = CreateTaskRequest {
            document_id: None,
            algorithm_image: "algo:v1".to_string(),
            dataset_ref: "/data/ds1".to_string(),
        };
        assert!(ok.validate().is_ok());

        let bad_image = CreateTaskRequest {
            algorithm_image: "not an image".to_string(),
            ..ok.clone()
        };
        assert!(bad_image.validate().is_err());

        let relative_dataset = CreateTaskRequest {
            dataset_ref: "data/ds1".to_string(),
            ..ok
        };
        assert!(relative_dataset.validate().is_err());
    }
}
