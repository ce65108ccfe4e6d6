//! Test case model

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::UnknownStatus;

/// Test case database model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    /// Store-assigned insertion sequence, breaks `created_at` ties
    pub seq: i64,
    pub task_id: String,
    pub name: String,
    pub purpose: String,
    /// Shell command template, one step per line
    pub steps: String,
    pub expected_result: String,
    pub validation_method: String,
    pub test_data_ref: Option<String>,
    /// Step parameters substituted into `steps`
    #[sqlx(json)]
    pub parameters: BTreeMap<String, String>,
    pub status: CaseStatus,
    pub actual_output: Option<String>,
    pub last_executed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TestCase {
    /// Get a preview of the steps (truncated on a char boundary)
    pub fn steps_preview(&self, max_len: usize) -> String {
        match self.steps.char_indices().nth(max_len) {
            None => self.steps.clone(),
            Some((idx, _)) => format!("{}...", &self.steps[..idx]),
        }
    }
}

/// Test case insert payload
#[derive(Debug, Clone)]
pub struct NewTestCase {
    pub id: String,
    pub task_id: String,
    pub name: String,
    pub purpose: String,
    pub steps: String,
    pub expected_result: String,
    pub validation_method: String,
    pub test_data_ref: Option<String>,
    pub parameters: BTreeMap<String, String>,
}

/// Per-case execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    Executing,
    Passed,
    Failed,
}

impl CaseStatus {
    pub const ALL: [CaseStatus; 4] = [Self::Pending, Self::Executing, Self::Passed, Self::Failed];

    /// Get status as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }

    /// Check if the case has a verdict
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }

    /// Status for a validation verdict
    pub fn from_verdict(passed: bool) -> Self {
        if passed { Self::Passed } else { Self::Failed }
    }
}

impl FromStr for CaseStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

text_column!(CaseStatus);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_status_helpers() {
        assert!(CaseStatus::Passed.is_terminal());
        assert!(CaseStatus::Failed.is_terminal());
        assert!(!CaseStatus::Executing.is_terminal());
        assert_eq!(CaseStatus::from_verdict(false), CaseStatus::Failed);
        assert_eq!("executing".parse::<CaseStatus>().unwrap(), CaseStatus::Executing);
    }

    #[test]
    fn test_steps_preview_respects_char_boundaries() {
        let case = TestCase {
            id: "CASE_1".to_string(),
            seq: 1,
            task_id: "TASK_1".to_string(),
            name: "n".to_string(),
            purpose: String::new(),
            steps: "检查输出目录".to_string(),
            expected_result: String::new(),
            validation_method: String::new(),
            test_data_ref: None,
            parameters: BTreeMap::new(),
            status: CaseStatus::Pending,
            actual_output: None,
            last_executed: None,
            created_at: Utc::now(),
        };
        assert_eq!(case.steps_preview(2), "检查...");
        assert_eq!(case.steps_preview(20), "检查输出目录");
    }
}
