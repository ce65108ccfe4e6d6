//! Summary statistics and per-case details

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    db::TaskStore,
    error::AppResult,
    models::{CaseStatus, ExecutionResult, ReportSummary, Task, TaskStatus, TestCase},
    utils::now_utc,
};

/// Count verdicts over a task's cases
pub fn summarize(cases: &[TestCase]) -> ReportSummary {
    let passed = cases
        .iter()
        .filter(|c| c.status == CaseStatus::Passed)
        .count() as i64;
    let failed = cases
        .iter()
        .filter(|c| c.status == CaseStatus::Failed)
        .count() as i64;

    ReportSummary::from_counts(cases.len() as i64, passed, failed)
}

/// Task fields shown in a report header
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub id: String,
    pub algorithm_image: String,
    pub dataset_ref: String,
    pub status: TaskStatus,
    pub error_log: Vec<String>,
}

/// One row of the report body
#[derive(Debug, Clone, Serialize)]
pub struct CaseDetail {
    pub case_id: String,
    pub name: String,
    pub purpose: String,
    pub steps: String,
    pub expected_result: String,
    pub validation_method: String,
    pub status: CaseStatus,
    /// From the most recent execution result
    pub output_summary: Option<String>,
    pub exit_code: Option<i64>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl CaseDetail {
    fn new(case: &TestCase, latest: Option<&ExecutionResult>) -> Self {
        Self {
            case_id: case.id.clone(),
            name: case.name.clone(),
            purpose: case.purpose.clone(),
            steps: case.steps.clone(),
            expected_result: case.expected_result.clone(),
            validation_method: case.validation_method.clone(),
            status: case.status,
            output_summary: latest.map(|r| r.output_summary.clone()),
            exit_code: latest.and_then(|r| r.exit_code),
            executed_at: latest.map(|r| r.executed_at),
        }
    }
}

/// Everything a renderer sees
#[derive(Debug, Clone, Serialize)]
pub struct ReportContext {
    pub task: TaskInfo,
    pub summary: ReportSummary,
    pub cases: Vec<CaseDetail>,
    pub generated_at: DateTime<Utc>,
}

/// Recompute the report context from the store
pub async fn build_context(store: &dyn TaskStore, task: &Task) -> AppResult<ReportContext> {
    let cases = store.list_test_cases(&task.id).await?;
    let latest: HashMap<String, ExecutionResult> = store
        .latest_results(&task.id)
        .await?
        .into_iter()
        .map(|r| (r.test_case_id.clone(), r))
        .collect();

    let details = cases
        .iter()
        .map(|case| CaseDetail::new(case, latest.get(&case.id)))
        .collect();

    Ok(ReportContext {
        task: TaskInfo {
            id: task.id.clone(),
            algorithm_image: task.algorithm_image.clone(),
            dataset_ref: task.dataset_ref.clone(),
            status: task.status,
            error_log: task.error_log.clone(),
        },
        summary: summarize(&cases),
        cases: details,
        generated_at: now_utc(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn case(id: &str, status: CaseStatus) -> TestCase {
        TestCase {
            id: id.to_string(),
            seq: 0,
            task_id: "TASK_1".to_string(),
            name: id.to_string(),
            purpose: String::new(),
            steps: "true".to_string(),
            expected_result: String::new(),
            validation_method: String::new(),
            test_data_ref: None,
            parameters: BTreeMap::new(),
            status,
            actual_output: None,
            last_executed: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_summarize_counts_statuses() {
        let cases = vec![
            case("a", CaseStatus::Passed),
            case("b", CaseStatus::Passed),
            case("c", CaseStatus::Failed),
            case("d", CaseStatus::Pending),
            case("e", CaseStatus::Executing),
        ];
        let summary = summarize(&cases);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.success_rate, 40.0);
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate, 0.0);
    }
}
