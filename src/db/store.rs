//! Persistence seam used by the pipeline

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{
        CaseStatus, Document, ExecutionResult, NewExecutionResult, NewTestCase, Report, Task,
        TaskStatus, TestCase,
    },
};

/// Durable storage for documents, tasks, cases, results and reports.
///
/// Every method is atomic with respect to concurrent callers. Status changes
/// go through [`TaskStore::transition_task`] and [`TaskStore::fail_task`],
/// which only apply when the current status is one of `from`.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert_document(&self, document: &Document) -> AppResult<Document>;

    async fn get_document(&self, id: &str) -> AppResult<Option<Document>>;

    async fn insert_task(&self, task: &Task) -> AppResult<Task>;

    async fn get_task(&self, id: &str) -> AppResult<Option<Task>>;

    async fn list_tasks(&self) -> AppResult<Vec<Task>>;

    async fn list_tasks_with_status(&self, statuses: &[TaskStatus]) -> AppResult<Vec<Task>>;

    /// Returns the updated task, or `None` when the task is missing or not in `from`
    async fn transition_task(
        &self,
        id: &str,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> AppResult<Option<Task>>;

    /// Move to `failed`, setting `failed_stage` and appending `entry` together
    async fn fail_task(
        &self,
        id: &str,
        from: &[TaskStatus],
        stage: TaskStatus,
        entry: &str,
    ) -> AppResult<Option<Task>>;

    async fn append_task_error(&self, id: &str, entry: &str) -> AppResult<()>;

    async fn set_container_handle(&self, id: &str, handle: Option<&str>) -> AppResult<()>;

    /// All-or-nothing bulk insert
    async fn insert_test_cases(&self, cases: &[NewTestCase]) -> AppResult<Vec<TestCase>>;

    async fn get_test_case(&self, id: &str) -> AppResult<Option<TestCase>>;

    /// Ordered by `(created_at, seq)`
    async fn list_test_cases(&self, task_id: &str) -> AppResult<Vec<TestCase>>;

    async fn set_case_status(&self, id: &str, status: CaseStatus) -> AppResult<()>;

    async fn finish_case(
        &self,
        id: &str,
        status: CaseStatus,
        actual_output: &str,
        executed_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Returns the number of cases reset from `executing` to `pending`
    async fn reset_interrupted_cases(&self, task_id: &str) -> AppResult<u64>;

    async fn insert_result(&self, result: &NewExecutionResult) -> AppResult<ExecutionResult>;

    /// Ordered by `(executed_at, seq)`
    async fn list_results(&self, case_id: &str) -> AppResult<Vec<ExecutionResult>>;

    /// Latest result per case of the task
    async fn latest_results(&self, task_id: &str) -> AppResult<Vec<ExecutionResult>>;

    async fn upsert_report(&self, report: &Report) -> AppResult<Report>;

    async fn get_report(&self, task_id: &str) -> AppResult<Option<Report>>;
}
