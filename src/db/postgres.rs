//! Postgres-backed [`TaskStore`]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{
    repositories::{
        DocumentRepository, ReportRepository, ResultRepository, TaskRepository,
        TestCaseRepository,
    },
    store::TaskStore,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        CaseStatus, Document, ExecutionResult, NewExecutionResult, NewTestCase, Report, Task,
        TaskStatus, TestCase,
    },
};

/// Store over a Postgres connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TaskStore for PgStore {
    async fn insert_document(&self, document: &Document) -> AppResult<Document> {
        DocumentRepository::create(&self.pool, document).await
    }

    async fn get_document(&self, id: &str) -> AppResult<Option<Document>> {
        DocumentRepository::find_by_id(&self.pool, id).await
    }

    async fn insert_task(&self, task: &Task) -> AppResult<Task> {
        TaskRepository::create(&self.pool, task).await
    }

    async fn get_task(&self, id: &str) -> AppResult<Option<Task>> {
        TaskRepository::find_by_id(&self.pool, id).await
    }

    async fn list_tasks(&self) -> AppResult<Vec<Task>> {
        TaskRepository::list(&self.pool).await
    }

    async fn list_tasks_with_status(&self, statuses: &[TaskStatus]) -> AppResult<Vec<Task>> {
        TaskRepository::list_by_status(&self.pool, statuses).await
    }

    async fn transition_task(
        &self,
        id: &str,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> AppResult<Option<Task>> {
        TaskRepository::transition(&self.pool, id, from, to).await
    }

    async fn fail_task(
        &self,
        id: &str,
        from: &[TaskStatus],
        stage: TaskStatus,
        entry: &str,
    ) -> AppResult<Option<Task>> {
        TaskRepository::fail(&self.pool, id, from, stage, entry).await
    }

    async fn append_task_error(&self, id: &str, entry: &str) -> AppResult<()> {
        if !TaskRepository::append_error(&self.pool, id, entry).await? {
            return Err(AppError::TaskNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn set_container_handle(&self, id: &str, handle: Option<&str>) -> AppResult<()> {
        if !TaskRepository::set_container_handle(&self.pool, id, handle).await? {
            return Err(AppError::TaskNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn insert_test_cases(&self, cases: &[NewTestCase]) -> AppResult<Vec<TestCase>> {
        TestCaseRepository::create_many(&self.pool, cases).await
    }

    async fn get_test_case(&self, id: &str) -> AppResult<Option<TestCase>> {
        TestCaseRepository::find_by_id(&self.pool, id).await
    }

    async fn list_test_cases(&self, task_id: &str) -> AppResult<Vec<TestCase>> {
        TestCaseRepository::list_by_task(&self.pool, task_id).await
    }

    async fn set_case_status(&self, id: &str, status: CaseStatus) -> AppResult<()> {
        if !TestCaseRepository::update_status(&self.pool, id, status).await? {
            return Err(AppError::CaseNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn finish_case(
        &self,
        id: &str,
        status: CaseStatus,
        actual_output: &str,
        executed_at: DateTime<Utc>,
    ) -> AppResult<()> {
        if !TestCaseRepository::finish(&self.pool, id, status, actual_output, executed_at).await? {
            return Err(AppError::CaseNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn reset_interrupted_cases(&self, task_id: &str) -> AppResult<u64> {
        TestCaseRepository::reset_executing(&self.pool, task_id).await
    }

    async fn insert_result(&self, result: &NewExecutionResult) -> AppResult<ExecutionResult> {
        ResultRepository::create(&self.pool, result).await
    }

    async fn list_results(&self, case_id: &str) -> AppResult<Vec<ExecutionResult>> {
        ResultRepository::list_by_case(&self.pool, case_id).await
    }

    async fn latest_results(&self, task_id: &str) -> AppResult<Vec<ExecutionResult>> {
        ResultRepository::latest_by_task(&self.pool, task_id).await
    }

    async fn upsert_report(&self, report: &Report) -> AppResult<Report> {
        ReportRepository::upsert(&self.pool, report).await
    }

    async fn get_report(&self, task_id: &str) -> AppResult<Option<Report>> {
        ReportRepository::find_by_task(&self.pool, task_id).await
    }
}
