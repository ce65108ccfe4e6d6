//! In-process [`TaskStore`] for tests and single-node runs without Postgres

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::store::TaskStore;
use crate::{
    error::{AppError, AppResult},
    models::{
        CaseStatus, Document, ExecutionResult, NewExecutionResult, NewTestCase, Report, Task,
        TaskStatus, TestCase,
    },
    utils::now_utc,
};

#[derive(Default)]
struct Inner {
    documents: HashMap<String, Document>,
    tasks: HashMap<String, Task>,
    cases: Vec<TestCase>,
    results: Vec<ExecutionResult>,
    reports: HashMap<String, Report>,
    next_seq: i64,
}

impl Inner {
    fn next_seq(&mut self) -> i64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn case_mut(&mut self, id: &str) -> AppResult<&mut TestCase> {
        self.cases
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::CaseNotFound(id.to_string()))
    }

    fn task_mut(&mut self, id: &str) -> AppResult<&mut Task> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| AppError::TaskNotFound(id.to_string()))
    }
}

/// Store holding everything behind a single lock
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert_document(&self, document: &Document) -> AppResult<Document> {
        let mut inner = self.inner.write().await;
        if inner.documents.contains_key(&document.id) {
            return Err(AppError::Database(format!(
                "duplicate document id {}",
                document.id
            )));
        }
        inner
            .documents
            .insert(document.id.clone(), document.clone());
        Ok(document.clone())
    }

    async fn get_document(&self, id: &str) -> AppResult<Option<Document>> {
        Ok(self.inner.read().await.documents.get(id).cloned())
    }

    async fn insert_task(&self, task: &Task) -> AppResult<Task> {
        let mut inner = self.inner.write().await;
        if inner.tasks.contains_key(&task.id) {
            return Err(AppError::Database(format!("duplicate task id {}", task.id)));
        }
        if let Some(document_id) = &task.document_id {
            if !inner.documents.contains_key(document_id) {
                return Err(AppError::DocumentNotFound(document_id.clone()));
            }
        }
        inner.tasks.insert(task.id.clone(), task.clone());
        Ok(task.clone())
    }

    async fn get_task(&self, id: &str) -> AppResult<Option<Task>> {
        Ok(self.inner.read().await.tasks.get(id).cloned())
    }

    async fn list_tasks(&self) -> AppResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self.inner.read().await.tasks.values().cloned().collect();
        sort_tasks(&mut tasks);
        Ok(tasks)
    }

    async fn list_tasks_with_status(&self, statuses: &[TaskStatus]) -> AppResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .inner
            .read()
            .await
            .tasks
            .values()
            .filter(|t| statuses.contains(&t.status))
            .cloned()
            .collect();
        sort_tasks(&mut tasks);
        Ok(tasks)
    }

    async fn transition_task(
        &self,
        id: &str,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> AppResult<Option<Task>> {
        let mut inner = self.inner.write().await;
        let Some(task) = inner.tasks.get_mut(id) else {
            return Ok(None);
        };
        if !from.contains(&task.status) {
            return Ok(None);
        }
        task.status = to;
        task.updated_at = now_utc();
        Ok(Some(task.clone()))
    }

    async fn fail_task(
        &self,
        id: &str,
        from: &[TaskStatus],
        stage: TaskStatus,
        entry: &str,
    ) -> AppResult<Option<Task>> {
        let mut inner = self.inner.write().await;
        let Some(task) = inner.tasks.get_mut(id) else {
            return Ok(None);
        };
        if !from.contains(&task.status) {
            return Ok(None);
        }
        task.status = TaskStatus::Failed;
        task.failed_stage = Some(stage);
        task.error_log.push(entry.to_string());
        task.updated_at = now_utc();
        Ok(Some(task.clone()))
    }

    async fn append_task_error(&self, id: &str, entry: &str) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let task = inner.task_mut(id)?;
        task.error_log.push(entry.to_string());
        task.updated_at = now_utc();
        Ok(())
    }

    async fn set_container_handle(&self, id: &str, handle: Option<&str>) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let task = inner.task_mut(id)?;
        task.container_handle = handle.map(str::to_string);
        task.updated_at = now_utc();
        Ok(())
    }

    async fn insert_test_cases(&self, cases: &[NewTestCase]) -> AppResult<Vec<TestCase>> {
        let mut inner = self.inner.write().await;

        // Validate the whole batch before touching anything
        for case in cases {
            if !inner.tasks.contains_key(&case.task_id) {
                return Err(AppError::TaskNotFound(case.task_id.clone()));
            }
            if inner.cases.iter().any(|c| c.id == case.id) {
                return Err(AppError::Database(format!("duplicate case id {}", case.id)));
            }
        }

        let created_at = now_utc();
        let mut created = Vec::with_capacity(cases.len());
        for case in cases {
            let row = TestCase {
                id: case.id.clone(),
                seq: inner.next_seq(),
                task_id: case.task_id.clone(),
                name: case.name.clone(),
                purpose: case.purpose.clone(),
                steps: case.steps.clone(),
                expected_result: case.expected_result.clone(),
                validation_method: case.validation_method.clone(),
                test_data_ref: case.test_data_ref.clone(),
                parameters: case.parameters.clone(),
                status: CaseStatus::Pending,
                actual_output: None,
                last_executed: None,
                created_at,
            };
            inner.cases.push(row.clone());
            created.push(row);
        }

        Ok(created)
    }

    async fn get_test_case(&self, id: &str) -> AppResult<Option<TestCase>> {
        Ok(self
            .inner
            .read()
            .await
            .cases
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn list_test_cases(&self, task_id: &str) -> AppResult<Vec<TestCase>> {
        let mut cases: Vec<TestCase> = self
            .inner
            .read()
            .await
            .cases
            .iter()
            .filter(|c| c.task_id == task_id)
            .cloned()
            .collect();
        cases.sort_by_key(|c| (c.created_at, c.seq));
        Ok(cases)
    }

    async fn set_case_status(&self, id: &str, status: CaseStatus) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner.case_mut(id)?.status = status;
        Ok(())
    }

    async fn finish_case(
        &self,
        id: &str,
        status: CaseStatus,
        actual_output: &str,
        executed_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let case = inner.case_mut(id)?;
        case.status = status;
        case.actual_output = Some(actual_output.to_string());
        case.last_executed = Some(executed_at);
        Ok(())
    }

    async fn reset_interrupted_cases(&self, task_id: &str) -> AppResult<u64> {
        let mut inner = self.inner.write().await;
        let mut reset = 0;
        for case in inner
            .cases
            .iter_mut()
            .filter(|c| c.task_id == task_id && c.status == CaseStatus::Executing)
        {
            case.status = CaseStatus::Pending;
            reset += 1;
        }
        Ok(reset)
    }

    async fn insert_result(&self, result: &NewExecutionResult) -> AppResult<ExecutionResult> {
        let mut inner = self.inner.write().await;
        if !inner.cases.iter().any(|c| c.id == result.test_case_id) {
            return Err(AppError::CaseNotFound(result.test_case_id.clone()));
        }
        let row = ExecutionResult {
            id: result.id.clone(),
            seq: inner.next_seq(),
            test_case_id: result.test_case_id.clone(),
            passed: result.passed,
            output_summary: result.output_summary.clone(),
            raw_output: result.raw_output.clone(),
            exit_code: result.exit_code,
            executed_at: result.executed_at,
        };
        inner.results.push(row.clone());
        Ok(row)
    }

    async fn list_results(&self, case_id: &str) -> AppResult<Vec<ExecutionResult>> {
        let mut results: Vec<ExecutionResult> = self
            .inner
            .read()
            .await
            .results
            .iter()
            .filter(|r| r.test_case_id == case_id)
            .cloned()
            .collect();
        results.sort_by_key(ExecutionResult::ordering_key);
        Ok(results)
    }

    async fn latest_results(&self, task_id: &str) -> AppResult<Vec<ExecutionResult>> {
        let inner = self.inner.read().await;
        let mut latest: HashMap<&str, &ExecutionResult> = HashMap::new();

        for result in &inner.results {
            let belongs = inner
                .cases
                .iter()
                .any(|c| c.id == result.test_case_id && c.task_id == task_id);
            if !belongs {
                continue;
            }
            let entry = latest.entry(result.test_case_id.as_str()).or_insert(result);
            if result.ordering_key() > entry.ordering_key() {
                *entry = result;
            }
        }

        let mut rows: Vec<ExecutionResult> = latest.into_values().cloned().collect();
        rows.sort_by(|a, b| a.test_case_id.cmp(&b.test_case_id));
        Ok(rows)
    }

    async fn upsert_report(&self, report: &Report) -> AppResult<Report> {
        let mut inner = self.inner.write().await;
        if !inner.tasks.contains_key(&report.task_id) {
            return Err(AppError::TaskNotFound(report.task_id.clone()));
        }
        inner
            .reports
            .insert(report.task_id.clone(), report.clone());
        Ok(report.clone())
    }

    async fn get_report(&self, task_id: &str) -> AppResult<Option<Report>> {
        Ok(self.inner.read().await.reports.get(task_id).cloned())
    }
}
