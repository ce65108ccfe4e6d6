//! Task-level workflow
//!
//! Every mutating operation on a task runs under that task's lock from
//! [`TaskLocks`]. Status changes are compare-and-swap writes in the store, so
//! a stale view of a task can never overwrite a newer one.

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::{sync::OwnedMutexGuard, task::JoinHandle};
use validator::Validate;

use super::{
    locks::{CancelGuard, CancelRegistry, TaskLocks},
    scheduler::{RunTotals, Scheduler},
    stages::{AnalysisRun, AnalysisStep},
};
use crate::{
    analyzer::RequirementAnalyzer,
    config::ReportConfig,
    constants::{MAX_DOCUMENT_BYTES, id_prefixes},
    db::TaskStore,
    engine::ContainerEngine,
    error::{AppError, AppResult},
    models::{
        CaseStatus, CreateTaskRequest, Document, ExecutionResult, NewTestCase, Report,
        ReportFormat, Task, TaskStatus, TestCase,
    },
    report::{ReportRenderer, build_context, summarize},
    utils::{generate_id, now_utc, sanitize_string},
};

/// Which cases an execution covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionScope {
    /// Cases without a verdict
    #[default]
    Pending,
    /// Every case, producing new results for ones that already ran
    All,
}

/// Options for [`Orchestrator::execute_tests`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    pub scope: ExecutionScope,
    /// Per-exec timeout; the engine default applies when unset
    pub timeout: Option<Duration>,
}

/// Handle on a running execution
#[derive(Debug)]
pub struct ExecutionTicket {
    pub task_id: String,
    pub cases_total: usize,
    join: JoinHandle<AppResult<Task>>,
}

impl ExecutionTicket {
    /// Wait for the execution and return the task in its final state
    pub async fn wait(self) -> AppResult<Task> {
        self.join.await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!("execution of {} aborted: {}", self.task_id, e))
        })?
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// What startup recovery did
#[derive(Debug, Default)]
pub struct ResumeSummary {
    pub failed_analyses: Vec<String>,
    pub reprovisioned: Vec<String>,
    pub resumed: Vec<ExecutionTicket>,
}

/// Workflow orchestrator
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn TaskStore>,
    engine: Arc<ContainerEngine>,
    analyzer: Arc<dyn RequirementAnalyzer>,
    renderer: Arc<dyn ReportRenderer>,
    scheduler: Scheduler,
    locks: Arc<TaskLocks>,
    cancels: CancelRegistry,
    report_dir: PathBuf,
    default_format: ReportFormat,
}

fn invalid_state(task: &Task, operation: &'static str) -> AppError {
    AppError::InvalidState {
        task_id: task.id.clone(),
        status: task.status,
        operation,
    }
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        engine: Arc<ContainerEngine>,
        analyzer: Arc<dyn RequirementAnalyzer>,
        renderer: Arc<dyn ReportRenderer>,
        report: &ReportConfig,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(store.clone(), engine.clone()),
            store,
            engine,
            analyzer,
            renderer,
            locks: Arc::new(TaskLocks::new()),
            cancels: CancelRegistry::new(),
            report_dir: report.output_dir.clone(),
            default_format: report.default_format,
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_task(&self, task_id: &str) -> AppResult<Task> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| AppError::TaskNotFound(task_id.to_string()))
    }

    pub async fn list_tasks(&self) -> AppResult<Vec<Task>> {
        self.store.list_tasks().await
    }

    pub async fn list_test_cases(&self, task_id: &str) -> AppResult<Vec<TestCase>> {
        self.get_task(task_id).await?;
        self.store.list_test_cases(task_id).await
    }

    pub async fn get_test_case(&self, case_id: &str) -> AppResult<TestCase> {
        self.store
            .get_test_case(case_id)
            .await?
            .ok_or_else(|| AppError::CaseNotFound(case_id.to_string()))
    }

    pub async fn list_results(&self, case_id: &str) -> AppResult<Vec<ExecutionResult>> {
        self.get_test_case(case_id).await?;
        self.store.list_results(case_id).await
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Store a requirement document
    pub async fn create_document(&self, source_text: &str) -> AppResult<Document> {
        let source_text = sanitize_string(source_text);
        if source_text.is_empty() {
            return Err(AppError::Validation("document text is empty".to_string()));
        }
        if source_text.len() > MAX_DOCUMENT_BYTES {
            return Err(AppError::Validation(format!(
                "document exceeds {} bytes",
                MAX_DOCUMENT_BYTES
            )));
        }

        let bytes = source_text.len();
        let document = self
            .store
            .insert_document(&Document {
                id: generate_id(id_prefixes::DOCUMENT),
                source_text,
                created_at: now_utc(),
            })
            .await?;

        tracing::info!(document_id = %document.id, bytes, "Document created");
        Ok(document)
    }

    /// Create a task in `created`
    pub async fn create_task(&self, request: CreateTaskRequest) -> AppResult<Task> {
        request.validate()?;

        if let Some(document_id) = &request.document_id {
            if self.store.get_document(document_id).await?.is_none() {
                return Err(AppError::DocumentNotFound(document_id.clone()));
            }
        }

        let now = now_utc();
        let task = self
            .store
            .insert_task(&Task {
                id: generate_id(id_prefixes::TASK),
                document_id: request.document_id,
                algorithm_image: request.algorithm_image,
                dataset_ref: request.dataset_ref,
                container_handle: None,
                status: TaskStatus::Created,
                failed_stage: None,
                error_log: Vec::new(),
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(task_id = %task.id, image = %task.algorithm_image, "Task created");
        Ok(task)
    }

    // ------------------------------------------------------------------
    // State helpers
    // ------------------------------------------------------------------

    async fn move_task(
        &self,
        task_id: &str,
        from: &[TaskStatus],
        to: TaskStatus,
        operation: &'static str,
    ) -> AppResult<Task> {
        if let Some(&illegal) = from.iter().find(|status| !status.can_move_to(to)) {
            return Err(AppError::InvalidState {
                task_id: task_id.to_string(),
                status: illegal,
                operation,
            });
        }

        match self.store.transition_task(task_id, from, to).await? {
            Some(task) => {
                tracing::info!(task_id, status = %to, "Task status changed");
                Ok(task)
            }
            None => {
                let current = self.get_task(task_id).await?;
                Err(invalid_state(&current, operation))
            }
        }
    }

    /// Leave `stage` for `to`. A failed write fails the task instead of
    /// leaving it in `stage`.
    async fn complete_stage(
        &self,
        task_id: &str,
        stage: TaskStatus,
        to: TaskStatus,
        operation: &'static str,
    ) -> AppResult<Task> {
        match self.move_task(task_id, &[stage], to, operation).await {
            Ok(task) => Ok(task),
            Err(e) => {
                self.record_failure(task_id, stage, &e).await;
                Err(e)
            }
        }
    }

    /// [`Self::fail_stage`] on a path that already returns `error`
    async fn record_failure(&self, task_id: &str, stage: TaskStatus, error: &AppError) {
        if let Err(e) = self.fail_stage(task_id, stage, error).await {
            tracing::error!(task_id, stage = %stage, error = %e, "Could not record stage failure");
        }
    }

    /// Record `error` and move the task from `stage` to `failed`
    async fn fail_stage(&self, task_id: &str, stage: TaskStatus, error: &AppError) -> AppResult<()> {
        let entry = error.log_entry();
        match self
            .store
            .fail_task(task_id, &[stage], stage, &entry)
            .await?
        {
            Some(_) => {
                tracing::error!(task_id, stage = %stage, error = %entry, "Task failed");
            }
            None => {
                // Status moved on; keep the history complete anyway
                self.store.append_task_error(task_id, &entry).await?;
                tracing::warn!(task_id, stage = %stage, error = %entry, "Stage failed after task left it");
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------

    /// Generate and persist test cases. Re-analysis appends new cases.
    pub async fn start_analysis(&self, task_id: &str) -> AppResult<Vec<TestCase>> {
        let _lock = self.locks.lock(task_id).await;
        let task = self.get_task(task_id).await?;

        if !task.status.can_transition_to(TaskStatus::Analyzing) {
            return Err(invalid_state(&task, "start analysis"));
        }

        let cancel = self.cancels.register(task_id);
        let task = self
            .move_task(task_id, &[task.status], TaskStatus::Analyzing, "start analysis")
            .await?;

        let mut run = AnalysisRun::new(task_id);
        while !run.step.is_final() {
            self.analysis_step(&task, &mut run, &cancel).await;
        }

        match run.step {
            AnalysisStep::Done => {
                self.complete_stage(
                    task_id,
                    TaskStatus::Analyzing,
                    TaskStatus::Analyzed,
                    "finish analysis",
                )
                .await?;
                tracing::info!(task_id, cases = run.cases.len(), "Analysis finished");
                Ok(run.cases)
            }
            _ => {
                let error = run.error.take().unwrap_or_else(|| {
                    AppError::AnalyzerFailure("analysis ended without a result".to_string())
                });
                self.record_failure(task_id, TaskStatus::Analyzing, &error).await;
                Err(error)
            }
        }
    }

    async fn analysis_step(&self, task: &Task, run: &mut AnalysisRun, cancel: &CancelGuard) {
        match run.step {
            AnalysisStep::LoadDocument => match self.load_document(task).await {
                Ok(text) => {
                    run.document_text = Some(text);
                    run.advance();
                }
                Err(e) => run.fail(e),
            },
            AnalysisStep::Generate => {
                let text = run.document_text.clone().unwrap_or_default();
                let generated = tokio::select! {
                    result = self.analyzer.analyze(&text) => result,
                    _ = cancel.token().cancelled() => Err(AppError::Cancelled),
                };
                match generated {
                    Ok(specs) if specs.is_empty() => run.fail(AppError::AnalyzerFailure(
                        "analyzer returned no test cases".to_string(),
                    )),
                    Ok(specs) => {
                        tracing::debug!(task_id = %task.id, specs = specs.len(), "Analyzer returned specs");
                        run.specs = specs;
                        run.advance();
                    }
                    Err(AppError::Cancelled) => run.fail(AppError::Cancelled),
                    Err(e @ AppError::AnalyzerFailure(_)) => run.fail(e),
                    Err(e) => run.fail(AppError::AnalyzerFailure(e.to_string())),
                }
            }
            AnalysisStep::Persist => {
                if cancel.is_cancelled() {
                    run.fail(AppError::Cancelled);
                    return;
                }
                let cases: Vec<NewTestCase> = run
                    .specs
                    .iter()
                    .map(|spec| NewTestCase {
                        id: generate_id(id_prefixes::CASE),
                        task_id: task.id.clone(),
                        name: spec.name.clone(),
                        purpose: spec.purpose.clone(),
                        steps: spec.steps.clone(),
                        expected_result: spec.expected_result.clone(),
                        validation_method: spec.validation_method.clone(),
                        test_data_ref: spec.test_data_ref.clone(),
                        parameters: spec.parameters.clone(),
                    })
                    .collect();

                match self.store.insert_test_cases(&cases).await {
                    Ok(created) => {
                        run.cases = created;
                        run.advance();
                    }
                    Err(e) => run.fail(e),
                }
            }
            AnalysisStep::Done | AnalysisStep::Failed => {}
        }
    }

    async fn load_document(&self, task: &Task) -> AppResult<String> {
        let document_id = task.document_id.as_deref().ok_or_else(|| {
            AppError::DocumentNotFound(format!("task {} has no document", task.id))
        })?;
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound(document_id.to_string()))?;
        Ok(document.source_text)
    }

    // ------------------------------------------------------------------
    // Environment
    // ------------------------------------------------------------------

    /// Provision the task's container and record its handle
    pub async fn prepare_environment(&self, task_id: &str) -> AppResult<String> {
        let _lock = self.locks.lock(task_id).await;
        let task = self.get_task(task_id).await?;

        if !task.has_execution_inputs() {
            return Err(AppError::Validation(
                "algorithm_image and dataset_ref are required".to_string(),
            ));
        }
        let allowed =
            task.status.can_transition_to(TaskStatus::Preparing) || task.can_retry_preparation();
        if !allowed {
            return Err(invalid_state(&task, "prepare environment"));
        }

        let cancel = self.cancels.register(task_id);
        self.move_task(
            task_id,
            &[task.status],
            TaskStatus::Preparing,
            "prepare environment",
        )
        .await?;

        let provisioned = self
            .engine
            .provision(&task.id, &task.algorithm_image, &task.dataset_ref)
            .await;

        let handle = match provisioned {
            Ok(handle) => handle,
            Err(e) => {
                self.record_failure(task_id, TaskStatus::Preparing, &e).await;
                return Err(e);
            }
        };

        if let Err(e) = self.store.set_container_handle(task_id, Some(&handle)).await {
            self.record_failure(task_id, TaskStatus::Preparing, &e).await;
            return Err(e);
        }

        if cancel.is_cancelled() {
            let error = AppError::Cancelled;
            self.record_failure(task_id, TaskStatus::Preparing, &error).await;
            return Err(error);
        }

        tracing::info!(task_id, container = %handle, "Environment ready");
        Ok(handle)
    }

    /// Tear down the task's container and clear its handle
    pub async fn release_environment(&self, task_id: &str) -> AppResult<()> {
        if self.get_task(task_id).await?.status == TaskStatus::Executing {
            return Err(AppError::AlreadyExecuting(task_id.to_string()));
        }
        let _lock = self.locks.lock(task_id).await;
        let task = self.get_task(task_id).await?;
        if task.status == TaskStatus::Executing {
            return Err(AppError::AlreadyExecuting(task_id.to_string()));
        }

        if let Some(handle) = &task.container_handle {
            self.engine.teardown(handle).await?;
            self.store.set_container_handle(task_id, None).await?;
            tracing::info!(task_id, container = %handle, "Environment released");
        }
        Ok(())
    }

    async fn live_handle(&self, task: &Task) -> AppResult<String> {
        let handle = task
            .container_handle
            .clone()
            .ok_or_else(|| AppError::NotPrepared(task.id.clone()))?;
        if !self.engine.is_running(&handle).await? {
            return Err(AppError::NotPrepared(task.id.clone()));
        }
        Ok(handle)
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Start executing the task's cases in the background
    pub async fn execute_tests(
        &self,
        task_id: &str,
        options: ExecuteOptions,
    ) -> AppResult<ExecutionTicket> {
        // An execution holds the task lock until it finishes
        if self.get_task(task_id).await?.status == TaskStatus::Executing {
            return Err(AppError::AlreadyExecuting(task_id.to_string()));
        }

        let guard = self.locks.lock(task_id).await;
        let task = self.get_task(task_id).await?;

        if task.status == TaskStatus::Executing {
            return Err(AppError::AlreadyExecuting(task_id.to_string()));
        }
        if !task.status.can_transition_to(TaskStatus::Executing) {
            return Err(invalid_state(&task, "execute tests"));
        }
        let handle = self.live_handle(&task).await?;

        let cancel = self.cancels.register(task_id);
        let task = self
            .move_task(task_id, &[task.status], TaskStatus::Executing, "execute tests")
            .await?;

        self.spawn_execution(task, handle, options, guard, cancel)
            .await
    }

    /// Reset interrupted cases, pick the cases in scope and spawn the scheduler
    async fn spawn_execution(
        &self,
        task: Task,
        handle: String,
        options: ExecuteOptions,
        guard: OwnedMutexGuard<()>,
        cancel: CancelGuard,
    ) -> AppResult<ExecutionTicket> {
        let cases = match self.cases_in_scope(&task.id, options.scope).await {
            Ok(cases) => cases,
            Err(e) => {
                self.record_failure(&task.id, TaskStatus::Executing, &e).await;
                return Err(e);
            }
        };

        let task_id = task.id.clone();
        let cases_total = cases.len();
        tracing::info!(task_id = %task_id, cases = cases_total, container = %handle, "Execution started");

        let this = self.clone();
        let join = tokio::spawn(async move {
            let _guard = guard;
            let outcome = this
                .scheduler
                .run_all(cases, &handle, options.timeout, cancel.token())
                .await;
            this.finish_execution(&task.id, outcome, &cancel).await
        });

        Ok(ExecutionTicket {
            task_id,
            cases_total,
            join,
        })
    }

    async fn cases_in_scope(&self, task_id: &str, scope: ExecutionScope) -> AppResult<Vec<TestCase>> {
        let reset = self.store.reset_interrupted_cases(task_id).await?;
        if reset > 0 {
            tracing::info!(task_id, reset, "Reset interrupted cases to pending");
        }

        let cases = self.store.list_test_cases(task_id).await?;
        Ok(match scope {
            ExecutionScope::All => cases,
            ExecutionScope::Pending => cases
                .into_iter()
                .filter(|c| c.status == CaseStatus::Pending)
                .collect(),
        })
    }

    async fn finish_execution(
        &self,
        task_id: &str,
        outcome: AppResult<RunTotals>,
        cancel: &CancelGuard,
    ) -> AppResult<Task> {
        let outcome = match outcome {
            Ok(_) if cancel.is_cancelled() => Err(AppError::Cancelled),
            other => other,
        };

        match outcome {
            Ok(totals) => {
                let task = self
                    .complete_stage(
                        task_id,
                        TaskStatus::Executing,
                        TaskStatus::Completed,
                        "complete execution",
                    )
                    .await?;
                tracing::info!(
                    task_id,
                    executed = totals.executed,
                    passed = totals.passed,
                    failed = totals.failed,
                    "Execution completed"
                );
                Ok(task)
            }
            Err(error) => {
                self.record_failure(task_id, TaskStatus::Executing, &error).await;
                Err(error)
            }
        }
    }

    /// Execute one case without touching the task status or other cases
    pub async fn execute_single(
        &self,
        case_id: &str,
        timeout: Option<Duration>,
    ) -> AppResult<ExecutionResult> {
        let case = self.get_test_case(case_id).await?;
        if self.get_task(&case.task_id).await?.status == TaskStatus::Executing {
            return Err(AppError::AlreadyExecuting(case.task_id));
        }

        let _lock = self.locks.lock(&case.task_id).await;
        let task = self.get_task(&case.task_id).await?;
        match task.status {
            TaskStatus::Executing => return Err(AppError::AlreadyExecuting(task.id)),
            TaskStatus::Created | TaskStatus::Analyzing => {
                return Err(invalid_state(&task, "execute single case"));
            }
            _ => {}
        }
        let handle = self.live_handle(&task).await?;
        let case = self.get_test_case(case_id).await?;

        match self.scheduler.run_case(case, &handle, timeout).await {
            Ok(result) => Ok(result),
            Err(e) => {
                self.store.append_task_error(&task.id, &e.log_entry()).await?;
                Err(e)
            }
        }
    }

    /// Signal the task's in-flight operation to stop
    pub async fn cancel(&self, task_id: &str) -> AppResult<()> {
        self.get_task(task_id).await?;
        if !self.cancels.cancel(task_id) {
            return Err(AppError::NotCancellable(task_id.to_string()));
        }
        tracing::info!(task_id, "Cancellation requested");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------

    /// Recompute, render and store the task's report
    pub async fn generate_report(
        &self,
        task_id: &str,
        format: Option<ReportFormat>,
    ) -> AppResult<Report> {
        let task = self.get_task(task_id).await?;
        let format = format.unwrap_or(self.default_format);
        let context = build_context(self.store.as_ref(), &task).await?;

        let rendered_path = match self.write_report(&task, &context, format).await {
            Ok(path) => Some(path.display().to_string()),
            Err(e) => {
                tracing::warn!(task_id, error = %e, "Report rendering failed");
                self.store.append_task_error(task_id, &e.log_entry()).await?;
                None
            }
        };

        let report = self
            .store
            .upsert_report(&Report {
                task_id: task.id.clone(),
                summary: context.summary,
                generated_at: context.generated_at,
                rendered_path,
                format: Some(format),
            })
            .await?;

        tracing::info!(
            task_id,
            total = report.summary.total,
            passed = report.summary.passed,
            success_rate = report.summary.success_rate,
            "Report generated"
        );
        Ok(report)
    }

    async fn write_report(
        &self,
        task: &Task,
        context: &crate::report::ReportContext,
        format: ReportFormat,
    ) -> AppResult<PathBuf> {
        let bytes = self.renderer.render(context, format)?;
        tokio::fs::create_dir_all(&self.report_dir).await?;
        let path = self
            .report_dir
            .join(format!("{}.{}", task.id, format.extension()));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Current summary, keeping the last rendered artifact
    pub async fn get_report(&self, task_id: &str) -> AppResult<Report> {
        let task = self.get_task(task_id).await?;
        let cases = self.store.list_test_cases(&task.id).await?;
        let stored = self.store.get_report(&task.id).await?;

        Ok(Report {
            task_id: task.id,
            summary: summarize(&cases),
            generated_at: now_utc(),
            rendered_path: stored.as_ref().and_then(|r| r.rendered_path.clone()),
            format: stored.and_then(|r| r.format),
        })
    }

    // ------------------------------------------------------------------
    // Automation and recovery
    // ------------------------------------------------------------------

    /// Analyze if needed, prepare, execute, wait and report
    pub async fn run_pipeline(&self, task_id: &str) -> AppResult<Report> {
        if self.get_task(task_id).await?.status == TaskStatus::Created {
            self.start_analysis(task_id).await?;
        }

        self.prepare_environment(task_id).await?;
        let ticket = self
            .execute_tests(task_id, ExecuteOptions::default())
            .await?;
        ticket.wait().await?;

        self.generate_report(task_id, None).await
    }

    /// Pick up tasks a previous process left in flight
    pub async fn resume_interrupted(&self) -> AppResult<ResumeSummary> {
        let mut summary = ResumeSummary::default();
        let stages: Vec<TaskStatus> = TaskStatus::ALL
            .into_iter()
            .filter(TaskStatus::is_in_flight)
            .collect();
        let in_flight = self.store.list_tasks_with_status(&stages).await?;

        for task in in_flight {
            match task.status {
                TaskStatus::Analyzing => {
                    let error = AppError::Interrupted("analysis did not finish".to_string());
                    self.fail_stage(&task.id, TaskStatus::Analyzing, &error).await?;
                    summary.failed_analyses.push(task.id);
                }
                TaskStatus::Preparing => match self.prepare_environment(&task.id).await {
                    Ok(_) => summary.reprovisioned.push(task.id),
                    Err(e) => tracing::warn!(task_id = %task.id, error = %e, "Re-provisioning failed"),
                },
                TaskStatus::Executing => match self.resume_execution(&task.id).await {
                    Ok(ticket) => summary.resumed.push(ticket),
                    Err(e) => tracing::warn!(task_id = %task.id, error = %e, "Execution not resumed"),
                },
                _ => {}
            }
        }

        tracing::info!(
            failed_analyses = summary.failed_analyses.len(),
            reprovisioned = summary.reprovisioned.len(),
            resumed = summary.resumed.len(),
            "Recovery finished"
        );
        Ok(summary)
    }

    async fn resume_execution(&self, task_id: &str) -> AppResult<ExecutionTicket> {
        let guard = self.locks.lock(task_id).await;
        let task = self.get_task(task_id).await?;
        if task.status != TaskStatus::Executing {
            return Err(invalid_state(&task, "resume execution"));
        }

        let handle = match self.live_handle(&task).await {
            Ok(handle) => handle,
            Err(e) => {
                let error = AppError::Interrupted(format!("container lost during execution: {}", e));
                self.record_failure(task_id, TaskStatus::Executing, &error).await;
                return Err(error);
            }
        };

        let cancel = self.cancels.register(task_id);
        self.spawn_execution(task, handle, ExecuteOptions::default(), guard, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        analyzer::TestCaseSpec, config::DockerConfig, db::MemoryStore,
        engine::runtime::MockContainerRuntime, report::TemplateRenderer,
    };

    struct NoCases;

    #[async_trait]
    impl RequirementAnalyzer for NoCases {
        async fn analyze(&self, _document_text: &str) -> AppResult<Vec<TestCaseSpec>> {
            Ok(Vec::new())
        }
    }

    fn orchestrator(store: Arc<MemoryStore>) -> Orchestrator {
        let engine = ContainerEngine::new(
            Arc::new(MockContainerRuntime::new()),
            DockerConfig::default(),
        );
        Orchestrator::new(
            store,
            Arc::new(engine),
            Arc::new(NoCases),
            Arc::new(TemplateRenderer::new()),
            &ReportConfig::default(),
        )
    }

    async fn task_in(store: &MemoryStore, id: &str, status: TaskStatus) -> Task {
        let now = now_utc();
        store
            .insert_task(&Task {
                id: id.to_string(),
                document_id: None,
                algorithm_image: "algo:v1".to_string(),
                dataset_ref: "/data/ds1".to_string(),
                container_handle: None,
                status,
                failed_stage: None,
                error_log: Vec::new(),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_move_task_rejects_edges_outside_table() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(store.clone());
        task_in(&store, "TASK_1", TaskStatus::Created).await;

        let err = orchestrator
            .move_task("TASK_1", &[TaskStatus::Created], TaskStatus::Completed, "complete execution")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidState { status: TaskStatus::Created, operation: "complete execution", .. }
        ));
        assert_eq!(
            orchestrator.get_task("TASK_1").await.unwrap().status,
            TaskStatus::Created
        );

        let moved = orchestrator
            .move_task("TASK_1", &[TaskStatus::Created], TaskStatus::Analyzing, "start analysis")
            .await
            .unwrap();
        assert_eq!(moved.status, TaskStatus::Analyzing);
    }

    #[tokio::test]
    async fn test_move_task_checks_every_source_state() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(store.clone());
        task_in(&store, "TASK_1", TaskStatus::Analyzed).await;

        let err = orchestrator
            .move_task(
                "TASK_1",
                &[TaskStatus::Analyzed, TaskStatus::Executing],
                TaskStatus::Analyzing,
                "start analysis",
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidState { status: TaskStatus::Executing, .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_task_only_moves_back_to_preparing() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(store.clone());
        task_in(&store, "TASK_1", TaskStatus::Failed).await;

        let err = orchestrator
            .move_task("TASK_1", &[TaskStatus::Failed], TaskStatus::Executing, "execute tests")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState { status: TaskStatus::Failed, .. }));

        let retried = orchestrator
            .move_task("TASK_1", &[TaskStatus::Failed], TaskStatus::Preparing, "prepare environment")
            .await
            .unwrap();
        assert_eq!(retried.status, TaskStatus::Preparing);
    }

    #[tokio::test]
    async fn test_failed_task_without_preparing_stage_cannot_prepare() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(store.clone());
        task_in(&store, "TASK_1", TaskStatus::Failed).await;

        let err = orchestrator.prepare_environment("TASK_1").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState { status: TaskStatus::Failed, .. }));
    }
}
