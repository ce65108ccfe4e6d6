//! Test case scheduler
//!
//! Runs a task's cases one at a time against its container. Case N+1 starts
//! only after case N's verdict and result are persisted. Exec failures and
//! bad steps fail the case; store failures abort the whole run.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use super::{
    command::{CommandContext, build_command},
    stages::{CaseRun, CaseStep},
    validation,
};
use crate::{
    constants::{MAX_ACTUAL_OUTPUT_BYTES, id_prefixes},
    db::TaskStore,
    engine::ContainerEngine,
    error::{AppError, AppResult},
    models::{CaseStatus, ExecutionResult, NewExecutionResult, TestCase},
    utils::{generate_id, now_utc, truncate_utf8},
};

/// Counts for one scheduler run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub executed: usize,
    pub passed: usize,
    pub failed: usize,
}

/// Sequential case runner
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    engine: Arc<ContainerEngine>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn TaskStore>, engine: Arc<ContainerEngine>) -> Self {
        Self { store, engine }
    }

    /// Execute one case through every step and return the stored result
    pub async fn run_case(
        &self,
        case: TestCase,
        handle: &str,
        timeout: Option<Duration>,
    ) -> AppResult<ExecutionResult> {
        let mut run = CaseRun::new(case);

        loop {
            match run.step {
                CaseStep::Start => {
                    self.store
                        .set_case_status(&run.case.id, CaseStatus::Executing)
                        .await?;
                    tracing::debug!(
                        case_id = %run.case.id,
                        name = %run.case.name,
                        steps = %run.case.steps_preview(80),
                        "Case started"
                    );
                    run.advance();
                }
                CaseStep::BuildCommand => {
                    let ctx = CommandContext {
                        task_id: &run.case.task_id,
                        dataset: self.engine.dataset_mount_point(),
                    };
                    match build_command(&run.case, &ctx) {
                        Ok(command) => {
                            run.command = Some(command);
                            run.advance();
                        }
                        Err(e) => run.fail(e),
                    }
                }
                CaseStep::Execute => {
                    let command = run.command.clone().unwrap_or_default();
                    match self.engine.exec(handle, &command, timeout).await {
                        Ok(output) => {
                            run.output = Some(output);
                            run.advance();
                        }
                        Err(e) => {
                            tracing::warn!(case_id = %run.case.id, error = %e, "Case execution failed");
                            run.fail(e);
                        }
                    }
                }
                CaseStep::Validate => {
                    if let Some(output) = &run.output {
                        run.verdict =
                            Some(validation::evaluate(&run.case.validation_method, output));
                    }
                    run.advance();
                }
                CaseStep::Save => {
                    let result = self.save(&run).await?;
                    run.result = Some(result);
                    run.advance();
                }
                CaseStep::Done => break,
            }
        }

        run.result
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("case run ended without a result")))
    }

    async fn save(&self, run: &CaseRun) -> AppResult<ExecutionResult> {
        let (passed, output_summary) = run.outcome();
        let raw_output = run
            .output
            .as_ref()
            .map(|o| o.combined())
            .unwrap_or_default();
        let executed_at = now_utc();

        let result = self
            .store
            .insert_result(&NewExecutionResult {
                id: generate_id(id_prefixes::RESULT),
                test_case_id: run.case.id.clone(),
                passed,
                output_summary,
                raw_output: raw_output.clone(),
                exit_code: run.output.as_ref().map(|o| o.exit_code),
                executed_at,
            })
            .await?;

        self.store
            .finish_case(
                &run.case.id,
                CaseStatus::from_verdict(passed),
                truncate_utf8(&raw_output, MAX_ACTUAL_OUTPUT_BYTES),
                executed_at,
            )
            .await?;

        tracing::info!(
            task_id = %run.case.task_id,
            case_id = %run.case.id,
            passed,
            summary = %result.output_summary,
            "Case finished"
        );

        Ok(result)
    }

    /// Run `cases` in order, checking `cancel` before each one
    pub async fn run_all(
        &self,
        cases: Vec<TestCase>,
        handle: &str,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> AppResult<RunTotals> {
        let mut totals = RunTotals::default();

        for case in cases {
            if cancel.is_cancelled() {
                tracing::info!(
                    task_id = %case.task_id,
                    executed = totals.executed,
                    "Cancellation observed, stopping scheduler"
                );
                return Err(AppError::Cancelled);
            }

            let result = self.run_case(case, handle, timeout).await?;
            totals.executed += 1;
            if result.passed {
                totals.passed += 1;
            } else {
                totals.failed += 1;
            }
        }

        Ok(totals)
    }
}
