//! Pipeline worker - consumes the job queue

use std::{sync::Arc, time::Duration};

use redis::{AsyncCommands, aio::ConnectionManager};
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;

use super::PipelineJob;
use crate::{
    config::{PipelineConfig, RedisConfig},
    error::AppResult,
    pipeline::{ExecuteOptions, ExecutionScope, Orchestrator},
    utils::{format_duration, now_utc},
};

/// Maps jobs onto orchestrator operations
#[derive(Clone)]
pub struct JobHandler {
    orchestrator: Orchestrator,
    auto_advance: bool,
}

impl JobHandler {
    pub fn new(orchestrator: Orchestrator, auto_advance: bool) -> Self {
        Self {
            orchestrator,
            auto_advance,
        }
    }

    /// Run one job to completion.
    ///
    /// With auto-advance, a finished analysis continues through prepare,
    /// execute and report, and a finished execution is reported.
    pub async fn handle(&self, job: PipelineJob) -> AppResult<()> {
        match job {
            PipelineJob::Analyze { task_id } => {
                self.orchestrator.start_analysis(&task_id).await?;
                if self.auto_advance {
                    self.orchestrator.run_pipeline(&task_id).await?;
                }
            }
            PipelineJob::Prepare { task_id } => {
                self.orchestrator.prepare_environment(&task_id).await?;
            }
            PipelineJob::Execute {
                task_id,
                all,
                timeout_secs,
            } => {
                let options = ExecuteOptions {
                    scope: if all {
                        ExecutionScope::All
                    } else {
                        ExecutionScope::Pending
                    },
                    timeout: timeout_secs.map(Duration::from_secs),
                };
                let ticket = self.orchestrator.execute_tests(&task_id, options).await?;
                ticket.wait().await?;
                if self.auto_advance {
                    self.orchestrator.generate_report(&task_id, None).await?;
                }
            }
            PipelineJob::ExecuteSingle {
                case_id,
                timeout_secs,
            } => {
                self.orchestrator
                    .execute_single(&case_id, timeout_secs.map(Duration::from_secs))
                    .await?;
            }
            PipelineJob::Report { task_id, format } => {
                self.orchestrator.generate_report(&task_id, format).await?;
            }
            PipelineJob::RunPipeline { task_id } => {
                self.orchestrator.run_pipeline(&task_id).await?;
            }
            PipelineJob::Cancel { task_id } => {
                self.orchestrator.cancel(&task_id).await?;
            }
        }
        Ok(())
    }

    /// Start a job without waiting for it.
    ///
    /// Cancel jobs run inline so they reach a running job even when every
    /// permit is taken. Other jobs are spawned into `jobs` and wait for a
    /// permit before running.
    pub async fn submit(&self, job: PipelineJob, jobs: &mut JoinSet<()>, permits: &Arc<Semaphore>) {
        if matches!(job, PipelineJob::Cancel { .. }) {
            self.run_logged(job).await;
            return;
        }
        let handler = self.clone();
        let permits = Arc::clone(permits);
        jobs.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            handler.run_logged(job).await;
        });
    }

    async fn run_logged(&self, job: PipelineJob) {
        let kind = job.kind();
        let started = now_utc();
        tracing::info!(job = kind, "Processing job");
        match self.handle(job).await {
            Ok(()) => tracing::info!(
                job = kind,
                elapsed = %format_duration(now_utc() - started),
                "Job finished"
            ),
            Err(e) => {
                tracing::error!(job = kind, code = e.error_code(), error = %e, "Job failed")
            }
        }
    }
}

/// Pipeline worker that processes the job queue
pub struct PipelineWorker {
    handler: JobHandler,
    redis: ConnectionManager,
    queue: String,
    poll_timeout: f64,
    max_concurrent_jobs: usize,
}

impl PipelineWorker {
    pub fn new(
        orchestrator: Orchestrator,
        redis: ConnectionManager,
        redis_config: &RedisConfig,
        pipeline: &PipelineConfig,
    ) -> Self {
        Self {
            handler: JobHandler::new(orchestrator, pipeline.auto_advance),
            redis,
            queue: redis_config.queue_name.clone(),
            poll_timeout: redis_config.poll_timeout_secs,
            max_concurrent_jobs: pipeline.max_concurrent_jobs,
        }
    }

    /// Process the queue until `shutdown` fires.
    ///
    /// At most `max_concurrent_jobs` jobs run at once. Jobs still running at
    /// shutdown are aborted.
    pub async fn run(mut self, shutdown: CancellationToken) -> AppResult<()> {
        tracing::info!(
            queue = %self.queue,
            concurrency = self.max_concurrent_jobs,
            "Starting pipeline worker"
        );
        let permits = Arc::new(Semaphore::new(self.max_concurrent_jobs));
        let mut jobs = JoinSet::new();

        loop {
            while let Some(finished) = jobs.try_join_next() {
                if let Err(e) = finished {
                    tracing::error!(error = %e, "Job task panicked");
                }
            }

            let popped: redis::RedisResult<Option<(String, String)>> = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.redis.brpop(&self.queue, self.poll_timeout) => result,
            };

            let payload = match popped {
                Ok(Some((_, payload))) => payload,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(queue = %self.queue, error = %e, "Queue poll failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let job = match serde_json::from_str::<PipelineJob>(&payload) {
                Ok(job) => job,
                Err(e) => {
                    tracing::error!(payload = %payload, error = %e, "Invalid job in queue");
                    continue;
                }
            };

            self.handler.submit(job, &mut jobs, &permits).await;
        }

        if !jobs.is_empty() {
            tracing::warn!(running = jobs.len(), "Aborting running jobs");
        }
        jobs.shutdown().await;
        tracing::info!("Pipeline worker stopped");
        Ok(())
    }
}
