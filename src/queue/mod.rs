//! Redis-backed pipeline job queue
//!
//! Producers push JSON-encoded [`PipelineJob`]s with `LPUSH`; the
//! [`PipelineWorker`] pops them with `BRPOP` and drives the orchestrator.

pub mod worker;

use redis::{AsyncCommands, aio::ConnectionManager};
use serde::{Deserialize, Serialize};

use crate::{error::AppResult, models::ReportFormat};

pub use worker::{JobHandler, PipelineWorker};

/// A unit of work for the pipeline worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum PipelineJob {
    Analyze {
        task_id: String,
    },
    Prepare {
        task_id: String,
    },
    Execute {
        task_id: String,
        /// Re-run every case instead of only pending ones
        #[serde(default)]
        all: bool,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    ExecuteSingle {
        case_id: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    Report {
        task_id: String,
        #[serde(default)]
        format: Option<ReportFormat>,
    },
    RunPipeline {
        task_id: String,
    },
    /// Stop the task's in-flight operation
    Cancel {
        task_id: String,
    },
}

impl PipelineJob {
    /// Job kind, as it appears in the `job` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Analyze { .. } => "analyze",
            Self::Prepare { .. } => "prepare",
            Self::Execute { .. } => "execute",
            Self::ExecuteSingle { .. } => "execute_single",
            Self::Report { .. } => "report",
            Self::RunPipeline { .. } => "run_pipeline",
            Self::Cancel { .. } => "cancel",
        }
    }
}

/// Push a job onto `queue`
pub async fn enqueue(redis: &mut ConnectionManager, queue: &str, job: &PipelineJob) -> AppResult<()> {
    let payload = serde_json::to_string(job)?;
    redis.lpush::<_, _, ()>(queue, payload).await?;
    tracing::debug!(queue, job = job.kind(), "Job enqueued");
    Ok(())
}
