//! Report repository

use sqlx::PgPool;

use crate::{error::AppResult, models::Report};

/// Repository for report operations, one row per task
pub struct ReportRepository;

impl ReportRepository {
    /// Insert or replace the task's report
    pub async fn upsert(pool: &PgPool, report: &Report) -> AppResult<Report> {
        let row = sqlx::query_as::<_, Report>(
            r#"
            INSERT INTO reports (
                task_id, total, passed, failed, pending, success_rate,
                generated_at, rendered_path, format
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (task_id) DO UPDATE SET
                total = EXCLUDED.total,
                passed = EXCLUDED.passed,
                failed = EXCLUDED.failed,
                pending = EXCLUDED.pending,
                success_rate = EXCLUDED.success_rate,
                generated_at = EXCLUDED.generated_at,
                rendered_path = EXCLUDED.rendered_path,
                format = EXCLUDED.format
            RETURNING *
            "#,
        )
        .bind(&report.task_id)
        .bind(report.summary.total)
        .bind(report.summary.passed)
        .bind(report.summary.failed)
        .bind(report.summary.pending)
        .bind(report.summary.success_rate)
        .bind(report.generated_at)
        .bind(&report.rendered_path)
        .bind(report.format)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    /// Find the report for a task
    pub async fn find_by_task(pool: &PgPool, task_id: &str) -> AppResult<Option<Report>> {
        let row = sqlx::query_as::<_, Report>("SELECT * FROM reports WHERE task_id = $1")
            .bind(task_id)
            .fetch_optional(pool)
            .await?;

        Ok(row)
    }
}
