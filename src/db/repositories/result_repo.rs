//! Execution result repository

use sqlx::PgPool;

use crate::{
    error::AppResult,
    models::{ExecutionResult, NewExecutionResult},
};

/// Repository for execution result operations. Rows are never updated.
pub struct ResultRepository;

impl ResultRepository {
    /// Append an execution result
    pub async fn create(pool: &PgPool, result: &NewExecutionResult) -> AppResult<ExecutionResult> {
        let row = sqlx::query_as::<_, ExecutionResult>(
            r#"
            INSERT INTO execution_results (
                id, test_case_id, passed, output_summary, raw_output, exit_code, executed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&result.id)
        .bind(&result.test_case_id)
        .bind(result.passed)
        .bind(&result.output_summary)
        .bind(&result.raw_output)
        .bind(result.exit_code)
        .bind(result.executed_at)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    /// All results for a case, oldest first
    pub async fn list_by_case(pool: &PgPool, case_id: &str) -> AppResult<Vec<ExecutionResult>> {
        let rows = sqlx::query_as::<_, ExecutionResult>(
            r#"
            SELECT * FROM execution_results
            WHERE test_case_id = $1
            ORDER BY executed_at, seq
            "#,
        )
        .bind(case_id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// The latest result of every case belonging to a task
    pub async fn latest_by_task(pool: &PgPool, task_id: &str) -> AppResult<Vec<ExecutionResult>> {
        let rows = sqlx::query_as::<_, ExecutionResult>(
            r#"
            SELECT DISTINCT ON (r.test_case_id) r.*
            FROM execution_results r
            JOIN test_cases c ON c.id = r.test_case_id
            WHERE c.task_id = $1
            ORDER BY r.test_case_id, r.executed_at DESC, r.seq DESC
            "#,
        )
        .bind(task_id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }
}
