//! Test case repository

use chrono::{DateTime, Utc};
use sqlx::{PgPool, types::Json};

use crate::{
    error::AppResult,
    models::{CaseStatus, NewTestCase, TestCase},
};

/// Repository for test case database operations
pub struct TestCaseRepository;

impl TestCaseRepository {
    /// Insert a batch of cases in one transaction. Either all rows land or none do.
    pub async fn create_many(pool: &PgPool, cases: &[NewTestCase]) -> AppResult<Vec<TestCase>> {
        let mut tx = pool.begin().await?;
        let mut created = Vec::with_capacity(cases.len());

        for case in cases {
            let row = sqlx::query_as::<_, TestCase>(
                r#"
                INSERT INTO test_cases (
                    id, task_id, name, purpose, steps, expected_result,
                    validation_method, test_data_ref, parameters
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING *
                "#,
            )
            .bind(&case.id)
            .bind(&case.task_id)
            .bind(&case.name)
            .bind(&case.purpose)
            .bind(&case.steps)
            .bind(&case.expected_result)
            .bind(&case.validation_method)
            .bind(&case.test_data_ref)
            .bind(Json(&case.parameters))
            .fetch_one(&mut *tx)
            .await?;

            created.push(row);
        }

        tx.commit().await?;
        Ok(created)
    }

    /// Find test case by ID
    pub async fn find_by_id(pool: &PgPool, id: &str) -> AppResult<Option<TestCase>> {
        let case = sqlx::query_as::<_, TestCase>("SELECT * FROM test_cases WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(case)
    }

    /// List a task's cases in creation order
    pub async fn list_by_task(pool: &PgPool, task_id: &str) -> AppResult<Vec<TestCase>> {
        let cases = sqlx::query_as::<_, TestCase>(
            "SELECT * FROM test_cases WHERE task_id = $1 ORDER BY created_at, seq",
        )
        .bind(task_id)
        .fetch_all(pool)
        .await?;

        Ok(cases)
    }

    /// Update case status only
    pub async fn update_status(pool: &PgPool, id: &str, status: CaseStatus) -> AppResult<bool> {
        let result = sqlx::query("UPDATE test_cases SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a verdict on the case
    pub async fn finish(
        pool: &PgPool,
        id: &str,
        status: CaseStatus,
        actual_output: &str,
        executed_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE test_cases
            SET status = $2, actual_output = $3, last_executed = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(actual_output)
        .bind(executed_at)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Reset cases left `executing` by an interrupted run back to `pending`
    pub async fn reset_executing(pool: &PgPool, task_id: &str) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE test_cases SET status = 'pending' WHERE task_id = $1 AND status = 'executing'",
        )
        .bind(task_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}
