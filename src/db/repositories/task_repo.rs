//! Task repository

use sqlx::PgPool;

use crate::{
    error::AppResult,
    models::{Task, TaskStatus},
};

fn status_names(statuses: &[TaskStatus]) -> Vec<&'static str> {
    statuses.iter().map(TaskStatus::as_str).collect()
}

/// Repository for task database operations
pub struct TaskRepository;

impl TaskRepository {
    /// Create a new task
    pub async fn create(pool: &PgPool, task: &Task) -> AppResult<Task> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (
                id, document_id, algorithm_image, dataset_ref, container_handle,
                status, failed_stage, error_log, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(&task.id)
        .bind(&task.document_id)
        .bind(&task.algorithm_image)
        .bind(&task.dataset_ref)
        .bind(&task.container_handle)
        .bind(task.status)
        .bind(task.failed_stage)
        .bind(&task.error_log)
        .bind(task.created_at)
        .bind(task.updated_at)
        .fetch_one(pool)
        .await?;

        Ok(task)
    }

    /// Find task by ID
    pub async fn find_by_id(pool: &PgPool, id: &str) -> AppResult<Option<Task>> {
        let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(task)
    }

    /// List all tasks, oldest first
    pub async fn list(pool: &PgPool) -> AppResult<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>("SELECT * FROM tasks ORDER BY created_at, id")
            .fetch_all(pool)
            .await?;

        Ok(tasks)
    }

    /// List tasks currently in any of the given states
    pub async fn list_by_status(pool: &PgPool, statuses: &[TaskStatus]) -> AppResult<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(
            "SELECT * FROM tasks WHERE status = ANY($1) ORDER BY created_at, id",
        )
        .bind(status_names(statuses))
        .fetch_all(pool)
        .await?;

        Ok(tasks)
    }

    /// Compare-and-swap status update. Returns `None` when the task is not in `from`.
    pub async fn transition(
        pool: &PgPool,
        id: &str,
        from: &[TaskStatus],
        to: TaskStatus,
    ) -> AppResult<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(to)
        .bind(status_names(from))
        .fetch_optional(pool)
        .await?;

        Ok(task)
    }

    /// Move to `failed`, recording the stage and appending to the error log in one statement
    pub async fn fail(
        pool: &PgPool,
        id: &str,
        from: &[TaskStatus],
        stage: TaskStatus,
        entry: &str,
    ) -> AppResult<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks
            SET status = 'failed',
                failed_stage = $3,
                error_log = array_append(error_log, $4),
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status_names(from))
        .bind(stage)
        .bind(entry)
        .fetch_optional(pool)
        .await?;

        Ok(task)
    }

    /// Append an entry to the error log without touching status
    pub async fn append_error(pool: &PgPool, id: &str, entry: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET error_log = array_append(error_log, $2), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(entry)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Set or clear the container handle
    pub async fn set_container_handle(
        pool: &PgPool,
        id: &str,
        handle: Option<&str>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET container_handle = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(handle)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
