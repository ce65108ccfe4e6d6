//! Execution result model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Outcome of one execution attempt. Append-only: re-execution adds a row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub id: String,
    /// Store-assigned insertion sequence, breaks `executed_at` ties
    pub seq: i64,
    pub test_case_id: String,
    pub passed: bool,
    /// One-line verdict, prefixed with the error kind for infrastructure failures
    pub output_summary: String,
    pub raw_output: String,
    pub exit_code: Option<i64>,
    pub executed_at: DateTime<Utc>,
}

/// Execution result insert payload
#[derive(Debug, Clone)]
pub struct NewExecutionResult {
    pub id: String,
    pub test_case_id: String,
    pub passed: bool,
    pub output_summary: String,
    pub raw_output: String,
    pub exit_code: Option<i64>,
    pub executed_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Ordering key: `executed_at`, then insertion order
    pub fn ordering_key(&self) -> (DateTime<Utc>, i64) {
        (self.executed_at, self.seq)
    }
}
