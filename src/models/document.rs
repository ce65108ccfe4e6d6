//! Requirement document model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Requirement document database model. Immutable once created.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source_text: String,
    pub created_at: DateTime<Utc>,
}
