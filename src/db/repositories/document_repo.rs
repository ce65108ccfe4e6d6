//! Document repository

use sqlx::PgPool;

use crate::{error::AppResult, models::Document};

/// Repository for requirement document operations
pub struct DocumentRepository;

impl DocumentRepository {
    /// Store a new document
    pub async fn create(pool: &PgPool, document: &Document) -> AppResult<Document> {
        let document = sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO documents (id, source_text, created_at)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&document.id)
        .bind(&document.source_text)
        .bind(document.created_at)
        .fetch_one(pool)
        .await?;

        Ok(document)
    }

    /// Find document by ID
    pub async fn find_by_id(pool: &PgPool, id: &str) -> AppResult<Option<Document>> {
        let document = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(document)
    }
}
