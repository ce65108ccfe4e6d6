//! Database module
//!
//! This module handles database connections, migrations, repositories and the
//! [`TaskStore`] seam the pipeline talks to.

pub mod connection;
pub mod memory;
pub mod postgres;
pub mod repositories;
pub mod store;

use sqlx::PgPool;

pub use connection::*;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::TaskStore;

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
