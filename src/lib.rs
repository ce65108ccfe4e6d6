//! AlgoTest - Algorithm Acceptance-Test Orchestration
//!
//! This library drives an algorithm image through acceptance testing:
//! requirement text is turned into test cases, the cases run inside a
//! per-task container with the dataset mounted, each result is validated
//! and stored, and the outcome is summarized into a report.
//!
//! # Architecture
//!
//! - **Pipeline**: task state machine, orchestration and case scheduling
//! - **Engine**: container lifecycle behind a runtime trait (Docker in production)
//! - **Analyzer**: requirement text to test-case specs
//! - **Report**: aggregation and template rendering
//! - **Db**: the task store (Postgres, or in-memory)
//! - **Queue**: Redis job queue and worker

pub mod analyzer;
pub mod config;
pub mod constants;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod report;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::AppState;
