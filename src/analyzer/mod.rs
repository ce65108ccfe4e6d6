//! Requirement analyzer adapter
//!
//! The analyzer turns free-form requirement text into test-case specs. The
//! generation logic itself lives outside this crate; [`CommandAnalyzer`]
//! drives an external program and parses what it prints.

pub mod command;
pub mod parse;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

pub use command::CommandAnalyzer;

/// One generated test case, before it is persisted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCaseSpec {
    pub name: String,
    #[serde(default)]
    pub purpose: String,
    pub steps: String,
    #[serde(default)]
    pub expected_result: String,
    #[serde(default)]
    pub validation_method: String,
    #[serde(default)]
    pub test_data_ref: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Analyzer contract.
///
/// Implementations fail with [`crate::AppError::AnalyzerFailure`]. An empty
/// list is a valid return value; the orchestrator treats it as a failure.
#[async_trait]
pub trait RequirementAnalyzer: Send + Sync {
    async fn analyze(&self, document_text: &str) -> AppResult<Vec<TestCaseSpec>>;
}
