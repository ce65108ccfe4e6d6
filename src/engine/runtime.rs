//! Container runtime adapter contract

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::AppResult;

/// Host path bind-mounted into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// Everything needed to create and start a long-lived container
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub mounts: Vec<BindMount>,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub network_mode: Option<String>,
}

/// Observed state of a container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerInfo {
    pub id: String,
    pub running: bool,
    pub labels: HashMap<String, String>,
}

/// Captured output of one exec. A non-zero exit code is data, not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

impl ExecOutput {
    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Operations the engine needs from a container daemon.
///
/// Containers are addressed by name or id. Missing containers are reported
/// as `Ok(None)` from [`ContainerRuntime::inspect`] and ignored by
/// `stop`/`remove`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn image_exists(&self, image: &str) -> AppResult<bool>;

    async fn pull(&self, image: &str) -> AppResult<()>;

    async fn inspect(&self, container: &str) -> AppResult<Option<ContainerInfo>>;

    /// Create and start; returns the runtime's container id
    async fn start(&self, spec: &ContainerSpec) -> AppResult<String>;

    async fn exec(&self, container: &str, cmd: &[String]) -> AppResult<ExecOutput>;

    async fn stop(&self, container: &str) -> AppResult<()>;

    async fn remove(&self, container: &str) -> AppResult<()>;
}
