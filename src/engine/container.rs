//! Per-task container lifecycle and exec
//!
//! A task owns at most one container, named `<prefix>_<task_id>`. The handle
//! returned by [`ContainerEngine::provision`] is that name, so re-provisioning
//! yields the same handle.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;

use super::runtime::{BindMount, ContainerRuntime, ContainerSpec, ExecOutput};
use crate::{
    config::DockerConfig,
    constants::labels,
    error::{AppError, AppResult},
    utils::fingerprint,
};

/// Container execution engine
pub struct ContainerEngine {
    runtime: Arc<dyn ContainerRuntime>,
    config: DockerConfig,
    exec_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ContainerEngine {
    /// Create a new engine over a runtime
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: DockerConfig) -> Self {
        Self {
            runtime,
            config,
            exec_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Deterministic container name for a task
    pub fn container_name(&self, task_id: &str) -> String {
        format!("{}_{}", self.config.container_prefix, task_id)
    }

    /// Path the dataset is visible at inside the container
    pub fn dataset_mount_point(&self) -> &str {
        &self.config.dataset_mount_point
    }

    pub fn default_timeout(&self) -> Duration {
        self.config.exec_timeout()
    }

    fn spec_for(&self, name: &str, task_id: &str, image: &str, dataset_ref: &str) -> ContainerSpec {
        let labels = HashMap::from([
            (labels::TASK.to_string(), task_id.to_string()),
            (labels::IMAGE.to_string(), image.to_string()),
            (
                labels::DATASET_FINGERPRINT.to_string(),
                fingerprint(dataset_ref),
            ),
        ]);

        ContainerSpec {
            name: name.to_string(),
            image: image.to_string(),
            mounts: vec![BindMount {
                source: dataset_ref.to_string(),
                target: self.config.dataset_mount_point.clone(),
                read_only: true,
            }],
            env: vec![
                "LANG=C.UTF-8".to_string(),
                format!("ALGOTEST_TASK_ID={}", task_id),
            ],
            labels,
            network_mode: self.config.network_mode.clone(),
        }
    }

    /// Make sure a running container for the task exists and return its handle.
    ///
    /// A running container carrying the same image and dataset labels is
    /// reused. Anything else under the same name is removed and recreated.
    pub async fn provision(
        &self,
        task_id: &str,
        image: &str,
        dataset_ref: &str,
    ) -> AppResult<String> {
        let name = self.container_name(task_id);
        let spec = self.spec_for(&name, task_id, image, dataset_ref);

        if let Some(existing) = self
            .runtime
            .inspect(&name)
            .await
            .map_err(|e| AppError::ContainerStartError(e.to_string()))?
        {
            let same_inputs = [labels::IMAGE, labels::DATASET_FINGERPRINT]
                .iter()
                .all(|key| existing.labels.get(*key) == spec.labels.get(*key));

            if existing.running && same_inputs {
                tracing::info!(task_id, container = %name, "Reusing running container");
                return Ok(name);
            }

            tracing::info!(
                task_id,
                container = %name,
                running = existing.running,
                "Removing stale container"
            );
            self.runtime
                .remove(&name)
                .await
                .map_err(|e| AppError::ContainerStartError(e.to_string()))?;
        }

        let present = self
            .runtime
            .image_exists(image)
            .await
            .map_err(|e| AppError::ImagePullError(format!("{}: {}", image, e)))?;

        if !present {
            tracing::info!(task_id, image, "Pulling image");
            self.runtime
                .pull(image)
                .await
                .map_err(|e| AppError::ImagePullError(format!("{}: {}", image, e)))?;
        }

        let id = self
            .runtime
            .start(&spec)
            .await
            .map_err(|e| AppError::ContainerStartError(e.to_string()))?;

        if !self.is_running(&name).await? {
            // Clean up so the next attempt starts fresh
            let _ = self.runtime.remove(&name).await;
            return Err(AppError::ContainerStartError(format!(
                "container {} exited right after start",
                name
            )));
        }

        tracing::info!(task_id, container = %name, id = %id, image, "Container started");
        Ok(name)
    }

    /// Run `script` through `/bin/sh -c`. At most one engine exec runs per
    /// container at a time.
    ///
    /// On timeout the exec is abandoned rather than killed: the daemon has no
    /// kill call for exec instances, so the process may keep running inside
    /// the container after the lock is released.
    pub async fn exec(
        &self,
        handle: &str,
        script: &str,
        timeout: Option<Duration>,
    ) -> AppResult<ExecOutput> {
        let limit = timeout.unwrap_or_else(|| self.default_timeout());
        let lock = self.exec_lock(handle).await;
        let _guard = lock.lock().await;

        let cmd = vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()];

        match tokio::time::timeout(limit, self.runtime.exec(handle, &cmd)).await {
            Err(_) => {
                tracing::warn!(container = handle, timeout = ?limit, "Exec timed out, process left running");
                Err(AppError::ExecTimeout(limit))
            }
            Ok(Err(AppError::ExecError(msg))) => Err(AppError::ExecError(msg)),
            Ok(Err(e)) => Err(AppError::ExecError(e.to_string())),
            Ok(Ok(output)) => {
                tracing::debug!(container = handle, exit_code = output.exit_code, "Exec finished");
                Ok(output)
            }
        }
    }

    /// Stop and remove the container. A missing container is not an error.
    pub async fn teardown(&self, handle: &str) -> AppResult<()> {
        if let Some(info) = self.runtime.inspect(handle).await? {
            if info.running {
                self.runtime.stop(handle).await?;
            }
            self.runtime.remove(handle).await?;
            tracing::info!(container = handle, "Container removed");
        }

        self.exec_locks.lock().await.remove(handle);
        Ok(())
    }

    /// Liveness check
    pub async fn is_running(&self, handle: &str) -> AppResult<bool> {
        Ok(self
            .runtime
            .inspect(handle)
            .await?
            .is_some_and(|info| info.running))
    }

    async fn exec_lock(&self, handle: &str) -> Arc<Mutex<()>> {
        self.exec_locks
            .lock()
            .await
            .entry(handle.to_string())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runtime::{ContainerInfo, MockContainerRuntime};

    fn engine(runtime: MockContainerRuntime) -> ContainerEngine {
        ContainerEngine::new(Arc::new(runtime), DockerConfig::default())
    }

    fn running_with(labels_of: &ContainerSpec) -> ContainerInfo {
        ContainerInfo {
            id: "abc123".to_string(),
            running: true,
            labels: labels_of.labels.clone(),
        }
    }

    #[tokio::test]
    async fn test_provision_pulls_missing_image_and_mounts_dataset() {
        let mut runtime = MockContainerRuntime::new();
        let mut inspected = 0;
        runtime.expect_inspect().returning(move |_| {
            inspected += 1;
            Ok((inspected > 1).then(|| ContainerInfo {
                id: "abc123".to_string(),
                running: true,
                labels: HashMap::new(),
            }))
        });
        runtime
            .expect_image_exists()
            .withf(|image| image == "algo:v1")
            .returning(|_| Ok(false));
        runtime
            .expect_pull()
            .withf(|image| image == "algo:v1")
            .times(1)
            .returning(|_| Ok(()));
        runtime
            .expect_start()
            .withf(|spec| {
                spec.name == "algotest_TASK_1"
                    && spec.mounts
                        == vec![BindMount {
                            source: "/srv/ds1".to_string(),
                            target: "/data".to_string(),
                            read_only: true,
                        }]
            })
            .times(1)
            .returning(|_| Ok("abc123".to_string()));

        let handle = engine(runtime)
            .provision("TASK_1", "algo:v1", "/srv/ds1")
            .await
            .unwrap();
        assert_eq!(handle, "algotest_TASK_1");
    }

    #[tokio::test]
    async fn test_provision_reuses_matching_container() {
        let template = ContainerEngine::new(
            Arc::new(MockContainerRuntime::new()),
            DockerConfig::default(),
        );
        let spec = template.spec_for("algotest_TASK_1", "TASK_1", "algo:v1", "/srv/ds1");
        let existing = running_with(&spec);

        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_inspect()
            .returning(move |_| Ok(Some(existing.clone())));
        runtime.expect_start().never();
        runtime.expect_remove().never();

        let handle = engine(runtime)
            .provision("TASK_1", "algo:v1", "/srv/ds1")
            .await
            .unwrap();
        assert_eq!(handle, "algotest_TASK_1");
    }

    #[tokio::test]
    async fn test_provision_replaces_container_with_other_dataset() {
        let mut runtime = MockContainerRuntime::new();
        let mut inspected = 0;
        runtime.expect_inspect().returning(move |_| {
            inspected += 1;
            let labels = if inspected == 1 {
                HashMap::from([(labels::DATASET_FINGERPRINT.to_string(), "other".to_string())])
            } else {
                HashMap::new()
            };
            Ok(Some(ContainerInfo {
                id: "abc123".to_string(),
                running: true,
                labels,
            }))
        });
        runtime.expect_remove().times(1).returning(|_| Ok(()));
        runtime.expect_image_exists().returning(|_| Ok(true));
        runtime.expect_pull().never();
        runtime
            .expect_start()
            .times(1)
            .returning(|_| Ok("def456".to_string()));

        engine(runtime)
            .provision("TASK_1", "algo:v1", "/srv/ds2")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_provision_maps_pull_failure() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_inspect().returning(|_| Ok(None));
        runtime.expect_image_exists().returning(|_| Ok(false));
        runtime
            .expect_pull()
            .returning(|_| Err(AppError::Docker("manifest unknown".to_string())));
        runtime.expect_start().never();

        let err = engine(runtime)
            .provision("TASK_1", "algo:missing", "/srv/ds1")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "ImagePullError");
    }

    #[tokio::test]
    async fn test_provision_fails_when_container_exits() {
        let mut runtime = MockContainerRuntime::new();
        let mut inspected = 0;
        runtime.expect_inspect().returning(move |_| {
            inspected += 1;
            Ok((inspected > 1).then(ContainerInfo::default))
        });
        runtime.expect_image_exists().returning(|_| Ok(true));
        runtime.expect_start().returning(|_| Ok("abc".to_string()));
        runtime.expect_remove().returning(|_| Ok(()));

        let err = engine(runtime)
            .provision("TASK_1", "algo:v1", "/srv/ds1")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "ContainerStartError");
    }

    #[tokio::test]
    async fn test_exec_wraps_script_in_shell() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_exec()
            .withf(|container, cmd| {
                container == "algotest_TASK_1" && cmd[0] == "/bin/sh" && cmd[2] == "echo hi"
            })
            .returning(|_, _| {
                Ok(ExecOutput {
                    stdout: "hi\n".to_string(),
                    stderr: String::new(),
                    exit_code: 0,
                })
            });

        let out = engine(runtime)
            .exec("algotest_TASK_1", "echo hi", None)
            .await
            .unwrap();
        assert_eq!(out.stdout, "hi\n");
    }

    #[tokio::test]
    async fn test_exec_maps_runtime_failure() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_exec()
            .returning(|_, _| Err(AppError::Docker("no such container".to_string())));

        let err = engine(runtime)
            .exec("algotest_TASK_1", "true", None)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "ExecError");
    }

    #[tokio::test]
    async fn test_teardown_is_noop_when_gone() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_inspect().returning(|_| Ok(None));
        runtime.expect_stop().never();
        runtime.expect_remove().never();

        engine(runtime).teardown("algotest_TASK_1").await.unwrap();
    }
}
