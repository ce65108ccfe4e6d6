//! Per-task mutual exclusion and cancellation

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, PoisonError},
};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

/// One async mutex per task id. Every mutating operation on a task holds it.
#[derive(Default)]
pub struct TaskLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TaskLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the task's lock. The guard can be moved into a spawned task.
    pub async fn lock(&self, task_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .await
            .entry(task_id.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }
}

#[derive(Default)]
struct Registered {
    next_generation: u64,
    tokens: HashMap<String, (u64, CancellationToken)>,
}

/// Cancellation tokens of in-flight operations, keyed by task id
#[derive(Clone, Default)]
pub struct CancelRegistry {
    inner: Arc<StdMutex<Registered>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation; the token stays registered until the guard drops
    pub fn register(&self, task_id: &str) -> CancelGuard {
        let token = CancellationToken::new();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.next_generation += 1;
        let generation = inner.next_generation;
        inner
            .tokens
            .insert(task_id.to_string(), (generation, token.clone()));

        CancelGuard {
            registry: self.clone(),
            task_id: task_id.to_string(),
            generation,
            token,
        }
    }

    /// Signal the in-flight operation. Returns false when nothing is running.
    pub fn cancel(&self, task_id: &str) -> bool {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match inner.tokens.get(task_id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, task_id: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tokens
            .contains_key(task_id)
    }
}

/// Keeps a task's token registered
pub struct CancelGuard {
    registry: CancelRegistry,
    task_id: String,
    generation: u64,
    token: CancellationToken,
}

impl CancelGuard {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        let mut inner = self
            .registry
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // A newer registration for the same task keeps its own token
        if inner
            .tokens
            .get(&self.task_id)
            .is_some_and(|(generation, _)| *generation == self.generation)
        {
            inner.tokens.remove(&self.task_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_lock_serializes_same_task() {
        let locks = Arc::new(TaskLocks::new());
        let guard = locks.lock("TASK_1").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("TASK_1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        // Other tasks are not blocked
        let _other = locks.lock("TASK_2").await;

        drop(guard);
        contender.await.unwrap();
    }

    #[test]
    fn test_cancel_requires_registration() {
        let registry = CancelRegistry::new();
        assert!(!registry.cancel("TASK_1"));

        let guard = registry.register("TASK_1");
        assert!(registry.cancel("TASK_1"));
        assert!(guard.is_cancelled());

        drop(guard);
        assert!(!registry.is_registered("TASK_1"));
        assert!(!registry.cancel("TASK_1"));
    }

    #[test]
    fn test_stale_guard_keeps_newer_registration() {
        let registry = CancelRegistry::new();
        let old = registry.register("TASK_1");
        let new = registry.register("TASK_1");

        drop(old);
        assert!(registry.is_registered("TASK_1"));
        assert!(registry.cancel("TASK_1"));
        assert!(new.is_cancelled());
    }
}
