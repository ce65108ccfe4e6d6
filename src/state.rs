//! Application state management
//!
//! This module contains the shared state assembled in `main` and handed to
//! the worker and recovery code.

use std::sync::Arc;

use redis::aio::ConnectionManager;

use crate::{config::Config, pipeline::Orchestrator};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

/// Inner state (wrapped in Arc for cheap cloning)
struct AppStateInner {
    /// Workflow orchestrator
    pub orchestrator: Orchestrator,

    /// Redis connection manager for the job queue
    pub redis: ConnectionManager,

    /// Application configuration
    pub config: Config,
}

impl AppState {
    /// Create a new application state
    pub fn new(orchestrator: Orchestrator, redis: ConnectionManager, config: Config) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                orchestrator,
                redis,
                config,
            }),
        }
    }

    /// Get a reference to the orchestrator
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.inner.orchestrator
    }

    /// Get a clone of the Redis connection manager
    pub fn redis(&self) -> ConnectionManager {
        self.inner.redis.clone()
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}
