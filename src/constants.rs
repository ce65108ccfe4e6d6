//! Application-wide constants
//!
//! This module contains all constant values used throughout the application.
//! Constants are grouped by their purpose for better organization.

// =============================================================================
// LOGGING DEFAULTS
// =============================================================================

/// Default tracing filter when `RUST_LOG` is unset
pub const DEFAULT_RUST_LOG: &str = "info";

// =============================================================================
// DATABASE DEFAULTS
// =============================================================================

/// Default maximum database connections in the pool
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 20;

// =============================================================================
// QUEUE DEFAULTS
// =============================================================================

/// Default Redis URL
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Redis list the pipeline worker consumes
pub const DEFAULT_PIPELINE_QUEUE: &str = "algotest_pipeline";

/// Blocking pop timeout in seconds
pub const DEFAULT_QUEUE_POLL_SECS: f64 = 5.0;

/// Jobs the worker runs concurrently
pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;

// =============================================================================
// CONTAINER DEFAULTS
// =============================================================================

/// Default Docker socket
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Prefix for per-task container names (`algotest_<task_id>`)
pub const DEFAULT_CONTAINER_PREFIX: &str = "algotest";

/// Where the dataset is mounted inside the container
pub const DEFAULT_DATASET_MOUNT_POINT: &str = "/data";

/// Default exec timeout in seconds
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 300;

/// Grace period given to `docker stop` before kill
pub const CONTAINER_STOP_GRACE_SECS: i32 = 10;

/// Max bytes of stdout kept on `TestCase.actual_output`
pub const MAX_ACTUAL_OUTPUT_BYTES: usize = 64 * 1024;

/// Container labels
pub mod labels {
    pub const TASK: &str = "algotest.task";
    pub const DATASET_FINGERPRINT: &str = "algotest.dataset";
    pub const IMAGE: &str = "algotest.image";
}

// =============================================================================
// ANALYZER DEFAULTS
// =============================================================================

/// Default analyzer timeout per attempt in seconds
pub const DEFAULT_ANALYZER_TIMEOUT_SECS: u64 = 60;

/// Default number of analyzer attempts
pub const DEFAULT_ANALYZER_RETRY_COUNT: u32 = 3;

/// Initial delay between analyzer attempts in seconds
pub const DEFAULT_ANALYZER_RETRY_DELAY_SECS: u64 = 5;

/// Multiplier applied to the delay after each failed attempt
pub const DEFAULT_ANALYZER_RETRY_BACKOFF: f64 = 2.0;

/// Upper bound for the delay between analyzer attempts in seconds
pub const MAX_ANALYZER_RETRY_DELAY_SECS: u64 = 600;

// =============================================================================
// REPORT DEFAULTS
// =============================================================================

/// Directory rendered reports are written to
pub const DEFAULT_REPORT_OUTPUT_DIR: &str = "reports";

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Prefixes for generated ids (`PREFIX_<timestamp>_<random>`)
pub mod id_prefixes {
    pub const DOCUMENT: &str = "DOC";
    pub const TASK: &str = "TASK";
    pub const CASE: &str = "CASE";
    pub const RESULT: &str = "RESULT";
}

/// Length of the random suffix in generated ids
pub const ID_RANDOM_LEN: usize = 12;

// =============================================================================
// VALIDATION LIMITS
// =============================================================================

/// Maximum requirement document size (1MB)
pub const MAX_DOCUMENT_BYTES: usize = 1_048_576;
