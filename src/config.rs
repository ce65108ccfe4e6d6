//! Application configuration management
//!
//! This module handles loading and validating configuration from environment variables.
//! The configuration is built once in `main` and handed to the store, engine and
//! orchestrator at construction time.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_ANALYZER_RETRY_BACKOFF, DEFAULT_ANALYZER_RETRY_COUNT,
    DEFAULT_ANALYZER_RETRY_DELAY_SECS, DEFAULT_ANALYZER_TIMEOUT_SECS, DEFAULT_CONTAINER_PREFIX,
    DEFAULT_DATABASE_MAX_CONNECTIONS, DEFAULT_DATASET_MOUNT_POINT, DEFAULT_DOCKER_SOCKET,
    DEFAULT_EXEC_TIMEOUT_SECS, DEFAULT_PIPELINE_QUEUE, DEFAULT_QUEUE_POLL_SECS,
    DEFAULT_REDIS_URL, DEFAULT_REPORT_OUTPUT_DIR, DEFAULT_RUST_LOG, DEFAULT_WORKER_CONCURRENCY,
};
use crate::models::ReportFormat;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub log: LogConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub docker: DockerConfig,
    pub analyzer: AnalyzerConfig,
    pub report: ReportConfig,
    pub pipeline: PipelineConfig,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub rust_log: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Redis configuration for the pipeline job queue
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub queue_name: String,
    pub poll_timeout_secs: f64,
}

/// Docker configuration for test containers
#[derive(Debug, Clone)]
pub struct DockerConfig {
    pub socket_path: String,
    pub container_prefix: String,
    pub dataset_mount_point: String,
    /// Network mode for test containers; `None` keeps the daemon default
    pub network_mode: Option<String>,
    /// Default timeout applied to every exec
    pub exec_timeout_secs: u64,
    pub registry: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Requirement analyzer adapter configuration
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// External program that turns document text into test-case specs
    pub command: Option<String>,
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub retry_count: u32,
    pub retry_delay_secs: u64,
    pub retry_backoff: f64,
}

/// Report rendering configuration
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Template overriding the built-in one
    pub template_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub default_format: ReportFormat,
}

/// Pipeline behavior
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Queue-driven analysis continues through prepare, execute and report
    pub auto_advance: bool,
    /// Jobs the worker runs at once; cancel jobs bypass the limit
    pub max_concurrent_jobs: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            log: LogConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            redis: RedisConfig::from_env()?,
            docker: DockerConfig::from_env()?,
            analyzer: AnalyzerConfig::from_env()?,
            report: ReportConfig::from_env()?,
            pipeline: PipelineConfig::from_env()?,
        })
    }
}

impl LogConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let format = env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
        let json = match format.as_str() {
            "json" => true,
            "pretty" | "text" => false,
            _ => return Err(ConfigError::InvalidValue("LOG_FORMAT".to_string())),
        };

        Ok(Self {
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_RUST_LOG.to_string()),
            json,
        })
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL".to_string()))?,
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS)?,
        })
    }
}

impl RedisConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string()),
            queue_name: env::var("PIPELINE_QUEUE")
                .unwrap_or_else(|_| DEFAULT_PIPELINE_QUEUE.to_string()),
            poll_timeout_secs: parse_var("QUEUE_POLL_SECS", DEFAULT_QUEUE_POLL_SECS)?,
        })
    }
}

impl DockerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            socket_path: env::var("DOCKER_SOCKET")
                .unwrap_or_else(|_| DEFAULT_DOCKER_SOCKET.to_string()),
            container_prefix: env::var("CONTAINER_PREFIX")
                .unwrap_or_else(|_| DEFAULT_CONTAINER_PREFIX.to_string()),
            dataset_mount_point: env::var("DATASET_MOUNT_POINT")
                .unwrap_or_else(|_| DEFAULT_DATASET_MOUNT_POINT.to_string()),
            network_mode: optional_var("CONTAINER_NETWORK_MODE"),
            exec_timeout_secs: parse_var("DOCKER_TIMEOUT", DEFAULT_EXEC_TIMEOUT_SECS)?,
            registry: optional_var("DOCKER_REGISTRY"),
            username: optional_var("DOCKER_USERNAME"),
            password: optional_var("DOCKER_PASSWORD"),
        })
    }

    /// Default exec timeout as a [`Duration`]
    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket_path: DEFAULT_DOCKER_SOCKET.to_string(),
            container_prefix: DEFAULT_CONTAINER_PREFIX.to_string(),
            dataset_mount_point: DEFAULT_DATASET_MOUNT_POINT.to_string(),
            network_mode: None,
            exec_timeout_secs: DEFAULT_EXEC_TIMEOUT_SECS,
            registry: None,
            username: None,
            password: None,
        }
    }
}

impl AnalyzerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            command: optional_var("ANALYZER_COMMAND"),
            args: env::var("ANALYZER_ARGS")
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            timeout_secs: parse_var("ANALYZER_TIMEOUT", DEFAULT_ANALYZER_TIMEOUT_SECS)?,
            retry_count: parse_var("ANALYZER_RETRY_COUNT", DEFAULT_ANALYZER_RETRY_COUNT)?,
            retry_delay_secs: parse_var("ANALYZER_RETRY_DELAY", DEFAULT_ANALYZER_RETRY_DELAY_SECS)?,
            retry_backoff: parse_var("ANALYZER_RETRY_BACKOFF", DEFAULT_ANALYZER_RETRY_BACKOFF)?,
        })
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_secs: DEFAULT_ANALYZER_TIMEOUT_SECS,
            retry_count: DEFAULT_ANALYZER_RETRY_COUNT,
            retry_delay_secs: DEFAULT_ANALYZER_RETRY_DELAY_SECS,
            retry_backoff: DEFAULT_ANALYZER_RETRY_BACKOFF,
        }
    }
}

impl ReportConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let default_format = match env::var("REPORT_FORMAT") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("REPORT_FORMAT".to_string()))?,
            Err(_) => ReportFormat::Markdown,
        };

        Ok(Self {
            template_path: optional_var("REPORT_TEMPLATE_PATH").map(PathBuf::from),
            output_dir: PathBuf::from(
                env::var("REPORT_OUTPUT_DIR").unwrap_or_else(|_| DEFAULT_REPORT_OUTPUT_DIR.to_string()),
            ),
            default_format,
        })
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            template_path: None,
            output_dir: PathBuf::from(DEFAULT_REPORT_OUTPUT_DIR),
            default_format: ReportFormat::Markdown,
        }
    }
}

impl PipelineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            auto_advance: env::var("AUTO_ADVANCE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            max_concurrent_jobs: parse_var("WORKER_CONCURRENCY", DEFAULT_WORKER_CONCURRENCY)?
                .max(1),
        })
    }
}

/// Read an optional variable, treating empty strings as unset
fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a variable, falling back to `default` when unset
fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let docker = DockerConfig::default();
        assert_eq!(docker.container_prefix, "algotest");
        assert_eq!(docker.dataset_mount_point, "/data");
        assert_eq!(docker.exec_timeout(), Duration::from_secs(300));

        let analyzer = AnalyzerConfig::default();
        assert_eq!(analyzer.retry_count, 3);
        assert!(analyzer.command.is_none());
    }

    #[test]
    fn test_parse_var_falls_back_when_unset() {
        let value: u32 = parse_var("ALGOTEST_TEST_SURELY_UNSET_VAR", 7).unwrap();
        assert_eq!(value, 7);
    }
}
