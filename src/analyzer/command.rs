//! Analyzer backed by an external program
//!
//! The document text is written to the program's stdin; its stdout is parsed
//! with [`super::parse::parse_output`]. Failed attempts are retried with
//! exponential backoff.

use std::{process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::{io::AsyncWriteExt, process::Command};

use super::{RequirementAnalyzer, TestCaseSpec, parse::parse_output};
use crate::{
    config::AnalyzerConfig,
    constants::MAX_ANALYZER_RETRY_DELAY_SECS,
    error::{AppError, AppResult},
};

/// Runs `ANALYZER_COMMAND` once per attempt
pub struct CommandAnalyzer {
    program: String,
    config: AnalyzerConfig,
}

impl CommandAnalyzer {
    pub fn new(config: AnalyzerConfig) -> AppResult<Self> {
        let program = config
            .command
            .clone()
            .ok_or_else(|| AppError::Configuration("ANALYZER_COMMAND is not set".to_string()))?;

        Ok(Self { program, config })
    }

    /// `delay * backoff^attempt`, capped at [`MAX_ANALYZER_RETRY_DELAY_SECS`]
    fn retry_delay(&self, attempt: u32) -> Duration {
        if self.config.retry_delay_secs == 0 {
            return Duration::ZERO;
        }
        let cap = Duration::from_secs(MAX_ANALYZER_RETRY_DELAY_SECS);
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.config.retry_backoff.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(self.config.retry_delay_secs as f64 * factor)
            .map_or(cap, |delay| delay.min(cap))
    }

    async fn run_once(&self, document_text: &str) -> AppResult<Vec<TestCaseSpec>> {
        let mut child = Command::new(&self.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::AnalyzerFailure(format!("failed to spawn {}: {}", self.program, e)))?;

        // Feed stdin concurrently so a chatty program cannot block on a full pipe
        if let Some(mut stdin) = child.stdin.take() {
            let input = document_text.as_bytes().to_vec();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&input).await {
                    tracing::debug!(error = %e, "Analyzer closed stdin early");
                }
            });
        }

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(AppError::AnalyzerFailure(e.to_string())),
            Err(_) => {
                return Err(AppError::AnalyzerFailure(format!(
                    "timed out after {} seconds",
                    self.config.timeout_secs
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::AnalyzerFailure(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl RequirementAnalyzer for CommandAnalyzer {
    async fn analyze(&self, document_text: &str) -> AppResult<Vec<TestCaseSpec>> {
        let attempts = self.config.retry_count.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            match self.run_once(document_text).await {
                Ok(cases) => {
                    tracing::info!(attempt = attempt + 1, cases = cases.len(), "Analyzer succeeded");
                    return Ok(cases);
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, attempts, error = %e, "Analyzer attempt failed");
                    last_error = Some(e);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.retry_delay(attempt)).await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppError::AnalyzerFailure("no attempts were made".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> AnalyzerConfig {
        AnalyzerConfig {
            command: Some("sh".to_string()),
            args: vec!["-c".to_string(), script.to_string()],
            timeout_secs: 10,
            retry_count: 2,
            retry_delay_secs: 0,
            retry_backoff: 2.0,
        }
    }

    #[test]
    fn test_requires_command() {
        let err = CommandAnalyzer::new(AnalyzerConfig::default()).err().unwrap();
        assert_eq!(err.error_code(), "ConfigurationError");
    }

    #[test]
    fn test_retry_delay_grows() {
        let analyzer = CommandAnalyzer::new(AnalyzerConfig {
            retry_delay_secs: 5,
            ..shell("true")
        })
        .unwrap();
        assert_eq!(analyzer.retry_delay(0), Duration::from_secs(5));
        assert_eq!(analyzer.retry_delay(2), Duration::from_secs(20));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let analyzer = CommandAnalyzer::new(AnalyzerConfig {
            retry_delay_secs: 5,
            retry_count: u32::MAX,
            retry_backoff: 10.0,
            ..shell("true")
        })
        .unwrap();
        let cap = Duration::from_secs(MAX_ANALYZER_RETRY_DELAY_SECS);
        assert_eq!(analyzer.retry_delay(3), cap);
        assert_eq!(analyzer.retry_delay(400), cap);
        assert_eq!(analyzer.retry_delay(u32::MAX), cap);

        let immediate = CommandAnalyzer::new(shell("true")).unwrap();
        assert_eq!(immediate.retry_delay(u32::MAX), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_parses_program_output() {
        let analyzer = CommandAnalyzer::new(shell(
            "cat > /dev/null; printf '## Test case 1: smoke\\n- Steps: echo ok\\n'",
        ))
        .unwrap();

        let cases = analyzer.analyze("requirement text").await.unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].name, "smoke");
        assert_eq!(cases[0].steps, "echo ok");
    }

    #[tokio::test]
    async fn test_failing_program_is_analyzer_failure() {
        let analyzer = CommandAnalyzer::new(shell("echo broken >&2; exit 3")).unwrap();

        let err = analyzer.analyze("requirement text").await.unwrap_err();
        assert_eq!(err.error_code(), "AnalyzerFailure");
        assert!(err.to_string().contains("broken"));
    }
}
