//! Report model

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::UnknownStatus;

/// Aggregated verdict counts
#[derive(Debug, Clone, Copy, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: i64,
    pub passed: i64,
    pub failed: i64,
    pub pending: i64,
    /// Percentage of passed cases, two decimals
    pub success_rate: f64,
}

impl ReportSummary {
    /// Build a summary from raw counts
    pub fn from_counts(total: i64, passed: i64, failed: i64) -> Self {
        let success_rate = if total > 0 {
            (10_000.0 * passed as f64 / total as f64).round() / 100.0
        } else {
            0.0
        };

        Self {
            total,
            passed,
            failed,
            pending: total - passed - failed,
            success_rate,
        }
    }
}

/// Report database model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Report {
    pub task_id: String,
    #[sqlx(flatten)]
    pub summary: ReportSummary,
    pub generated_at: DateTime<Utc>,
    pub rendered_path: Option<String>,
    pub format: Option<ReportFormat>,
}

/// Output format requested from the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Markdown,
    Html,
    Json,
}

impl ReportFormat {
    /// Get format as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Json => "json",
        }
    }

    /// File extension for rendered output
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Html => "html",
            Self::Json => "json",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "html" => Ok(Self::Html),
            "json" => Ok(Self::Json),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

text_column!(ReportFormat);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_rounds_to_two_decimals() {
        let summary = ReportSummary::from_counts(3, 2, 1);
        assert_eq!(summary.pending, 0);
        assert_eq!(summary.success_rate, 66.67);

        let partial = ReportSummary::from_counts(6, 1, 2);
        assert_eq!(partial.pending, 3);
        assert_eq!(partial.success_rate, 16.67);
    }

    #[test]
    fn test_empty_summary_has_zero_rate() {
        let summary = ReportSummary::from_counts(0, 0, 0);
        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.pending, 0);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("md".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
        assert_eq!("HTML".parse::<ReportFormat>().unwrap(), ReportFormat::Html);
        assert!("pdf".parse::<ReportFormat>().is_err());
    }
}
