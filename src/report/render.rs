//! Report rendering
//!
//! [`TemplateRenderer`] renders Markdown and HTML through minijinja and JSON
//! through serde_json. A template file from config replaces the built-in
//! template for the Markdown and HTML formats.

use std::path::Path;

use minijinja::Environment;

use super::summary::ReportContext;
use crate::{
    config::ReportConfig,
    error::{AppError, AppResult},
    models::ReportFormat,
};

const MARKDOWN_TEMPLATE: &str = r#"# Test Report: {{ task.id }}

- Algorithm image: `{{ task.algorithm_image }}`
- Dataset: `{{ task.dataset_ref }}`
- Task status: {{ task.status }}
- Generated at: {{ generated_at }}

## Summary

| Total | Passed | Failed | Pending | Success rate |
|------:|-------:|-------:|--------:|-------------:|
| {{ summary.total }} | {{ summary.passed }} | {{ summary.failed }} | {{ summary.pending }} | {{ summary.success_rate }}% |

## Cases
{% for case in cases %}
### {{ loop.index }}. {{ case.name }} ({{ case.status }})

- Purpose: {{ case.purpose }}
- Expected result: {{ case.expected_result }}
- Validation method: {{ case.validation_method }}
- Result: {{ case.output_summary if case.output_summary else "not executed" }}
{% endfor %}
{%- if task.error_log %}
## Error log
{% for entry in task.error_log %}
- {{ entry }}
{%- endfor %}
{% endif %}"#;

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Test Report: {{ task.id }}</title>
</head>
<body>
<h1>Test Report: {{ task.id }}</h1>
<ul>
  <li>Algorithm image: <code>{{ task.algorithm_image }}</code></li>
  <li>Dataset: <code>{{ task.dataset_ref }}</code></li>
  <li>Task status: {{ task.status }}</li>
  <li>Generated at: {{ generated_at }}</li>
</ul>
<h2>Summary</h2>
<table>
  <tr><th>Total</th><th>Passed</th><th>Failed</th><th>Pending</th><th>Success rate</th></tr>
  <tr><td>{{ summary.total }}</td><td>{{ summary.passed }}</td><td>{{ summary.failed }}</td><td>{{ summary.pending }}</td><td>{{ summary.success_rate }}%</td></tr>
</table>
<h2>Cases</h2>
<table>
  <tr><th>#</th><th>Name</th><th>Status</th><th>Expected</th><th>Result</th></tr>
{%- for case in cases %}
  <tr class="{{ case.status }}"><td>{{ loop.index }}</td><td>{{ case.name }}</td><td>{{ case.status }}</td><td>{{ case.expected_result }}</td><td>{{ case.output_summary if case.output_summary else "not executed" }}</td></tr>
{%- endfor %}
</table>
{%- if task.error_log %}
<h2>Error log</h2>
<ul>
{%- for entry in task.error_log %}
  <li>{{ entry }}</li>
{%- endfor %}
</ul>
{%- endif %}
</body>
</html>
"#;

/// Renders a report context into bytes
pub trait ReportRenderer: Send + Sync {
    fn render(&self, context: &ReportContext, format: ReportFormat) -> AppResult<Vec<u8>>;
}

/// Template-backed renderer
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    /// `(name, source)` of a template file replacing the built-in ones
    custom: Option<(String, String)>,
}

impl TemplateRenderer {
    /// Renderer with the built-in templates
    pub fn new() -> Self {
        Self::default()
    }

    /// Renderer using the template file from config, if any
    pub fn from_config(config: &ReportConfig) -> AppResult<Self> {
        match &config.template_path {
            Some(path) => Self::with_template_file(path),
            None => Ok(Self::new()),
        }
    }

    pub fn with_template_file(path: &Path) -> AppResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!("cannot read template {}: {}", path.display(), e))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report.txt".to_string());

        // Syntax check
        Environment::new().template_from_named_str(&name, &source)?;

        Ok(Self {
            custom: Some((name, source)),
        })
    }

    /// Auto-escaping follows the template name, so `.html` output is escaped
    fn render_template(name: &str, source: &str, context: &ReportContext) -> AppResult<Vec<u8>> {
        let env = Environment::new();
        let rendered = env.template_from_named_str(name, source)?.render(context)?;
        Ok(rendered.into_bytes())
    }
}

impl ReportRenderer for TemplateRenderer {
    fn render(&self, context: &ReportContext, format: ReportFormat) -> AppResult<Vec<u8>> {
        match (format, &self.custom) {
            (ReportFormat::Json, _) => Ok(serde_json::to_vec_pretty(context)?),
            (_, Some((name, source))) => Self::render_template(name, source, context),
            (ReportFormat::Markdown, None) => {
                Self::render_template("report.md", MARKDOWN_TEMPLATE, context)
            }
            (ReportFormat::Html, None) => {
                Self::render_template("report.html", HTML_TEMPLATE, context)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::Utc;

    use super::*;
    use crate::{
        models::{CaseStatus, ReportSummary, TaskStatus},
        report::summary::{CaseDetail, TaskInfo},
    };

    fn context() -> ReportContext {
        let detail = |id: &str, name: &str, status, summary: Option<&str>| CaseDetail {
            case_id: id.to_string(),
            name: name.to_string(),
            purpose: String::new(),
            steps: "run".to_string(),
            expected_result: "exit 0".to_string(),
            validation_method: "exit_code == 0".to_string(),
            status,
            output_summary: summary.map(str::to_string),
            exit_code: None,
            executed_at: None,
        };

        ReportContext {
            task: TaskInfo {
                id: "TASK_1".to_string(),
                algorithm_image: "algo:v1".to_string(),
                dataset_ref: "/data/ds1".to_string(),
                status: TaskStatus::Completed,
                error_log: vec!["ExecError: boom".to_string()],
            },
            summary: ReportSummary::from_counts(3, 2, 1),
            cases: vec![
                detail("CASE_1", "default threshold", CaseStatus::Passed, Some("Passed: exit code 0")),
                detail("CASE_2", "<script>", CaseStatus::Failed, Some("Failed: exit code 1")),
                detail("CASE_3", "large input", CaseStatus::Passed, None),
            ],
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_markdown_report() {
        let bytes = TemplateRenderer::new()
            .render(&context(), ReportFormat::Markdown)
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("# Test Report: TASK_1"));
        assert!(text.contains("66.67%"));
        assert!(text.contains("### 1. default threshold (passed)"));
        assert!(text.contains("Result: not executed"));
        assert!(text.contains("- ExecError: boom"));
    }

    #[test]
    fn test_html_report_escapes_content() {
        let bytes = TemplateRenderer::new()
            .render(&context(), ReportFormat::Html)
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("&lt;script&gt;"));
        assert!(!text.contains("<td><script>"));
    }

    #[test]
    fn test_json_report() {
        let bytes = TemplateRenderer::new()
            .render(&context(), ReportFormat::Json)
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["summary"]["success_rate"], 66.67);
        assert_eq!(value["cases"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_custom_template_file() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "{{{{ task.id }}}}: {{{{ summary.passed }}}}/{{{{ summary.total }}}}").unwrap();

        let renderer = TemplateRenderer::with_template_file(file.path()).unwrap();
        let bytes = renderer.render(&context(), ReportFormat::Markdown).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "TASK_1: 2/3");
    }

    #[test]
    fn test_broken_template_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{% for x in %}}").unwrap();
        assert!(TemplateRenderer::with_template_file(file.path()).is_err());
    }
}
