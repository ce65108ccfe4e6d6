//! Turn a case's `steps` template into a shell script
//!
//! Placeholders use `{{name}}`. Built-ins are `test_data`, `dataset`,
//! `task_id` and `case_id`; any other name is looked up in the case
//! parameters. An unresolved placeholder makes the steps invalid.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::{
    error::{AppError, AppResult},
    models::TestCase,
};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder regex")
});

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*•]|\d+[.)、]|\$)\s+").expect("valid list marker regex")
});

/// Values available to every case of a task
#[derive(Debug, Clone)]
pub struct CommandContext<'a> {
    pub task_id: &'a str,
    /// Dataset mount point inside the container
    pub dataset: &'a str,
}

/// Resolve `test_data_ref` against the dataset mount
pub fn test_data_path(case: &TestCase, ctx: &CommandContext<'_>) -> String {
    match case.test_data_ref.as_deref().map(str::trim) {
        None | Some("") => ctx.dataset.to_string(),
        Some(path) if path.starts_with('/') => path.to_string(),
        Some(path) => format!("{}/{}", ctx.dataset.trim_end_matches('/'), path),
    }
}

/// Strip list markers, prompts, comments and fences from the step lines
fn command_lines(steps: &str) -> Vec<&str> {
    steps
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("```"))
        .map(|line| match LIST_MARKER.find(line) {
            Some(marker) => line[marker.end()..].trim_start(),
            None => line,
        })
        .filter(|line| !line.is_empty())
        .collect()
}

/// Build the script executed for `case`
pub fn build_command(case: &TestCase, ctx: &CommandContext<'_>) -> AppResult<String> {
    let lines = command_lines(&case.steps);
    if lines.is_empty() {
        return Err(AppError::InvalidSteps(format!(
            "case {} has no executable steps",
            case.id
        )));
    }

    let test_data = test_data_path(case, ctx);
    let mut missing = Vec::new();

    let body = lines.join("\n");
    let script = PLACEHOLDER.replace_all(&body, |caps: &Captures<'_>| {
        let key = &caps[1];
        let value = match key {
            "test_data" => Some(test_data.as_str()),
            "dataset" => Some(ctx.dataset),
            "task_id" => Some(ctx.task_id),
            "case_id" => Some(case.id.as_str()),
            other => case.parameters.get(other).map(String::as_str),
        };
        match value {
            Some(v) => v.to_string(),
            None => {
                missing.push(key.to_string());
                caps[0].to_string()
            }
        }
    });

    if !missing.is_empty() {
        return Err(AppError::InvalidSteps(format!(
            "unresolved placeholders: {}",
            missing.join(", ")
        )));
    }

    Ok(format!("set -e\n{}", script))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::models::CaseStatus;

    fn case(steps: &str, test_data_ref: Option<&str>) -> TestCase {
        TestCase {
            id: "CASE_1".to_string(),
            seq: 1,
            task_id: "TASK_1".to_string(),
            name: "n".to_string(),
            purpose: String::new(),
            steps: steps.to_string(),
            expected_result: String::new(),
            validation_method: String::new(),
            test_data_ref: test_data_ref.map(str::to_string),
            parameters: BTreeMap::from([("threshold".to_string(), "0.5".to_string())]),
            status: CaseStatus::Pending,
            actual_output: None,
            last_executed: None,
            created_at: Utc::now(),
        }
    }

    const CTX: CommandContext<'static> = CommandContext {
        task_id: "TASK_1",
        dataset: "/data",
    };

    #[test]
    fn test_substitutes_placeholders() {
        let script = build_command(
            &case("run --input {{ test_data }} --t {{threshold}} --id {{case_id}}", Some("images")),
            &CTX,
        )
        .unwrap();
        assert_eq!(
            script,
            "set -e\nrun --input /data/images --t 0.5 --id CASE_1"
        );
    }

    #[test]
    fn test_strips_list_markers_and_comments() {
        let steps = "1. cd {{dataset}}\n# prepare\n- ls -la\n$ ./run.sh\n\n```";
        let script = build_command(&case(steps, None), &CTX).unwrap();
        assert_eq!(script, "set -e\ncd /data\nls -la\n./run.sh");
    }

    #[test]
    fn test_absolute_test_data_is_kept() {
        assert_eq!(test_data_path(&case("x", Some("/mnt/other")), &CTX), "/mnt/other");
        assert_eq!(test_data_path(&case("x", None), &CTX), "/data");
    }

    #[test]
    fn test_unresolved_placeholder_is_invalid() {
        let err = build_command(&case("run {{missing}}", None), &CTX).unwrap_err();
        assert_eq!(err.error_code(), "InvalidSteps");
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_empty_steps_are_invalid() {
        let err = build_command(&case("  \n# only a comment\n", None), &CTX).unwrap_err();
        assert_eq!(err.error_code(), "InvalidSteps");
    }
}
