//! Parsers for analyzer output
//!
//! Two shapes are accepted: a JSON array of [`TestCaseSpec`] objects, or the
//! field-prefixed listing
//!
//! ```text
//! ## Test case 1: Default threshold
//! - Purpose: check the default detection threshold
//! - Steps: run --threshold 0.5 --input {{test_data}}
//! - Expected result: exit code 0
//! - Validation method: exit_code == 0
//! ```
//!
//! Lines that carry no field prefix continue the previous field.

use std::sync::LazyLock;

use regex::Regex;

use super::TestCaseSpec;
use crate::error::{AppError, AppResult};

static CASE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:#+\s*)?(?i:test\s*case|测试用例)\s*(\d+)\s*[:：.]?\s*(.*)$")
        .expect("valid case header regex")
});

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Name,
    Purpose,
    Steps,
    Expected,
    Validation,
    TestData,
}

const FIELD_PREFIXES: &[(&str, Field)] = &[
    ("name", Field::Name),
    ("测试名称", Field::Name),
    ("purpose", Field::Purpose),
    ("测试目的", Field::Purpose),
    ("steps", Field::Steps),
    ("测试步骤", Field::Steps),
    ("expected result", Field::Expected),
    ("预期结果", Field::Expected),
    ("validation method", Field::Validation),
    ("验证方法", Field::Validation),
    ("test data", Field::TestData),
    ("测试数据", Field::TestData),
];

/// Split `line` into a known field and its inline value
fn field_line(line: &str) -> Option<(Field, &str)> {
    let body = line.trim_start_matches(['-', '*']).trim_start();
    let (key, value) = body.split_once([':', '：'])?;
    let key = key.trim().to_lowercase();

    FIELD_PREFIXES
        .iter()
        .find(|(prefix, _)| key == *prefix)
        .map(|(_, field)| (*field, value.trim()))
}

fn push_text(target: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push('\n');
    }
    target.push_str(text);
}

fn slot(case: &mut TestCaseSpec, field: Field) -> &mut String {
    match field {
        Field::Name => &mut case.name,
        Field::Purpose => &mut case.purpose,
        Field::Steps => &mut case.steps,
        Field::Expected => &mut case.expected_result,
        Field::Validation => &mut case.validation_method,
        Field::TestData => case.test_data_ref.get_or_insert_with(String::new),
    }
}

/// Parse the field-prefixed listing format
pub fn parse_listing(text: &str) -> Vec<TestCaseSpec> {
    let mut cases = Vec::new();
    let mut current: Option<TestCaseSpec> = None;
    let mut field: Option<Field> = None;

    for raw in text.lines() {
        let line = raw.trim();

        if let Some(caps) = CASE_HEADER.captures(line) {
            if let Some(done) = current.take() {
                cases.push(done);
            }
            let name = caps.get(2).map_or("", |m| m.as_str()).trim();
            current = Some(TestCaseSpec {
                name: name.to_string(),
                ..Default::default()
            });
            field = None;
            continue;
        }

        let Some(case) = current.as_mut() else {
            continue;
        };

        if let Some((f, value)) = field_line(line) {
            push_text(slot(case, f), value);
            field = Some(f);
        } else if let Some(f) = field {
            if !line.is_empty() {
                push_text(slot(case, f), line);
            }
        }
    }

    if let Some(done) = current {
        cases.push(done);
    }

    cases
}

/// Fill in names and trim blank optional fields
fn normalize(mut cases: Vec<TestCaseSpec>) -> Vec<TestCaseSpec> {
    for (idx, case) in cases.iter_mut().enumerate() {
        if case.name.trim().is_empty() {
            case.name = format!("Test case {}", idx + 1);
        }
        if case
            .test_data_ref
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
        {
            case.test_data_ref = None;
        }
    }
    cases
}

/// Parse analyzer stdout in either accepted shape
pub fn parse_output(text: &str) -> AppResult<Vec<TestCaseSpec>> {
    let trimmed = text.trim();

    if trimmed.starts_with('[') {
        let cases: Vec<TestCaseSpec> = serde_json::from_str(trimmed)
            .map_err(|e| AppError::AnalyzerFailure(format!("malformed JSON output: {}", e)))?;
        return Ok(normalize(cases));
    }

    Ok(normalize(parse_listing(trimmed)))
}
