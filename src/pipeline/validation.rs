//! Validation method evaluation
//!
//! A validation method is a list of clauses joined by `&&` or newlines:
//!
//! ```text
//! exit_code == 0
//! stdout contains "detections: 3"
//! stderr is empty && output matches /score=0\.[5-9]/
//! ```
//!
//! Text that does not parse as clauses (analyzer prose such as "check the
//! output image") is judged by `exit_code == 0`.

use std::sync::LazyLock;

use regex::Regex;

use crate::engine::ExecOutput;

static EXIT_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:exit[_ ]?code)\s*(==|!=|<=|>=|<|>|=)\s*(-?\d+)$")
        .expect("valid exit clause regex")
});

static STREAM_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?i:(stdout|stderr|output))\s+(?i:(not\s+contains|contains|equals|matches|is\s+not\s+empty|is\s+empty))\s*(.*)$",
    )
    .expect("valid stream clause regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "==" | "=" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    fn holds(self, left: i64, right: i64) -> bool {
        match self {
            Self::Eq => left == right,
            Self::Ne => left != right,
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Gt => left > right,
            Self::Ge => left >= right,
        }
    }
}

/// One parsed check
#[derive(Debug, Clone)]
pub enum Clause {
    ExitCode(Comparison, i64),
    Contains(Stream, String),
    NotContains(Stream, String),
    Equals(Stream, String),
    Matches(Stream, Regex),
    IsEmpty(Stream),
    IsNotEmpty(Stream),
}

/// Outcome of validating one execution
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub passed: bool,
    pub summary: String,
}

fn unquote(arg: &str) -> Option<String> {
    let arg = arg.trim();
    let quoted = arg.len() >= 2
        && ((arg.starts_with('"') && arg.ends_with('"'))
            || (arg.starts_with('\'') && arg.ends_with('\'')));
    quoted.then(|| arg[1..arg.len() - 1].to_string())
}

fn pattern(arg: &str) -> Option<Regex> {
    let arg = arg.trim();
    let source = if arg.len() >= 2 && arg.starts_with('/') && arg.ends_with('/') {
        arg[1..arg.len() - 1].to_string()
    } else {
        unquote(arg)?
    };
    Regex::new(&source).ok()
}

fn parse_clause(text: &str) -> Option<Clause> {
    if let Some(caps) = EXIT_CLAUSE.captures(text) {
        let op = Comparison::parse(&caps[1])?;
        let value = caps[2].parse().ok()?;
        return Some(Clause::ExitCode(op, value));
    }

    let caps = STREAM_CLAUSE.captures(text)?;
    let stream = match caps[1].to_ascii_lowercase().as_str() {
        "stdout" => Stream::Stdout,
        "stderr" => Stream::Stderr,
        _ => Stream::Output,
    };
    let operator = caps[2]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();
    let arg = &caps[3];

    match operator.as_str() {
        "contains" => Some(Clause::Contains(stream, unquote(arg)?)),
        "not contains" => Some(Clause::NotContains(stream, unquote(arg)?)),
        "equals" => Some(Clause::Equals(stream, unquote(arg)?)),
        "matches" => Some(Clause::Matches(stream, pattern(arg)?)),
        "is empty" if arg.trim().is_empty() => Some(Clause::IsEmpty(stream)),
        "is not empty" if arg.trim().is_empty() => Some(Clause::IsNotEmpty(stream)),
        _ => None,
    }
}

/// Split on `&&` and newlines outside quotes
fn split_clauses(method: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = method.chars().peekable();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '&') if chars.peek() == Some(&'&') => {
                chars.next();
                clauses.push(std::mem::take(&mut current));
            }
            (None, '\n') => clauses.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    clauses.push(current);

    clauses
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Parse a validation method. `None` means fall back to `exit_code == 0`.
pub fn parse(method: &str) -> Option<Vec<(String, Clause)>> {
    let texts = split_clauses(method);
    if texts.is_empty() {
        return None;
    }
    texts
        .into_iter()
        .map(|text| parse_clause(&text).map(|clause| (text, clause)))
        .collect()
}

fn stream_text(output: &ExecOutput, stream: Stream) -> String {
    match stream {
        Stream::Stdout => output.stdout.clone(),
        Stream::Stderr => output.stderr.clone(),
        Stream::Output => output.combined(),
    }
}

fn holds(clause: &Clause, output: &ExecOutput) -> bool {
    match clause {
        Clause::ExitCode(op, value) => op.holds(output.exit_code, *value),
        Clause::Contains(s, needle) => stream_text(output, *s).contains(needle.as_str()),
        Clause::NotContains(s, needle) => !stream_text(output, *s).contains(needle.as_str()),
        Clause::Equals(s, expected) => stream_text(output, *s).trim() == expected.trim(),
        Clause::Matches(s, re) => re.is_match(&stream_text(output, *s)),
        Clause::IsEmpty(s) => stream_text(output, *s).trim().is_empty(),
        Clause::IsNotEmpty(s) => !stream_text(output, *s).trim().is_empty(),
    }
}

/// Judge one execution against a validation method
pub fn evaluate(method: &str, output: &ExecOutput) -> Verdict {
    let Some(clauses) = parse(method) else {
        let passed = output.exit_code == 0;
        let summary = if passed {
            "Passed: exit code 0".to_string()
        } else {
            format!("Failed: exit code {}", output.exit_code)
        };
        return Verdict { passed, summary };
    };

    let failed: Vec<&str> = clauses
        .iter()
        .filter(|(_, clause)| !holds(clause, output))
        .map(|(text, _)| text.as_str())
        .collect();

    if failed.is_empty() {
        Verdict {
            passed: true,
            summary: format!("Passed: {} of {} checks", clauses.len(), clauses.len()),
        }
    } else {
        Verdict {
            passed: false,
            summary: format!(
                "Failed: {} (exit code {})",
                failed.join("; "),
                output.exit_code
            ),
        }
    }
}
