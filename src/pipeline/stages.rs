//! Stage state machines
//!
//! Each stage has a fixed set of steps and a transition function. The
//! accompanying run struct carries what the steps produced so far and the
//! error that sent the run down its failure branch.

use std::fmt;

use crate::{
    analyzer::TestCaseSpec,
    engine::ExecOutput,
    error::AppError,
    models::{ExecutionResult, TestCase},
    pipeline::validation::Verdict,
};

/// Steps of the analysis stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStep {
    LoadDocument,
    Generate,
    Persist,
    Done,
    Failed,
}

impl AnalysisStep {
    /// Successor after the current step succeeded or failed
    pub fn next(self, succeeded: bool) -> Self {
        match (self, succeeded) {
            (Self::Done, _) => Self::Done,
            (Self::Failed, _) => Self::Failed,
            (_, false) => Self::Failed,
            (Self::LoadDocument, true) => Self::Generate,
            (Self::Generate, true) => Self::Persist,
            (Self::Persist, true) => Self::Done,
        }
    }

    pub fn is_final(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for AnalysisStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LoadDocument => "load_document",
            Self::Generate => "generate",
            Self::Persist => "persist",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Accumulated state of one analysis run
#[derive(Debug)]
pub struct AnalysisRun {
    pub task_id: String,
    pub step: AnalysisStep,
    pub document_text: Option<String>,
    pub specs: Vec<TestCaseSpec>,
    pub cases: Vec<TestCase>,
    pub error: Option<AppError>,
}

impl AnalysisRun {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            step: AnalysisStep::LoadDocument,
            document_text: None,
            specs: Vec::new(),
            cases: Vec::new(),
            error: None,
        }
    }

    pub fn advance(&mut self) {
        self.step = self.step.next(true);
    }

    pub fn fail(&mut self, error: AppError) {
        self.error = Some(error);
        self.step = self.step.next(false);
    }
}

/// Steps of a single case execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseStep {
    Start,
    BuildCommand,
    Execute,
    Validate,
    Save,
    Done,
}

impl CaseStep {
    /// Successor after the current step succeeded or hit an infrastructure
    /// error. Failed command building or execution skips validation and goes
    /// straight to saving a failed verdict.
    pub fn next(self, succeeded: bool) -> Self {
        match (self, succeeded) {
            (Self::Start, _) => Self::BuildCommand,
            (Self::BuildCommand, true) => Self::Execute,
            (Self::Execute, true) => Self::Validate,
            (Self::BuildCommand | Self::Execute, false) => Self::Save,
            (Self::Validate, _) => Self::Save,
            (Self::Save | Self::Done, _) => Self::Done,
        }
    }
}

/// Accumulated state of one case execution
#[derive(Debug)]
pub struct CaseRun {
    pub case: TestCase,
    pub step: CaseStep,
    pub command: Option<String>,
    pub output: Option<ExecOutput>,
    pub verdict: Option<Verdict>,
    /// Infrastructure failure recorded on the result instead of a verdict
    pub infra_error: Option<AppError>,
    pub result: Option<ExecutionResult>,
}

impl CaseRun {
    pub fn new(case: TestCase) -> Self {
        Self {
            case,
            step: CaseStep::Start,
            command: None,
            output: None,
            verdict: None,
            infra_error: None,
            result: None,
        }
    }

    pub fn advance(&mut self) {
        self.step = self.step.next(true);
    }

    pub fn fail(&mut self, error: AppError) {
        self.infra_error = Some(error);
        self.step = self.step.next(false);
    }

    /// Final pass flag and one-line summary for the result row
    pub fn outcome(&self) -> (bool, String) {
        match (&self.infra_error, &self.verdict) {
            (Some(err), _) => (false, err.log_entry()),
            (None, Some(verdict)) => (verdict.passed, verdict.summary.clone()),
            (None, None) => (false, "ExecError: no verdict was produced".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_happy_path() {
        let mut step = AnalysisStep::LoadDocument;
        let mut seen = vec![step];
        while !step.is_final() {
            step = step.next(true);
            seen.push(step);
        }
        assert_eq!(
            seen,
            vec![
                AnalysisStep::LoadDocument,
                AnalysisStep::Generate,
                AnalysisStep::Persist,
                AnalysisStep::Done
            ]
        );
    }

    #[test]
    fn test_analysis_failure_is_absorbing() {
        assert_eq!(AnalysisStep::Generate.next(false), AnalysisStep::Failed);
        assert_eq!(AnalysisStep::Failed.next(true), AnalysisStep::Failed);
        assert_eq!(AnalysisStep::Done.next(false), AnalysisStep::Done);
    }

    #[test]
    fn test_case_errors_skip_validation() {
        assert_eq!(CaseStep::Execute.next(false), CaseStep::Save);
        assert_eq!(CaseStep::BuildCommand.next(false), CaseStep::Save);
        assert_eq!(CaseStep::Execute.next(true), CaseStep::Validate);
        assert_eq!(CaseStep::Save.next(true), CaseStep::Done);
    }

    #[test]
    fn test_run_records_error() {
        let mut run = AnalysisRun::new("TASK_1");
        run.fail(AppError::DocumentNotFound("DOC_1".to_string()));
        assert_eq!(run.step, AnalysisStep::Failed);
        assert_eq!(run.error.unwrap().error_code(), "DocumentNotFound");
    }
}
