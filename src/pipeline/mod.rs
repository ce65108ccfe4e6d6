//! Workflow orchestration
//!
//! The [`Orchestrator`] owns the task state machine and sequences the
//! analyze, prepare, execute and report stages. The [`scheduler`] runs a
//! task's cases; [`stages`] holds the per-stage state machines.

pub mod command;
pub mod locks;
pub mod orchestrator;
pub mod scheduler;
pub mod stages;
pub mod validation;

pub use orchestrator::{ExecuteOptions, ExecutionScope, ExecutionTicket, Orchestrator, ResumeSummary};
pub use scheduler::{RunTotals, Scheduler};
