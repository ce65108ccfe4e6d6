//! Report synthesis
//!
//! [`summary`] recomputes counts and per-case details from persisted state;
//! [`render`] turns them into bytes in the requested format.

pub mod render;
pub mod summary;

pub use render::{ReportRenderer, TemplateRenderer};
pub use summary::{CaseDetail, ReportContext, TaskInfo, build_context, summarize};
