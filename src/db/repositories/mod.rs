//! Database repositories
//!
//! Repositories handle all direct database interactions.

pub mod document_repo;
pub mod report_repo;
pub mod result_repo;
pub mod task_repo;
pub mod test_case_repo;

pub use document_repo::DocumentRepository;
pub use report_repo::ReportRepository;
pub use result_repo::ResultRepository;
pub use task_repo::TaskRepository;
pub use test_case_repo::TestCaseRepository;
