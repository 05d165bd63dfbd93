mod content_repository;
mod run_repository;
mod task_repository;

pub use content_repository::*;
pub use run_repository::*;
pub use task_repository::*;
