mod error;
pub mod models;
mod pool;
pub mod repositories;

pub use error::*;
pub use models::{ContentRecordRow, DuplicateLinkRow, RunRow, TaskRow};
pub use pool::*;
pub use repositories::*;
pub use sqlx::SqlitePool;
