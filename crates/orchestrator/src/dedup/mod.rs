//! Record admission: identity, exact content and near-duplicate checks.

mod engine;
pub mod signature;

pub use engine::{Admission, DedupEngine};
