//! Progress events for collection runs
//!
//! This crate provides the per-run progress broadcaster and the event
//! types observers receive.

mod progress;
mod types;

pub use progress::{ProgressBroadcaster, RunSubscription, DEFAULT_LOG_CAPACITY};
pub use types::*;
