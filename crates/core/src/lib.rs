//! Domain types shared by every crate of the collection engine.

pub mod domain;
mod error;

pub use domain::*;
pub use error::CoreError;
