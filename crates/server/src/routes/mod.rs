pub mod arenas;
mod health;
pub mod runs;
pub mod sse;

pub use health::*;
