mod arena;
mod credential;
mod record;
mod run;
mod task;

pub use arena::*;
pub use credential::*;
pub use record::*;
pub use run::*;
pub use task::*;
