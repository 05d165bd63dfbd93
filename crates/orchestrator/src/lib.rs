pub mod arena_config;
pub mod collector;
pub mod config;
pub mod credentials;
pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod resources;
pub mod specification;
pub mod state_machine;
pub mod tier;

pub use arena_config::canonicalize_arena_config;
pub use collector::{CollectContext, Collector, CollectorError, CollectorSet, RecordStream};
pub use config::{CredentialPolicy, DedupConfig, DispatcherConfig};
pub use credentials::CredentialPool;
pub use dedup::{Admission, DedupEngine};
pub use dispatcher::{
    Dispatcher, DispatcherBuilder, LaunchOutcome, RunSummary, RunTotals, SkippedArena,
    SweepReport,
};
pub use error::{ConfigurationError, CredentialError, OrchestratorError, Result};
pub use registry::ArenaRegistry;
pub use resources::CredentialLease;
pub use specification::{InMemorySpecifications, SpecificationSource};
pub use state_machine::TaskStateMachine;
pub use tier::{ResolvedArena, TierLayers, TierResolution, TierResolver, TierSource};
