use std::sync::Arc;

use events::ProgressBroadcaster;
use orchestrator::{ArenaRegistry, CredentialPool, Dispatcher, SpecificationSource};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn registry(&self) -> &Arc<ArenaRegistry> {
        self.dispatcher.registry()
    }

    pub fn progress(&self) -> &ProgressBroadcaster {
        self.dispatcher.progress()
    }

    pub fn credentials(&self) -> &CredentialPool {
        self.dispatcher.credentials()
    }

    pub fn specifications(&self) -> &Arc<dyn SpecificationSource> {
        self.dispatcher.specifications()
    }
}
