use std::sync::Arc;

use collect_core::{Capability, ResearchSpecification};

use crate::collector::{Collector, CollectorSet};
use crate::error::ConfigurationError;
use crate::tier::ResolvedArena;

/// One sub-job to persist and dispatch.
#[derive(Clone)]
pub(crate) struct PlannedTask {
    pub arena: ResolvedArena,
    pub capability: Capability,
    pub collector: Arc<dyn Collector>,
}

#[derive(Default)]
pub(crate) struct Plan {
    pub tasks: Vec<PlannedTask>,
    pub rejected: Vec<ConfigurationError>,
}

/// Capabilities the specification can drive, in dispatch order.
fn requested(specification: &ResearchSpecification) -> Vec<Capability> {
    let mut capabilities = Vec::with_capacity(2);
    if !specification.terms.is_empty() {
        capabilities.push(Capability::TermSearch);
    }
    if !specification.actors.is_empty() {
        capabilities.push(Capability::ActorSearch);
    }
    capabilities
}

/// One task per capability an arena both supports and has inputs for.
pub(crate) fn plan(
    arenas: Vec<ResolvedArena>,
    specification: &ResearchSpecification,
    collectors: &CollectorSet,
) -> Plan {
    let requested = requested(specification);
    let mut plan = Plan::default();

    for arena in arenas {
        let platform = arena.descriptor.platform.clone();
        let Some(collector) = collectors.get(&platform) else {
            plan.rejected.push(ConfigurationError::NoCollector(platform));
            continue;
        };

        let capabilities: Vec<_> = requested
            .iter()
            .copied()
            .filter(|c| arena.descriptor.supports(*c))
            .collect();
        if capabilities.is_empty() {
            plan.rejected
                .push(ConfigurationError::MissingCapability(platform));
            continue;
        }

        for capability in capabilities {
            plan.tasks.push(PlannedTask {
                arena: arena.clone(),
                capability,
                collector: collector.clone(),
            });
        }
    }

    plan
}
