use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use collect_core::{ArenaConfig, ArenaDescriptor, Tier};
use serde::Serialize;

use crate::error::ConfigurationError;
use crate::registry::ArenaRegistry;

/// Which configuration layer decided an arena's tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TierSource {
    Launch,
    Specification,
    Default,
}

/// The three layers, highest precedence first.
#[derive(Debug, Clone, Copy)]
pub struct TierLayers<'a> {
    pub launch: &'a ArenaConfig,
    pub specification: &'a ArenaConfig,
    pub default_tier: Tier,
    /// Arenas switched on for the run without a per-arena entry.
    pub enabled: &'a BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedArena {
    pub descriptor: ArenaDescriptor,
    pub tier: Tier,
    pub source: TierSource,
}

#[derive(Debug, Clone, Default)]
pub struct TierResolution {
    pub resolved: Vec<ResolvedArena>,
    pub rejected: Vec<ConfigurationError>,
}

impl TierResolution {
    pub fn tiers(&self) -> HashMap<&str, Tier> {
        self.resolved
            .iter()
            .map(|r| (r.descriptor.platform.as_str(), r.tier))
            .collect()
    }
}

/// Computes the effective tier of every enabled arena of a run.
#[derive(Debug, Clone)]
pub struct TierResolver {
    registry: Arc<ArenaRegistry>,
}

impl TierResolver {
    pub fn new(registry: Arc<ArenaRegistry>) -> Self {
        Self { registry }
    }

    /// Launch entry, then specification entry, then the run default.
    pub fn effective_tier(
        launch: Option<Tier>,
        specification: Option<Tier>,
        default_tier: Tier,
    ) -> (Tier, TierSource) {
        match (launch, specification) {
            (Some(tier), _) => (tier, TierSource::Launch),
            (None, Some(tier)) => (tier, TierSource::Specification),
            (None, None) => (default_tier, TierSource::Default),
        }
    }

    fn is_enabled(platform: &str, layers: &TierLayers<'_>) -> bool {
        if let Some(setting) = layers.launch.get(platform) {
            return setting.enabled;
        }
        if let Some(setting) = layers.specification.get(platform) {
            return setting.enabled;
        }
        layers.enabled.contains(platform)
    }

    /// Resolves every arena named by any layer. Arenas absent from all of
    /// them are never dispatched.
    pub fn resolve(&self, layers: TierLayers<'_>) -> TierResolution {
        let candidates: BTreeSet<&str> = layers
            .launch
            .platforms()
            .chain(layers.specification.platforms())
            .chain(layers.enabled.iter().map(String::as_str))
            .collect();

        let mut resolution = TierResolution::default();
        for platform in candidates {
            if !Self::is_enabled(platform, &layers) {
                continue;
            }

            let Some(descriptor) = self.registry.get(platform) else {
                resolution
                    .rejected
                    .push(self.registry.unknown_key_error(platform));
                continue;
            };

            let (tier, source) = Self::effective_tier(
                layers.launch.get(platform).and_then(|s| s.tier),
                layers.specification.get(platform).and_then(|s| s.tier),
                layers.default_tier,
            );

            if !descriptor.supports_tier(tier) {
                resolution.rejected.push(ConfigurationError::UnsupportedTier {
                    platform: platform.to_string(),
                    tier,
                    supported: descriptor.tiers.iter().copied().collect(),
                });
                continue;
            }

            resolution.resolved.push(ResolvedArena {
                descriptor: descriptor.clone(),
                tier,
                source,
            });
        }

        resolution
    }
}
