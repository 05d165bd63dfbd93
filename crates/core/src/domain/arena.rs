use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Access level gating which arenas and rate limits apply.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Medium,
    Premium,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Medium => "medium",
            Self::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Some(Self::Free),
            "medium" => Some(Self::Medium),
            "premium" => Some(Self::Premium),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    TermSearch,
    ActorSearch,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TermSearch => "term_search",
            Self::ActorSearch => "actor_search",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "term_search" => Some(Self::TermSearch),
            "actor_search" => Some(Self::ActorSearch),
            _ => None,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one external data source.
///
/// `platform` is the only identifier. `group` is a display label shared by
/// several platforms and must never be used as a key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ArenaDescriptor {
    pub platform: String,
    pub group: String,
    pub tiers: BTreeSet<Tier>,
    pub capabilities: BTreeSet<Capability>,
    #[serde(default)]
    pub requires_credential: bool,
}

impl ArenaDescriptor {
    pub fn new(platform: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            group: group.into(),
            tiers: BTreeSet::new(),
            capabilities: BTreeSet::new(),
            requires_credential: false,
        }
    }

    pub fn with_tiers(mut self, tiers: impl IntoIterator<Item = Tier>) -> Self {
        self.tiers.extend(tiers);
        self
    }

    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities.extend(capabilities);
        self
    }

    pub fn requiring_credential(mut self) -> Self {
        self.requires_credential = true;
        self
    }

    pub fn supports_tier(&self, tier: Tier) -> bool {
        self.tiers.contains(&tier)
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Per-arena override: an optional tier and an enablement flag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ArenaSetting {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ArenaSetting {
    pub fn tier(tier: Tier) -> Self {
        Self {
            tier: Some(tier),
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            tier: None,
            enabled: false,
        }
    }
}

impl Default for ArenaSetting {
    fn default() -> Self {
        Self {
            tier: None,
            enabled: true,
        }
    }
}

/// Canonical per-arena configuration keyed strictly by platform identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(transparent)]
pub struct ArenaConfig(BTreeMap<String, ArenaSetting>);

impl ArenaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, platform: impl Into<String>, setting: ArenaSetting) -> Self {
        self.insert(platform, setting);
        self
    }

    pub fn insert(&mut self, platform: impl Into<String>, setting: ArenaSetting) {
        self.0.insert(platform.into(), setting);
    }

    pub fn get(&self, platform: &str) -> Option<&ArenaSetting> {
        self.0.get(platform)
    }

    pub fn contains(&self, platform: &str) -> bool {
        self.0.contains_key(platform)
    }

    pub fn platforms(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArenaSetting)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, ArenaSetting)> for ArenaConfig {
    fn from_iter<I: IntoIterator<Item = (String, ArenaSetting)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parsing() {
        assert_eq!(Tier::parse("free"), Some(Tier::Free));
        assert_eq!(Tier::parse(" Medium "), Some(Tier::Medium));
        assert_eq!(Tier::parse("gold"), None);
        assert_eq!(Tier::Premium.as_str(), "premium");
    }

    #[test]
    fn test_descriptor_builders() {
        let arena = ArenaDescriptor::new("bluesky", "social_media")
            .with_tiers([Tier::Free])
            .with_capabilities([Capability::TermSearch, Capability::ActorSearch])
            .requiring_credential();

        assert!(arena.supports_tier(Tier::Free));
        assert!(!arena.supports_tier(Tier::Premium));
        assert!(arena.supports(Capability::ActorSearch));
        assert!(arena.requires_credential);
    }

    #[test]
    fn test_arena_setting_enabled_defaults_true() {
        let setting: ArenaSetting = serde_json::from_str(r#"{"tier":"medium"}"#).unwrap();
        assert!(setting.enabled);
        assert_eq!(setting.tier, Some(Tier::Medium));
    }

    #[test]
    fn test_arena_config_serializes_as_map() {
        let config = ArenaConfig::new().with("reddit", ArenaSetting::tier(Tier::Free));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["reddit"]["tier"], "free");
        assert_eq!(json["reddit"]["enabled"], true);
    }
}
