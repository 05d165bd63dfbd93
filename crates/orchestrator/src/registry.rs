use std::collections::BTreeMap;

use collect_core::ArenaDescriptor;

use crate::error::ConfigurationError;

/// Known arenas keyed by platform identifier.
#[derive(Debug, Clone, Default)]
pub struct ArenaRegistry {
    arenas: BTreeMap<String, ArenaDescriptor>,
}

impl ArenaRegistry {
    /// Builds the registry, refusing two descriptors for one platform.
    pub fn new(
        descriptors: impl IntoIterator<Item = ArenaDescriptor>,
    ) -> Result<Self, ConfigurationError> {
        let mut arenas = BTreeMap::new();
        for descriptor in descriptors {
            let platform = descriptor.platform.clone();
            if platform.trim().is_empty() {
                return Err(ConfigurationError::InvalidShape(
                    "arena descriptor without a platform".to_string(),
                ));
            }
            if arenas.contains_key(&platform) {
                return Err(ConfigurationError::DuplicatePlatform(platform));
            }
            arenas.insert(platform, descriptor);
        }
        Ok(Self { arenas })
    }

    pub fn get(&self, platform: &str) -> Option<&ArenaDescriptor> {
        self.arenas.get(platform)
    }

    pub fn contains(&self, platform: &str) -> bool {
        self.arenas.contains_key(platform)
    }

    /// Descriptors sorted by platform.
    pub fn iter(&self) -> impl Iterator<Item = &ArenaDescriptor> {
        self.arenas.values()
    }

    pub fn len(&self) -> usize {
        self.arenas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arenas.is_empty()
    }

    pub fn platforms_in_group(&self, group: &str) -> Vec<String> {
        self.arenas
            .values()
            .filter(|a| a.group == group)
            .map(|a| a.platform.clone())
            .collect()
    }

    /// A key is rejected as a grouping label when it names a group but no platform.
    pub fn is_group_label(&self, key: &str) -> bool {
        !self.contains(key) && self.arenas.values().any(|a| a.group == key)
    }

    /// Classifies an unknown key for error reporting.
    pub fn unknown_key_error(&self, key: &str) -> ConfigurationError {
        if self.is_group_label(key) {
            ConfigurationError::GroupLabelKey {
                label: key.to_string(),
                platforms: self.platforms_in_group(key),
            }
        } else {
            ConfigurationError::ArenaNotRegistered(key.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collect_core::{Capability, Tier};

    fn news(platform: &str) -> ArenaDescriptor {
        ArenaDescriptor::new(platform, "news_media")
            .with_tiers([Tier::Free])
            .with_capabilities([Capability::TermSearch])
    }

    #[test]
    fn test_lookup_and_order() {
        let registry = ArenaRegistry::new([news("rss_feeds"), news("gdelt")]).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("gdelt").is_some());
        let order: Vec<_> = registry.iter().map(|a| a.platform.as_str()).collect();
        assert_eq!(order, vec!["gdelt", "rss_feeds"]);
    }

    #[test]
    fn test_duplicate_platform_rejected() {
        let err = ArenaRegistry::new([news("gdelt"), news("gdelt")]).unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicatePlatform("gdelt".to_string()));
    }

    #[test]
    fn test_group_label_detection() {
        let registry = ArenaRegistry::new([news("rss_feeds"), news("gdelt")]).unwrap();
        assert!(registry.is_group_label("news_media"));
        assert!(!registry.is_group_label("gdelt"));

        match registry.unknown_key_error("news_media") {
            ConfigurationError::GroupLabelKey { label, platforms } => {
                assert_eq!(label, "news_media");
                assert_eq!(platforms, vec!["gdelt".to_string(), "rss_feeds".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            registry.unknown_key_error("bluesky"),
            ConfigurationError::ArenaNotRegistered("bluesky".to_string())
        );
    }
}
