//! Canonicalization of per-arena configuration at the input boundary.
//!
//! Accepted shapes, all normalized into [`ArenaConfig`] keyed by platform:
//!
//! - flat map: `{"reddit": "medium"}`
//! - map of objects: `{"reddit": {"tier": "medium", "enabled": true}}`
//! - list of objects: `[{"platform": "reddit", "tier": "medium"}]`
//!
//! Keys must be registered platforms. Group labels are refused with an
//! error naming the platforms they cover.

use collect_core::{ArenaConfig, ArenaSetting, Tier};
use serde_json::{Map, Value};

use crate::error::ConfigurationError;
use crate::registry::ArenaRegistry;

pub fn canonicalize_arena_config(
    value: &Value,
    registry: &ArenaRegistry,
) -> Result<ArenaConfig, ConfigurationError> {
    let mut config = ArenaConfig::new();

    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, entry) in map {
                let platform = validate_key(key, registry)?;
                let setting = parse_setting(&platform, entry)?;
                config.insert(platform, setting);
            }
        }
        Value::Array(items) => {
            for item in items {
                let Value::Object(fields) = item else {
                    return Err(ConfigurationError::InvalidShape(
                        "list entries must be objects".to_string(),
                    ));
                };
                let key = platform_field(fields)?;
                let platform = validate_key(key, registry)?;
                if config.contains(&platform) {
                    return Err(ConfigurationError::DuplicateEntry(platform));
                }
                let setting = parse_object(&platform, fields)?;
                config.insert(platform, setting);
            }
        }
        other => {
            return Err(ConfigurationError::InvalidShape(format!(
                "expected a map or a list, got {}",
                type_name(other)
            )))
        }
    }

    Ok(config)
}

fn validate_key(key: &str, registry: &ArenaRegistry) -> Result<String, ConfigurationError> {
    let key = key.trim();
    if registry.contains(key) {
        Ok(key.to_string())
    } else {
        Err(registry.unknown_key_error(key))
    }
}

fn platform_field(fields: &Map<String, Value>) -> Result<&str, ConfigurationError> {
    ["platform", "id"]
        .iter()
        .find_map(|name| fields.get(*name).and_then(Value::as_str))
        .ok_or_else(|| {
            ConfigurationError::InvalidShape("list entry without a platform field".to_string())
        })
}

fn parse_setting(platform: &str, entry: &Value) -> Result<ArenaSetting, ConfigurationError> {
    match entry {
        Value::Null => Ok(ArenaSetting::default()),
        Value::String(tier) => Ok(ArenaSetting::tier(parse_tier(platform, tier)?)),
        Value::Bool(enabled) => Ok(ArenaSetting {
            tier: None,
            enabled: *enabled,
        }),
        Value::Object(fields) => parse_object(platform, fields),
        other => Err(ConfigurationError::InvalidShape(format!(
            "setting for {platform} must be a tier, a flag or an object, got {}",
            type_name(other)
        ))),
    }
}

fn parse_object(
    platform: &str,
    fields: &Map<String, Value>,
) -> Result<ArenaSetting, ConfigurationError> {
    let tier = match fields.get("tier") {
        None | Some(Value::Null) => None,
        Some(Value::String(tier)) => Some(parse_tier(platform, tier)?),
        Some(other) => {
            return Err(ConfigurationError::InvalidTier {
                platform: platform.to_string(),
                value: other.to_string(),
            })
        }
    };

    let enabled = match fields.get("enabled") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(flag)) => *flag,
        Some(other) => {
            return Err(ConfigurationError::InvalidShape(format!(
                "enabled for {platform} must be a boolean, got {}",
                type_name(other)
            )))
        }
    };

    Ok(ArenaSetting { tier, enabled })
}

fn parse_tier(platform: &str, value: &str) -> Result<Tier, ConfigurationError> {
    Tier::parse(value).ok_or_else(|| ConfigurationError::InvalidTier {
        platform: platform.to_string(),
        value: value.to_string(),
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collect_core::{ArenaDescriptor, Capability};
    use serde_json::json;

    fn registry() -> ArenaRegistry {
        ArenaRegistry::new([
            ArenaDescriptor::new("reddit", "social_media")
                .with_tiers([Tier::Free, Tier::Medium])
                .with_capabilities([Capability::TermSearch]),
            ArenaDescriptor::new("rss_feeds", "news_media")
                .with_tiers([Tier::Free])
                .with_capabilities([Capability::TermSearch]),
            ArenaDescriptor::new("gdelt", "news_media")
                .with_tiers([Tier::Free])
                .with_capabilities([Capability::TermSearch]),
        ])
        .unwrap()
    }

    #[test]
    fn test_all_shapes_canonicalize_identically() {
        let registry = registry();
        let expected = ArenaConfig::new()
            .with("reddit", ArenaSetting::tier(Tier::Medium))
            .with("rss_feeds", ArenaSetting::disabled());

        let flat = json!({"reddit": "medium", "rss_feeds": false});
        let nested = json!({
            "reddit": {"tier": "medium"},
            "rss_feeds": {"enabled": false}
        });
        let list = json!([
            {"platform": "reddit", "tier": "medium", "enabled": true},
            {"id": "rss_feeds", "enabled": false}
        ]);

        for shape in [flat, nested, list] {
            assert_eq!(canonicalize_arena_config(&shape, &registry).unwrap(), expected);
        }
    }

    #[test]
    fn test_null_is_empty() {
        let config = canonicalize_arena_config(&Value::Null, &registry()).unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn test_group_label_key_is_rejected() {
        let err = canonicalize_arena_config(&json!({"news_media": "free"}), &registry())
            .unwrap_err();
        match err {
            ConfigurationError::GroupLabelKey { label, platforms } => {
                assert_eq!(label, "news_media");
                assert!(platforms.contains(&"gdelt".to_string()));
                assert!(platforms.contains(&"rss_feeds".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_platform_and_tier() {
        let registry = registry();
        assert_eq!(
            canonicalize_arena_config(&json!({"bluesky": "free"}), &registry).unwrap_err(),
            ConfigurationError::ArenaNotRegistered("bluesky".to_string())
        );
        assert_eq!(
            canonicalize_arena_config(&json!({"reddit": "gold"}), &registry).unwrap_err(),
            ConfigurationError::InvalidTier {
                platform: "reddit".to_string(),
                value: "gold".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_list_entries_rejected() {
        let value = json!([{"platform": "reddit"}, {"platform": "reddit", "tier": "free"}]);
        assert_eq!(
            canonicalize_arena_config(&value, &registry()).unwrap_err(),
            ConfigurationError::DuplicateEntry("reddit".to_string())
        );
    }

    #[test]
    fn test_scalar_input_rejected() {
        assert!(matches!(
            canonicalize_arena_config(&json!("reddit"), &registry()),
            Err(ConfigurationError::InvalidShape(_))
        ));
    }
}
