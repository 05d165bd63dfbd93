use std::path::Path;

use anyhow::{Context, Result};
use collect_core::{ArenaDescriptor, ResearchSpecification, Secret};
use db::DatabaseConfig;
use orchestrator::{
    canonicalize_arena_config, ArenaRegistry, CredentialPolicy, CredentialPool, DedupConfig,
    DispatcherConfig, InMemorySpecifications,
};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "collectd.toml";
pub const DEFAULT_PORT: u16 = 3001;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CollectdConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub dispatcher: DispatcherConfig,
    pub dedup: DedupConfig,
    pub credentials: CredentialsConfig,
    pub arenas: Vec<ArenaDescriptor>,
    pub specifications: Vec<SpecificationEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CredentialsConfig {
    #[serde(flatten)]
    pub policy: CredentialPolicy,
    #[serde(default)]
    pub entries: Vec<CredentialEntry>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialEntry {
    pub platform: String,
    pub secret: Secret,
}

/// `arena_tiers` may use any of the accepted arena-config shapes, so it is
/// kept raw until the registry exists.
#[derive(Debug, Deserialize)]
pub struct SpecificationEntry {
    pub id: String,
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default)]
    pub actors: Vec<String>,
    #[serde(default)]
    pub arena_tiers: Option<toml::Value>,
}

impl CollectdConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn registry(&self) -> Result<ArenaRegistry> {
        ArenaRegistry::new(self.arenas.iter().cloned()).context("Invalid [[arenas]] section")
    }

    pub fn credential_pool(&self) -> CredentialPool {
        let pool = CredentialPool::new(self.credentials.policy.clone());
        for entry in &self.credentials.entries {
            pool.add(entry.platform.clone(), entry.secret.clone());
        }
        pool
    }

    pub fn specifications(&self, registry: &ArenaRegistry) -> Result<InMemorySpecifications> {
        let source = InMemorySpecifications::new();
        for entry in &self.specifications {
            let arena_tiers = match &entry.arena_tiers {
                Some(raw) => {
                    let value = serde_json::to_value(raw)?;
                    canonicalize_arena_config(&value, registry)
                        .with_context(|| format!("Invalid arena_tiers for specification {}", entry.id))?
                }
                None => Default::default(),
            };
            source.insert(ResearchSpecification {
                id: entry.id.clone(),
                terms: entry.terms.clone(),
                actors: entry.actors.clone(),
                arena_tiers,
            });
        }
        Ok(source)
    }
}

pub const TEMPLATE: &str = r#"[server]
port = 3001

[database]
url = "sqlite:collectd.db"

[dispatcher]
max_workers = 8
task_timeout_secs = 1800
sweep_interval_secs = 30
progress_interval = 25
skip_invalid_arenas = false

[dispatcher.platform_timeouts]

[dedup]
shingle_size = 3
window_size = 1000
flag_distance = 3

[credentials]
max_consecutive_errors = 3
rate_limit_backoff_secs = 30
max_backoff_secs = 900

[[arenas]]
platform = "reddit"
group = "social_media"
tiers = ["free", "medium"]
capabilities = ["term_search", "actor_search"]
requires_credential = true

[[arenas]]
platform = "gdelt"
group = "news_media"
tiers = ["free"]
capabilities = ["term_search"]

[[specifications]]
id = "example"
terms = ["climate"]
arena_tiers = { reddit = "free", gdelt = "free" }
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use collect_core::Tier;
    use orchestrator::SpecificationSource;
    use std::time::Duration;

    #[tokio::test]
    async fn test_template_parses() {
        let config = CollectdConfig::parse(TEMPLATE).unwrap();

        assert_eq!(config.server.port, 3001);
        assert_eq!(config.dispatcher.max_workers, 8);
        assert_eq!(config.arenas.len(), 2);

        let registry = config.registry().unwrap();
        let specifications = config.specifications(&registry).unwrap();
        assert!(specifications.get("example").await.unwrap().is_some());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = CollectdConfig::parse(
            r#"
            [dispatcher]
            max_workers = 2

            [credentials]
            max_consecutive_errors = 5

            [[credentials.entries]]
            platform = "reddit"
            secret = "s3cret"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.dispatcher.max_workers, 2);
        assert_eq!(config.dispatcher.task_timeout, Duration::from_secs(1800));
        assert_eq!(config.credentials.policy.max_consecutive_errors, 5);
        assert_eq!(config.credentials.policy.rate_limit_backoff, Duration::from_secs(30));
        assert_eq!(config.credentials.entries.len(), 1);
        assert_eq!(config.credential_pool().status("reddit").len(), 1);
    }

    #[tokio::test]
    async fn test_specification_tiers_are_canonicalized() {
        let config = CollectdConfig::parse(
            r#"
            [[arenas]]
            platform = "reddit"
            group = "social_media"
            tiers = ["free", "medium"]
            capabilities = ["term_search"]

            [[specifications]]
            id = "s"
            terms = ["x"]
            arena_tiers = [{ platform = "reddit", tier = "medium" }]
            "#,
        )
        .unwrap();

        let registry = config.registry().unwrap();
        let specifications = config.specifications(&registry).unwrap();
        let spec = specifications.get("s").await.unwrap().unwrap();
        assert_eq!(spec.arena_tiers.get("reddit").and_then(|s| s.tier), Some(Tier::Medium));
    }

    #[test]
    fn test_group_label_in_specification_is_rejected() {
        let config = CollectdConfig::parse(
            r#"
            [[arenas]]
            platform = "reddit"
            group = "social_media"
            tiers = ["free"]
            capabilities = ["term_search"]

            [[specifications]]
            id = "s"
            arena_tiers = { social_media = "free" }
            "#,
        )
        .unwrap();

        let registry = config.registry().unwrap();
        assert!(config.specifications(&registry).is_err());
    }
}
