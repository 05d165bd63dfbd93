use collect_core::{CoreError, Tier};
use thiserror::Error;
use uuid::Uuid;

/// Configuration problems detected synchronously at dispatch time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Arena not registered: {0}")]
    ArenaNotRegistered(String),

    #[error("Duplicate arena descriptor for platform: {0}")]
    DuplicatePlatform(String),

    #[error("'{label}' is a grouping label, not a platform (use one of: {})", .platforms.join(", "))]
    GroupLabelKey {
        label: String,
        platforms: Vec<String>,
    },

    #[error("Arena {platform} does not support tier {tier} (supported: {})", tier_list(.supported))]
    UnsupportedTier {
        platform: String,
        tier: Tier,
        supported: Vec<Tier>,
    },

    #[error("Unknown tier '{value}' for arena {platform}")]
    InvalidTier { platform: String, value: String },

    #[error("Arena {0} has no capability matching the specification's terms or actors")]
    MissingCapability(String),

    #[error("No collector registered for arena {0}")]
    NoCollector(String),

    #[error("Duplicate arena entry: {0}")]
    DuplicateEntry(String),

    #[error("Invalid arena configuration: {0}")]
    InvalidShape(String),
}

impl ConfigurationError {
    pub fn platform(&self) -> Option<&str> {
        match self {
            Self::ArenaNotRegistered(p)
            | Self::DuplicatePlatform(p)
            | Self::MissingCapability(p)
            | Self::NoCollector(p)
            | Self::DuplicateEntry(p) => Some(p),
            Self::UnsupportedTier { platform, .. } | Self::InvalidTier { platform, .. } => {
                Some(platform)
            }
            Self::GroupLabelKey { .. } | Self::InvalidShape(_) => None,
        }
    }
}

fn tier_list(tiers: &[Tier]) -> String {
    tiers.iter().map(Tier::as_str).collect::<Vec<_>>().join(", ")
}

fn error_list(errors: &[ConfigurationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("No credential available for platform {0}")]
    NoCredentialAvailable(String),

    #[error("Unknown credential: {0}")]
    UnknownCredential(Uuid),
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration rejected: {}", error_list(.0))]
    Configuration(Vec<ConfigurationError>),

    #[error("Specification not found: {0}")]
    SpecificationNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Run {0} has already finished")]
    RunFinished(Uuid),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),
}

impl From<ConfigurationError> for OrchestratorError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(vec![err])
    }
}

impl From<CoreError> for OrchestratorError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(message) => Self::Validation(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
