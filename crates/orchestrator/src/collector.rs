//! Contract between the orchestrator and per-platform collectors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use collect_core::{Capability, DateRange, RawRecord, Secret, TaskError, TaskErrorKind, Tier};
use futures::stream::BoxStream;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Records produced by a collector, possibly ending in an error.
pub type RecordStream = BoxStream<'static, Result<RawRecord, CollectorError>>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollectorError {
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("{capability} is not supported by {platform}")]
    CapabilityNotSupported {
        platform: String,
        capability: Capability,
    },
}

impl CollectorError {
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    pub fn kind(&self) -> TaskErrorKind {
        match self {
            Self::RateLimited { .. } => TaskErrorKind::RateLimited,
            Self::AuthError(_) => TaskErrorKind::AuthError,
            Self::UpstreamUnavailable(_) => TaskErrorKind::UpstreamUnavailable,
            Self::MalformedQuery(_) => TaskErrorKind::MalformedQuery,
            Self::CapabilityNotSupported { .. } => TaskErrorKind::CapabilityNotSupported,
        }
    }

    /// Errors that say something about the credential used.
    pub fn concerns_credential(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::AuthError(_))
    }
}

impl From<&CollectorError> for TaskError {
    fn from(err: &CollectorError) -> Self {
        TaskError::new(err.kind(), err.to_string())
    }
}

/// Per-invocation inputs shared by both capabilities.
#[derive(Debug, Clone)]
pub struct CollectContext {
    pub tier: Tier,
    pub credential: Option<Secret>,
    /// Triggered when the task is cancelled or timed out.
    pub cancel: CancellationToken,
}

/// One platform's data source.
///
/// Both capabilities default to [`CollectorError::CapabilityNotSupported`];
/// a collector overrides the ones its arena declares.
#[async_trait]
pub trait Collector: Send + Sync {
    fn platform(&self) -> &str;

    async fn collect_by_terms(
        &self,
        terms: &[String],
        date_range: Option<DateRange>,
        ctx: &CollectContext,
    ) -> Result<RecordStream, CollectorError> {
        let _ = (terms, date_range, ctx);
        Err(CollectorError::CapabilityNotSupported {
            platform: self.platform().to_string(),
            capability: Capability::TermSearch,
        })
    }

    async fn collect_by_actors(
        &self,
        actors: &[String],
        ctx: &CollectContext,
    ) -> Result<RecordStream, CollectorError> {
        let _ = (actors, ctx);
        Err(CollectorError::CapabilityNotSupported {
            platform: self.platform().to_string(),
            capability: Capability::ActorSearch,
        })
    }
}

/// Collectors keyed by platform.
#[derive(Clone, Default)]
pub struct CollectorSet {
    collectors: HashMap<String, Arc<dyn Collector>>,
}

impl CollectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, collector: Arc<dyn Collector>) -> Self {
        self.register(collector);
        self
    }

    /// Registers a collector, replacing any previous one for its platform.
    pub fn register(&mut self, collector: Arc<dyn Collector>) {
        self.collectors
            .insert(collector.platform().to_string(), collector);
    }

    pub fn get(&self, platform: &str) -> Option<Arc<dyn Collector>> {
        self.collectors.get(platform).cloned()
    }

    pub fn contains(&self, platform: &str) -> bool {
        self.collectors.contains_key(platform)
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

impl std::fmt::Debug for CollectorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut platforms: Vec<_> = self.collectors.keys().collect();
        platforms.sort();
        f.debug_struct("CollectorSet")
            .field("platforms", &platforms)
            .finish()
    }
}
