use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::arena::{Capability, Tier};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl TaskStatus {
    pub const NON_TERMINAL: [TaskStatus; 2] = [TaskStatus::Pending, TaskStatus::Running];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "timed_out" => Some(Self::TimedOut),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured classification of why a task did not complete.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    RateLimited,
    AuthError,
    UpstreamUnavailable,
    MalformedQuery,
    CapabilityNotSupported,
    NoCredentialAvailable,
    TimedOut,
    Cancelled,
    Internal,
}

impl TaskErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::AuthError => "auth_error",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::MalformedQuery => "malformed_query",
            Self::CapabilityNotSupported => "capability_not_supported",
            Self::NoCredentialAvailable => "no_credential_available",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rate_limited" => Some(Self::RateLimited),
            "auth_error" => Some(Self::AuthError),
            "upstream_unavailable" => Some(Self::UpstreamUnavailable),
            "malformed_query" => Some(Self::MalformedQuery),
            "capability_not_supported" => Some(Self::CapabilityNotSupported),
            "no_credential_available" => Some(Self::NoCredentialAvailable),
            "timed_out" => Some(Self::TimedOut),
            "cancelled" => Some(Self::Cancelled),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

/// Dedup counters accumulated by a worker.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct TaskCounters {
    pub records_admitted: u64,
    pub duplicates_rejected: u64,
    pub near_duplicates: u64,
}

/// Unit of work for one arena and one capability within a run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CollectionTask {
    pub id: Uuid,
    pub run_id: Uuid,
    pub platform: String,
    pub capability: Capability,
    pub tier: Tier,
    pub status: TaskStatus,
    pub dispatched_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub counters: TaskCounters,
    pub last_error: Option<TaskError>,
}

impl CollectionTask {
    pub fn new(run_id: Uuid, platform: impl Into<String>, capability: Capability, tier: Tier) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            platform: platform.into(),
            capability,
            tier,
            status: TaskStatus::Pending,
            dispatched_at: Utc::now(),
            completed_at: None,
            counters: TaskCounters::default(),
            last_error: None,
        }
    }
}
