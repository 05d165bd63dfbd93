use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::arena::{ArenaConfig, Tier};
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Bounded date range, collected once.
    Batch,
    /// Recurring collection without a date range.
    Live,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Live => "live",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "batch" => Some(Self::Batch),
            "live" => Some(Self::Live),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, CoreError> {
        if from > to {
            return Err(CoreError::Validation(format!(
                "date range starts after it ends ({} > {})",
                from, to
            )));
        }
        Ok(Self { from, to })
    }
}

/// One research execution across a set of arenas.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CollectionRun {
    pub id: Uuid,
    pub specification_id: String,
    pub mode: RunMode,
    /// Global default tier requested at launch.
    pub tier: Tier,
    /// Launch-time overrides as canonicalized at the boundary.
    pub arena_overrides: ArenaConfig,
    pub date_range: Option<DateRange>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CollectionRun {
    pub fn new(specification_id: impl Into<String>, mode: RunMode, tier: Tier) -> Self {
        Self {
            id: Uuid::new_v4(),
            specification_id: specification_id.into(),
            mode,
            tier,
            arena_overrides: ArenaConfig::default(),
            date_range: None,
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn with_overrides(mut self, overrides: ArenaConfig) -> Self {
        self.arena_overrides = overrides;
        self
    }

    pub fn with_date_range(mut self, range: Option<DateRange>) -> Self {
        self.date_range = range;
        self
    }
}

/// What a researcher asks for when launching a collection.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LaunchRequest {
    pub specification_id: String,
    pub mode: RunMode,
    pub tier: Tier,
    #[serde(default)]
    pub arena_overrides: ArenaConfig,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub enabled_arenas: BTreeSet<String>,
    #[serde(default)]
    pub skip_invalid_arenas: bool,
}

impl LaunchRequest {
    pub fn new(specification_id: impl Into<String>, mode: RunMode, tier: Tier) -> Self {
        Self {
            specification_id: specification_id.into(),
            mode,
            tier,
            arena_overrides: ArenaConfig::default(),
            date_range: None,
            enabled_arenas: BTreeSet::new(),
            skip_invalid_arenas: false,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.specification_id.trim().is_empty() {
            return Err(CoreError::Validation(
                "specification_id cannot be empty".to_string(),
            ));
        }
        match (self.mode, &self.date_range) {
            (RunMode::Live, Some(_)) => Err(CoreError::Validation(
                "date_range is only allowed for batch runs".to_string(),
            )),
            (_, Some(range)) if range.from > range.to => Err(CoreError::Validation(
                "date range starts after it ends".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// The saved research specification a run executes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ResearchSpecification {
    pub id: String,
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default)]
    pub actors: Vec<String>,
    /// Saved per-arena tiers, keyed by platform.
    #[serde(default)]
    pub arena_tiers: ArenaConfig,
}
