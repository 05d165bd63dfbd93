use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One item as yielded by a collector, before normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RawRecord {
    /// Platform-native identifier, when the platform exposes one.
    pub platform_id: Option<String>,
    pub url: Option<String>,
    pub text: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
}

impl RawRecord {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_platform_id(mut self, id: impl Into<String>) -> Self {
        self.platform_id = Some(id.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// Identity, content and near-duplicate signatures of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecordSignatures {
    pub identity_hash: String,
    pub content_hash: String,
    pub simhash: u64,
}

/// A normalized, admitted unit of collected data.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContentRecord {
    pub id: Uuid,
    pub run_id: Uuid,
    pub task_id: Uuid,
    /// Grouping label of the source arena, for display.
    pub arena: String,
    pub platform: String,
    #[serde(flatten)]
    pub signatures: RecordSignatures,
    /// Set when the record was admitted as a near-duplicate of an earlier one.
    pub near_duplicate_of: Option<Uuid>,
    pub url: Option<String>,
    pub platform_id: Option<String>,
    pub author: Option<String>,
    pub text: String,
    pub published_at: Option<DateTime<Utc>>,
    pub collected_at: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
}

impl ContentRecord {
    pub fn from_raw(
        run_id: Uuid,
        task_id: Uuid,
        arena: impl Into<String>,
        platform: impl Into<String>,
        signatures: RecordSignatures,
        raw: RawRecord,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            task_id,
            arena: arena.into(),
            platform: platform.into(),
            signatures,
            near_duplicate_of: None,
            url: raw.url,
            platform_id: raw.platform_id,
            author: raw.author,
            text: raw.text,
            published_at: raw.published_at,
            collected_at: Utc::now(),
            metadata: raw.metadata,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKind {
    Content,
    NearDuplicate,
}

impl DuplicateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::NearDuplicate => "near_duplicate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "content" => Some(Self::Content),
            "near_duplicate" => Some(Self::NearDuplicate),
            _ => None,
        }
    }
}

/// Backward reference from a withheld record to the stored original.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DuplicateLink {
    pub id: Uuid,
    pub run_id: Uuid,
    pub original_record_id: Uuid,
    pub platform: String,
    pub identity_hash: String,
    pub kind: DuplicateKind,
    pub distance: Option<u32>,
    pub observed_at: DateTime<Utc>,
}
