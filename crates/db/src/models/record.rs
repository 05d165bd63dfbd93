use collect_core::{ContentRecord, DuplicateKind, DuplicateLink, RecordSignatures};
use uuid::Uuid;

use super::{datetime_to_millis, millis_to_datetime, parse_uuid};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ContentRecordRow {
    pub id: String,
    pub run_id: String,
    pub task_id: String,
    pub arena: String,
    pub platform: String,
    pub identity_hash: String,
    pub content_hash: String,
    pub simhash: i64,
    pub near_duplicate_of: Option<String>,
    pub url: Option<String>,
    pub platform_id: Option<String>,
    pub author: Option<String>,
    pub text_content: String,
    pub published_at: Option<i64>,
    pub collected_at: i64,
    pub metadata: String,
}

impl ContentRecordRow {
    pub fn into_domain(self) -> ContentRecord {
        ContentRecord {
            id: parse_uuid(&self.id),
            run_id: parse_uuid(&self.run_id),
            task_id: parse_uuid(&self.task_id),
            arena: self.arena,
            platform: self.platform,
            signatures: RecordSignatures {
                identity_hash: self.identity_hash,
                content_hash: self.content_hash,
                // Stored bit-for-bit in a signed column.
                simhash: self.simhash as u64,
            },
            near_duplicate_of: self
                .near_duplicate_of
                .and_then(|s| Uuid::parse_str(&s).ok()),
            url: self.url,
            platform_id: self.platform_id,
            author: self.author,
            text: self.text_content,
            published_at: self.published_at.map(millis_to_datetime),
            collected_at: millis_to_datetime(self.collected_at),
            metadata: serde_json::from_str(&self.metadata).unwrap_or(serde_json::Value::Null),
        }
    }
}

impl From<&ContentRecord> for ContentRecordRow {
    fn from(record: &ContentRecord) -> Self {
        Self {
            id: record.id.to_string(),
            run_id: record.run_id.to_string(),
            task_id: record.task_id.to_string(),
            arena: record.arena.clone(),
            platform: record.platform.clone(),
            identity_hash: record.signatures.identity_hash.clone(),
            content_hash: record.signatures.content_hash.clone(),
            simhash: record.signatures.simhash as i64,
            near_duplicate_of: record.near_duplicate_of.map(|id| id.to_string()),
            url: record.url.clone(),
            platform_id: record.platform_id.clone(),
            author: record.author.clone(),
            text_content: record.text.clone(),
            published_at: record.published_at.map(datetime_to_millis),
            collected_at: datetime_to_millis(record.collected_at),
            metadata: serde_json::to_string(&record.metadata).unwrap_or_else(|_| "null".to_string()),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DuplicateLinkRow {
    pub id: String,
    pub run_id: String,
    pub original_record_id: String,
    pub platform: String,
    pub identity_hash: String,
    pub kind: String,
    pub distance: Option<i64>,
    pub observed_at: i64,
}

impl DuplicateLinkRow {
    pub fn into_domain(self) -> DuplicateLink {
        DuplicateLink {
            id: parse_uuid(&self.id),
            run_id: parse_uuid(&self.run_id),
            original_record_id: parse_uuid(&self.original_record_id),
            platform: self.platform,
            identity_hash: self.identity_hash,
            kind: DuplicateKind::parse(&self.kind).unwrap_or(DuplicateKind::Content),
            distance: self.distance.map(|d| d.max(0) as u32),
            observed_at: millis_to_datetime(self.observed_at),
        }
    }
}

impl From<&DuplicateLink> for DuplicateLinkRow {
    fn from(link: &DuplicateLink) -> Self {
        Self {
            id: link.id.to_string(),
            run_id: link.run_id.to_string(),
            original_record_id: link.original_record_id.to_string(),
            platform: link.platform.clone(),
            identity_hash: link.identity_hash.clone(),
            kind: link.kind.as_str().to_string(),
            distance: link.distance.map(i64::from),
            observed_at: datetime_to_millis(link.observed_at),
        }
    }
}
