use chrono::Utc;
use collect_core::{ArenaDescriptor, ContentRecord, DuplicateKind, DuplicateLink, RawRecord};
use db::{ContentRepository, ContentTransaction, DbError};
use tokio::sync::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

use super::signature::{self, hamming};
use crate::config::DedupConfig;

/// Outcome of offering one record to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted {
        record_id: Uuid,
        /// Earlier record within the flag distance, if any.
        near_duplicate_of: Option<Uuid>,
        distance: Option<u32>,
    },
    /// Same platform identity already stored.
    IdentityDuplicate { existing_id: Option<Uuid> },
    /// Same normalized content already admitted in this run.
    ContentDuplicate { original_id: Uuid },
    /// Within the configured rejection distance of a recent record.
    NearDuplicateRejected { original_id: Uuid, distance: u32 },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }

    pub fn is_near_duplicate(&self) -> bool {
        matches!(
            self,
            Admission::Admitted {
                near_duplicate_of: Some(_),
                ..
            } | Admission::NearDuplicateRejected { .. }
        )
    }
}

/// Decides whether collected records enter the store.
///
/// Each admission runs its lookups and its insert in one transaction, and
/// admissions are serialized across workers so two concurrent candidates
/// can never both pass the same check.
pub struct DedupEngine {
    content: ContentRepository,
    config: DedupConfig,
    admission_lock: Mutex<()>,
}

impl DedupEngine {
    pub fn new(content: ContentRepository, config: DedupConfig) -> Self {
        Self {
            content,
            config,
            admission_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Fingerprints a raw record and offers it for admission.
    pub async fn admit(
        &self,
        run_id: Uuid,
        task_id: Uuid,
        arena: &ArenaDescriptor,
        raw: RawRecord,
    ) -> Result<Admission, DbError> {
        let signatures = signature::compute(&arena.platform, &raw, self.config.shingle_size);
        let record = ContentRecord::from_raw(
            run_id,
            task_id,
            arena.group.clone(),
            arena.platform.clone(),
            signatures,
            raw,
        );
        self.admit_record(record).await
    }

    /// Offers an already fingerprinted record.
    pub async fn admit_record(&self, mut record: ContentRecord) -> Result<Admission, DbError> {
        let _guard = self.admission_lock.lock().await;
        let mut tx = self.content.begin().await?;

        if let Some(existing_id) = tx
            .find_by_identity(&record.platform, &record.signatures.identity_hash)
            .await?
        {
            trace!(platform = %record.platform, %existing_id, "Identity duplicate");
            return Ok(Admission::IdentityDuplicate {
                existing_id: Some(existing_id),
            });
        }

        // Records with no words (media posts, bare links) share the empty
        // digest, so only identity applies to them.
        let has_text = !signature::normalize_text(&record.text).is_empty();

        if has_text {
            if let Some(original_id) = tx
                .find_by_content(record.run_id, &record.signatures.content_hash)
                .await?
            {
                link(&mut tx, &record, original_id, DuplicateKind::Content, None).await?;
                tx.commit().await?;
                debug!(run_id = %record.run_id, %original_id, "Content duplicate rejected");
                return Ok(Admission::ContentDuplicate { original_id });
            }
        }

        let nearest = if has_text {
            self.nearest(&mut tx, &record).await?
        } else {
            None
        };
        if let (Some((original_id, distance)), Some(reject)) = (nearest, self.config.reject_distance) {
            if distance <= reject {
                link(
                    &mut tx,
                    &record,
                    original_id,
                    DuplicateKind::NearDuplicate,
                    Some(distance),
                )
                .await?;
                tx.commit().await?;
                debug!(run_id = %record.run_id, %original_id, distance, "Near duplicate rejected");
                return Ok(Admission::NearDuplicateRejected {
                    original_id,
                    distance,
                });
            }
        }

        let flagged = nearest.filter(|(_, distance)| *distance <= self.config.flag_distance);
        record.near_duplicate_of = flagged.map(|(id, _)| id);

        if !tx.insert_record(&record).await? {
            // Unique index caught an identity the lookup missed.
            return Ok(Admission::IdentityDuplicate { existing_id: None });
        }
        tx.commit().await?;

        Ok(Admission::Admitted {
            record_id: record.id,
            near_duplicate_of: record.near_duplicate_of,
            distance: flagged.map(|(_, d)| d),
        })
    }

    /// Closest record among the run's recent window, ties to the newest.
    async fn nearest(
        &self,
        tx: &mut ContentTransaction,
        record: &ContentRecord,
    ) -> Result<Option<(Uuid, u32)>, DbError> {
        if self.config.window_size == 0 {
            return Ok(None);
        }

        let recent = tx
            .recent_signatures(record.run_id, self.config.window_size as i64)
            .await?;

        Ok(recent
            .into_iter()
            .map(|(id, simhash)| (id, hamming(simhash, record.signatures.simhash)))
            .fold(None, |best: Option<(Uuid, u32)>, candidate| match best {
                Some(b) if b.1 <= candidate.1 => Some(b),
                _ => Some(candidate),
            }))
    }
}

async fn link(
    tx: &mut ContentTransaction,
    record: &ContentRecord,
    original_record_id: Uuid,
    kind: DuplicateKind,
    distance: Option<u32>,
) -> Result<(), DbError> {
    tx.insert_link(&DuplicateLink {
        id: Uuid::new_v4(),
        run_id: record.run_id,
        original_record_id,
        platform: record.platform.clone(),
        identity_hash: record.signatures.identity_hash.clone(),
        kind,
        distance,
        observed_at: Utc::now(),
    })
    .await
}
