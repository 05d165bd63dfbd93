use crate::error::DbError;
use crate::models::{ContentRecordRow, DuplicateLinkRow};
use crate::pool::begin_write;
use collect_core::{ContentRecord, DuplicateLink};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

const RECORD_COLUMNS: &str = "id, run_id, task_id, arena, platform, identity_hash, content_hash, simhash, near_duplicate_of, url, platform_id, author, text_content, published_at, collected_at, metadata";

#[derive(Clone)]
pub struct ContentRepository {
    pool: SqlitePool,
}

impl ContentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens the transaction that wraps one lookup-and-insert admission.
    pub async fn begin(&self) -> Result<ContentTransaction, DbError> {
        Ok(ContentTransaction {
            tx: begin_write(&self.pool).await?,
        })
    }

    pub async fn find_by_run(&self, run_id: Uuid, limit: i64) -> Result<Vec<ContentRecord>, DbError> {
        let rows: Vec<ContentRecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM content_records WHERE run_id = ? ORDER BY collected_at, rowid LIMIT ?"
        ))
        .bind(run_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    pub async fn count_by_run(&self, run_id: Uuid) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_records WHERE run_id = ?")
            .bind(run_id.to_string())
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    pub async fn links_for_run(&self, run_id: Uuid) -> Result<Vec<DuplicateLink>, DbError> {
        let rows: Vec<DuplicateLinkRow> = sqlx::query_as(
            r#"
            SELECT id, run_id, original_record_id, platform, identity_hash, kind, distance, observed_at
            FROM duplicate_links
            WHERE run_id = ?
            ORDER BY observed_at
            "#,
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }
}

/// Dedup lookups and writes sharing one SQLite transaction.
///
/// Dropping without [`ContentTransaction::commit`] rolls everything back.
pub struct ContentTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl ContentTransaction {
    pub async fn find_by_identity(
        &mut self,
        platform: &str,
        identity_hash: &str,
    ) -> Result<Option<Uuid>, DbError> {
        let id: Option<String> = sqlx::query_scalar(
            "SELECT id FROM content_records WHERE platform = ? AND identity_hash = ?",
        )
        .bind(platform)
        .bind(identity_hash)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(id.and_then(|s| Uuid::parse_str(&s).ok()))
    }

    pub async fn find_by_content(
        &mut self,
        run_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<Uuid>, DbError> {
        let id: Option<String> = sqlx::query_scalar(
            "SELECT id FROM content_records WHERE run_id = ? AND content_hash = ? ORDER BY rowid LIMIT 1",
        )
        .bind(run_id.to_string())
        .bind(content_hash)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(id.and_then(|s| Uuid::parse_str(&s).ok()))
    }

    /// Signatures of the run's most recently admitted records, newest first.
    pub async fn recent_signatures(
        &mut self,
        run_id: Uuid,
        limit: i64,
    ) -> Result<Vec<(Uuid, u64)>, DbError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT id, simhash FROM content_records WHERE run_id = ? ORDER BY rowid DESC LIMIT ?",
        )
        .bind(run_id.to_string())
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, simhash)| Uuid::parse_str(&id).ok().map(|id| (id, simhash as u64)))
            .collect())
    }

    /// Inserts the record unless its identity already exists for the
    /// platform. Returns false on an identity conflict.
    pub async fn insert_record(&mut self, record: &ContentRecord) -> Result<bool, DbError> {
        let row = ContentRecordRow::from(record);

        let result = sqlx::query(
            r#"
            INSERT INTO content_records (id, run_id, task_id, arena, platform, identity_hash, content_hash, simhash,
                near_duplicate_of, url, platform_id, author, text_content, published_at, collected_at, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(platform, identity_hash) DO NOTHING
            "#,
        )
        .bind(&row.id)
        .bind(&row.run_id)
        .bind(&row.task_id)
        .bind(&row.arena)
        .bind(&row.platform)
        .bind(&row.identity_hash)
        .bind(&row.content_hash)
        .bind(row.simhash)
        .bind(&row.near_duplicate_of)
        .bind(&row.url)
        .bind(&row.platform_id)
        .bind(&row.author)
        .bind(&row.text_content)
        .bind(row.published_at)
        .bind(row.collected_at)
        .bind(&row.metadata)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn insert_link(&mut self, link: &DuplicateLink) -> Result<(), DbError> {
        let row = DuplicateLinkRow::from(link);

        sqlx::query(
            r#"
            INSERT INTO duplicate_links (id, run_id, original_record_id, platform, identity_hash, kind, distance, observed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.run_id)
        .bind(&row.original_record_id)
        .bind(&row.platform)
        .bind(&row.identity_hash)
        .bind(&row.kind)
        .bind(row.distance)
        .bind(row.observed_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    pub async fn commit(self) -> Result<(), DbError> {
        self.tx.commit().await?;
        Ok(())
    }
}
