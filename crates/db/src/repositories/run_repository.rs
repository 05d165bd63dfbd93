use crate::error::DbError;
use crate::models::{RunRow, TaskRow};
use chrono::{DateTime, Utc};
use collect_core::{CollectionRun, CollectionTask, RunStatus};
use sqlx::SqlitePool;
use uuid::Uuid;

const RUN_COLUMNS: &str = "id, specification_id, mode, tier, arena_overrides, date_from, date_to, status, started_at, finished_at";

#[derive(Clone)]
pub struct RunRepository {
    pool: SqlitePool,
}

impl RunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persists a run together with all of its tasks, or nothing.
    pub async fn create_with_tasks(
        &self,
        run: &CollectionRun,
        tasks: &[CollectionTask],
    ) -> Result<(), DbError> {
        let row = RunRow::from(run);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO collection_runs (id, specification_id, mode, tier, arena_overrides, date_from, date_to, status, started_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.specification_id)
        .bind(&row.mode)
        .bind(&row.tier)
        .bind(&row.arena_overrides)
        .bind(row.date_from)
        .bind(row.date_to)
        .bind(&row.status)
        .bind(row.started_at)
        .bind(row.finished_at)
        .execute(&mut *tx)
        .await?;

        for task in tasks {
            let t = TaskRow::from(task);
            sqlx::query(
                r#"
                INSERT INTO collection_tasks (id, run_id, platform, capability, tier, status, dispatched_at, completed_at,
                    records_admitted, duplicates_rejected, near_duplicates, error_kind, error_message)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&t.id)
            .bind(&t.run_id)
            .bind(&t.platform)
            .bind(&t.capability)
            .bind(&t.tier)
            .bind(&t.status)
            .bind(t.dispatched_at)
            .bind(t.completed_at)
            .bind(t.records_admitted)
            .bind(t.duplicates_rejected)
            .bind(t.near_duplicates)
            .bind(&t.error_kind)
            .bind(&t.error_message)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<CollectionRun>, DbError> {
        let row: Option<RunRow> = sqlx::query_as(&format!(
            "SELECT {RUN_COLUMNS} FROM collection_runs WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_domain()))
    }

    pub async fn find_all(&self) -> Result<Vec<CollectionRun>, DbError> {
        let rows: Vec<RunRow> = sqlx::query_as(&format!(
            "SELECT {RUN_COLUMNS} FROM collection_runs ORDER BY started_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    pub async fn find_running(&self) -> Result<Vec<CollectionRun>, DbError> {
        let rows: Vec<RunRow> = sqlx::query_as(&format!(
            "SELECT {RUN_COLUMNS} FROM collection_runs WHERE status = 'running'"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    /// Moves a running run to a terminal status. Returns false when the run
    /// was already terminal, so exactly one caller observes the transition.
    pub async fn finish(
        &self,
        id: Uuid,
        status: RunStatus,
        finished_at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE collection_runs
            SET status = ?, finished_at = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(status.as_str())
        .bind(finished_at.timestamp_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
