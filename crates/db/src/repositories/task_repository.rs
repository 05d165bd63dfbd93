use crate::error::DbError;
use crate::models::TaskRow;
use crate::pool::begin_write;
use chrono::{DateTime, Utc};
use collect_core::{CollectionTask, TaskCounters, TaskError, TaskStatus};
use sqlx::SqlitePool;
use uuid::Uuid;

const TASK_COLUMNS: &str = "id, run_id, platform, capability, tier, status, dispatched_at, completed_at, records_admitted, duplicates_rejected, near_duplicates, error_kind, error_message";

/// Terminal write applied by a worker, the sweep or a cancellation.
#[derive(Debug, Clone)]
pub struct TaskCompletion {
    pub status: TaskStatus,
    pub counters: Option<TaskCounters>,
    pub error: Option<TaskError>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<CollectionTask>, DbError> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM collection_tasks WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_domain()))
    }

    pub async fn find_by_run(&self, run_id: Uuid) -> Result<Vec<CollectionTask>, DbError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM collection_tasks WHERE run_id = ? ORDER BY platform, capability"
        ))
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    /// All tasks still pending or running, oldest dispatch first.
    pub async fn find_non_terminal(&self) -> Result<Vec<CollectionTask>, DbError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM collection_tasks WHERE status IN ('pending', 'running') ORDER BY dispatched_at"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    pub async fn count_non_terminal(&self, run_id: Uuid) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM collection_tasks WHERE run_id = ? AND status IN ('pending', 'running')",
        )
        .bind(run_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// `pending -> running`. False if the task was already claimed or finished.
    pub async fn claim(&self, id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE collection_tasks SET status = 'running' WHERE id = ? AND status = 'pending'",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Moves a non-terminal task to a terminal status.
    ///
    /// Returns false when the task was already terminal; a terminal task is
    /// never overwritten.
    pub async fn finish(&self, id: Uuid, completion: &TaskCompletion) -> Result<bool, DbError> {
        debug_assert!(completion.status.is_terminal());
        let counters = completion.counters;

        let result = sqlx::query(
            r#"
            UPDATE collection_tasks
            SET status = ?,
                completed_at = ?,
                records_admitted = COALESCE(?, records_admitted),
                duplicates_rejected = COALESCE(?, duplicates_rejected),
                near_duplicates = COALESCE(?, near_duplicates),
                error_kind = ?,
                error_message = ?
            WHERE id = ? AND status IN ('pending', 'running')
            "#,
        )
        .bind(completion.status.as_str())
        .bind(completion.completed_at.timestamp_millis())
        .bind(counters.map(|c| c.records_admitted as i64))
        .bind(counters.map(|c| c.duplicates_rejected as i64))
        .bind(counters.map(|c| c.near_duplicates as i64))
        .bind(completion.error.as_ref().map(|e| e.kind.as_str()))
        .bind(completion.error.as_ref().map(|e| e.message.as_str()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Progress write while the task is running. Ignored once terminal.
    pub async fn update_counters(&self, id: Uuid, counters: TaskCounters) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE collection_tasks
            SET records_admitted = ?, duplicates_rejected = ?, near_duplicates = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(counters.records_admitted as i64)
        .bind(counters.duplicates_rejected as i64)
        .bind(counters.near_duplicates as i64)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Final counters from a worker whose task was already finished by a
    /// timeout or cancellation. Counters never move backwards.
    pub async fn record_final_counters(
        &self,
        id: Uuid,
        counters: TaskCounters,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE collection_tasks
            SET records_admitted = MAX(records_admitted, ?),
                duplicates_rejected = MAX(duplicates_rejected, ?),
                near_duplicates = MAX(near_duplicates, ?)
            WHERE id = ? AND status IN ('completed', 'failed', 'timed_out')
            "#,
        )
        .bind(counters.records_admitted as i64)
        .bind(counters.duplicates_rejected as i64)
        .bind(counters.near_duplicates as i64)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Finishes every non-terminal task of a run with the same completion.
    /// Returns the tasks as they were before the write.
    pub async fn finish_all_for_run(
        &self,
        run_id: Uuid,
        completion: &TaskCompletion,
    ) -> Result<Vec<CollectionTask>, DbError> {
        let mut tx = begin_write(&self.pool).await?;

        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM collection_tasks WHERE run_id = ? AND status IN ('pending', 'running')"
        ))
        .bind(run_id.to_string())
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE collection_tasks
            SET status = ?, completed_at = ?, error_kind = ?, error_message = ?
            WHERE run_id = ? AND status IN ('pending', 'running')
            "#,
        )
        .bind(completion.status.as_str())
        .bind(completion.completed_at.timestamp_millis())
        .bind(completion.error.as_ref().map(|e| e.kind.as_str()))
        .bind(completion.error.as_ref().map(|e| e.message.as_str()))
        .bind(run_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }
}
