use collect_core::{
    Capability, CollectionTask, TaskCounters, TaskError, TaskErrorKind, TaskStatus, Tier,
};

use super::{datetime_to_millis, millis_to_datetime, parse_uuid};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: String,
    pub run_id: String,
    pub platform: String,
    pub capability: String,
    pub tier: String,
    pub status: String,
    pub dispatched_at: i64,
    pub completed_at: Option<i64>,
    pub records_admitted: i64,
    pub duplicates_rejected: i64,
    pub near_duplicates: i64,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl TaskRow {
    pub fn into_domain(self) -> CollectionTask {
        let last_error = self.error_kind.map(|kind| TaskError {
            kind: TaskErrorKind::parse(&kind).unwrap_or(TaskErrorKind::Internal),
            message: self.error_message.unwrap_or_default(),
        });

        CollectionTask {
            id: parse_uuid(&self.id),
            run_id: parse_uuid(&self.run_id),
            platform: self.platform,
            capability: Capability::parse(&self.capability).unwrap_or(Capability::TermSearch),
            tier: Tier::parse(&self.tier).unwrap_or(Tier::Free),
            status: TaskStatus::parse(&self.status).unwrap_or_default(),
            dispatched_at: millis_to_datetime(self.dispatched_at),
            completed_at: self.completed_at.map(millis_to_datetime),
            counters: TaskCounters {
                records_admitted: self.records_admitted.max(0) as u64,
                duplicates_rejected: self.duplicates_rejected.max(0) as u64,
                near_duplicates: self.near_duplicates.max(0) as u64,
            },
            last_error,
        }
    }
}

impl From<&CollectionTask> for TaskRow {
    fn from(task: &CollectionTask) -> Self {
        Self {
            id: task.id.to_string(),
            run_id: task.run_id.to_string(),
            platform: task.platform.clone(),
            capability: task.capability.as_str().to_string(),
            tier: task.tier.as_str().to_string(),
            status: task.status.as_str().to_string(),
            dispatched_at: datetime_to_millis(task.dispatched_at),
            completed_at: task.completed_at.map(datetime_to_millis),
            records_admitted: task.counters.records_admitted as i64,
            duplicates_rejected: task.counters.duplicates_rejected as i64,
            near_duplicates: task.counters.near_duplicates as i64,
            error_kind: task.last_error.as_ref().map(|e| e.kind.as_str().to_string()),
            error_message: task.last_error.as_ref().map(|e| e.message.clone()),
        }
    }
}
