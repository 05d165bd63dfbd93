use collect_core::{ArenaConfig, CollectionRun, DateRange, RunMode, RunStatus, Tier};

use super::{datetime_to_millis, millis_to_datetime, parse_uuid};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRow {
    pub id: String,
    pub specification_id: String,
    pub mode: String,
    pub tier: String,
    pub arena_overrides: String,
    pub date_from: Option<i64>,
    pub date_to: Option<i64>,
    pub status: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
}

impl RunRow {
    pub fn into_domain(self) -> CollectionRun {
        let date_range = match (self.date_from, self.date_to) {
            (Some(from), Some(to)) => Some(DateRange {
                from: millis_to_datetime(from),
                to: millis_to_datetime(to),
            }),
            _ => None,
        };

        CollectionRun {
            id: parse_uuid(&self.id),
            specification_id: self.specification_id,
            mode: RunMode::parse(&self.mode).unwrap_or(RunMode::Batch),
            tier: Tier::parse(&self.tier).unwrap_or(Tier::Free),
            arena_overrides: serde_json::from_str::<ArenaConfig>(&self.arena_overrides)
                .unwrap_or_default(),
            date_range,
            status: RunStatus::parse(&self.status).unwrap_or_default(),
            started_at: millis_to_datetime(self.started_at),
            finished_at: self.finished_at.map(millis_to_datetime),
        }
    }
}

impl From<&CollectionRun> for RunRow {
    fn from(run: &CollectionRun) -> Self {
        Self {
            id: run.id.to_string(),
            specification_id: run.specification_id.clone(),
            mode: run.mode.as_str().to_string(),
            tier: run.tier.as_str().to_string(),
            arena_overrides: serde_json::to_string(&run.arena_overrides)
                .unwrap_or_else(|_| "{}".to_string()),
            date_from: run.date_range.map(|r| datetime_to_millis(r.from)),
            date_to: run.date_range.map(|r| datetime_to_millis(r.to)),
            status: run.status.as_str().to_string(),
            started_at: datetime_to_millis(run.started_at),
            finished_at: run.finished_at.map(datetime_to_millis),
        }
    }
}
