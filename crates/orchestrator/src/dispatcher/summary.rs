use collect_core::{CollectionRun, CollectionTask, TaskStatus};
use serde::Serialize;

/// Aggregates over a run's tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RunTotals {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub records_admitted: u64,
    pub duplicates_rejected: u64,
    pub near_duplicates: u64,
}

impl RunTotals {
    pub fn from_tasks(tasks: &[CollectionTask]) -> Self {
        tasks.iter().fold(Self::default(), |mut totals, task| {
            match task.status {
                TaskStatus::Pending => totals.pending += 1,
                TaskStatus::Running => totals.running += 1,
                TaskStatus::Completed => totals.completed += 1,
                TaskStatus::Failed => totals.failed += 1,
                TaskStatus::TimedOut => totals.timed_out += 1,
            }
            totals.records_admitted += task.counters.records_admitted;
            totals.duplicates_rejected += task.counters.duplicates_rejected;
            totals.near_duplicates += task.counters.near_duplicates;
            totals
        })
    }

    pub fn non_terminal(&self) -> usize {
        self.pending + self.running
    }
}

/// A run with its tasks and their aggregate.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RunSummary {
    pub run: CollectionRun,
    pub tasks: Vec<CollectionTask>,
    pub totals: RunTotals,
}

impl RunSummary {
    pub fn new(run: CollectionRun, tasks: Vec<CollectionTask>) -> Self {
        let totals = RunTotals::from_tasks(&tasks);
        Self { run, tasks, totals }
    }

    pub fn task(&self, platform: &str) -> Option<&CollectionTask> {
        self.tasks.iter().find(|t| t.platform == platform)
    }
}
