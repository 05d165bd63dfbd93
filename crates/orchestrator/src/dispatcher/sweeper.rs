use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use collect_core::{TaskError, TaskErrorKind, TaskStatus};
use db::TaskCompletion;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Inner;
use crate::error::Result;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// What one sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub timed_out: Vec<Uuid>,
    pub completed_runs: Vec<Uuid>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.timed_out.is_empty() && self.completed_runs.is_empty()
    }
}

impl Inner {
    /// Times out tasks past their deadline, then completes every running
    /// run whose tasks are all terminal.
    ///
    /// Only `status` and `dispatched_at` decide whether a task is stuck.
    pub(crate) async fn sweep_once(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let now = Utc::now();

        for task in self.tasks.find_non_terminal().await? {
            let deadline = self.config.timeout_for(&task.platform);
            let elapsed = (now - task.dispatched_at).to_std().unwrap_or_default();
            if elapsed < deadline {
                continue;
            }

            let completion = TaskCompletion {
                status: TaskStatus::TimedOut,
                counters: None,
                error: Some(TaskError::new(
                    TaskErrorKind::TimedOut,
                    format!(
                        "no terminal state within {:.1}s of dispatch",
                        deadline.as_secs_f64()
                    ),
                )),
                completed_at: now,
            };
            if self.finish_task(&task, completion).await? {
                if let Some(token) = self.forget_task(task.run_id, task.id) {
                    token.cancel();
                }
                report.timed_out.push(task.id);
            }
        }

        for run in self.runs.find_running().await? {
            if self.complete_run_if_done(run.id).await? {
                report.completed_runs.push(run.id);
            }
        }

        if !report.is_empty() {
            info!(
                timed_out = report.timed_out.len(),
                completed_runs = report.completed_runs.len(),
                "Sweep finished"
            );
        }
        Ok(report)
    }
}

pub(crate) fn spawn(inner: Arc<Inner>) -> JoinHandle<()> {
    let period = inner.config.sweep_interval.max(MIN_SWEEP_INTERVAL);
    let shutdown = inner.shutdown.clone();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Stuck-task sweep stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = inner.sweep_once().await {
                        warn!(error = %e, "Stuck-task sweep failed");
                    }
                }
            }
        }
    })
}
