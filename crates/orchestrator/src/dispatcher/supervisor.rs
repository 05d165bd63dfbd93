use std::sync::Arc;

use chrono::Utc;
use collect_core::{CollectionTask, RunStatus, TaskError, TaskErrorKind, TaskStatus};
use db::TaskCompletion;
use events::Event;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::worker::{self, WorkerOutcome};
use super::{Inner, TaskJob};
use crate::error::Result;
use crate::state_machine::TaskStateMachine;

/// Runs a worker in its own tokio task and guarantees a terminal
/// transition however that task ends, panics included.
pub(crate) async fn supervise(inner: Arc<Inner>, job: TaskJob) {
    let task = job.task.clone();
    let handle = tokio::spawn(worker::run(inner.clone(), job));

    let outcome = match handle.await {
        Ok(outcome) => outcome,
        Err(join_error) => {
            let message = if join_error.is_panic() {
                "collector panicked"
            } else {
                "worker aborted"
            };
            error!(
                task_id = %task.id,
                platform = %task.platform,
                error = %join_error,
                "Worker ended abnormally"
            );
            WorkerOutcome::Failed {
                error: TaskError::new(TaskErrorKind::Internal, message),
                counters: None,
            }
        }
    };

    let completion = match outcome {
        WorkerOutcome::Completed(counters) => TaskCompletion {
            status: TaskStatus::Completed,
            counters: Some(counters),
            error: None,
            completed_at: Utc::now(),
        },
        WorkerOutcome::Failed { error, counters } => TaskCompletion {
            status: TaskStatus::Failed,
            counters,
            error: Some(error),
            completed_at: Utc::now(),
        },
        WorkerOutcome::Abandoned => {
            inner.forget_task(task.run_id, task.id);
            if let Err(e) = inner.complete_run_if_done(task.run_id).await {
                warn!(run_id = %task.run_id, error = %e, "Run completion check failed");
            }
            return;
        }
    };

    if let Err(e) = inner.finish_task(&task, completion).await {
        error!(task_id = %task.id, error = %e, "Failed to record task completion");
    }
    inner.forget_task(task.run_id, task.id);
    if let Err(e) = inner.complete_run_if_done(task.run_id).await {
        warn!(run_id = %task.run_id, error = %e, "Run completion check failed");
    }
}

impl Inner {
    /// `pending -> running` for the worker that picked the task up.
    pub(crate) async fn claim_task(&self, task: &CollectionTask) -> Result<bool> {
        let _order = self.transitions.lock().await;
        if !self.tasks.claim(task.id).await? {
            return Ok(false);
        }

        debug!(
            task_id = %task.id,
            platform = %task.platform,
            capability = %task.capability,
            "Task running"
        );
        self.progress.publish(
            task.run_id,
            Event::TaskStatusChanged {
                task_id: task.id,
                platform: task.platform.clone(),
                from_status: TaskStatus::Pending,
                to_status: TaskStatus::Running,
                counters: task.counters,
                error: None,
            },
        );
        Ok(true)
    }

    /// Keeps the counters of a completion that lost to a timeout or cancel,
    /// so they match the records the worker already stored.
    async fn keep_final_counters(
        &self,
        task: &CollectionTask,
        completion: &TaskCompletion,
    ) -> Result<()> {
        if let Some(counters) = completion.counters {
            if self.tasks.record_final_counters(task.id, counters).await? {
                debug!(
                    task_id = %task.id,
                    records_admitted = counters.records_admitted,
                    "Recorded final counters of late completion"
                );
            }
        }
        Ok(())
    }

    /// Applies a terminal transition unless the task got there first.
    ///
    /// Returns false when the write was skipped because the task had
    /// already been timed out, cancelled or completed.
    pub(crate) async fn finish_task(
        &self,
        task: &CollectionTask,
        completion: TaskCompletion,
    ) -> Result<bool> {
        let _order = self.transitions.lock().await;
        let Some(current) = self.tasks.find_by_id(task.id).await? else {
            warn!(task_id = %task.id, "Task vanished before completion");
            return Ok(false);
        };

        if !TaskStateMachine::can_transition(&current.status, &completion.status) {
            debug!(
                task_id = %task.id,
                from = %current.status,
                to = %completion.status,
                "Ignoring late task completion"
            );
            self.keep_final_counters(task, &completion).await?;
            return Ok(false);
        }

        if !self.tasks.finish(task.id, &completion).await? {
            debug!(task_id = %task.id, "Task finished concurrently");
            self.keep_final_counters(task, &completion).await?;
            return Ok(false);
        }

        let counters = completion.counters.unwrap_or(current.counters);
        match &completion.error {
            None => info!(
                task_id = %task.id,
                run_id = %task.run_id,
                platform = %task.platform,
                from = %current.status,
                to = %completion.status,
                records_admitted = counters.records_admitted,
                "Task finished"
            ),
            Some(err) => warn!(
                task_id = %task.id,
                run_id = %task.run_id,
                platform = %task.platform,
                from = %current.status,
                to = %completion.status,
                error = %err,
                "Task finished"
            ),
        }

        self.progress.publish(
            task.run_id,
            Event::TaskStatusChanged {
                task_id: task.id,
                platform: task.platform.clone(),
                from_status: current.status,
                to_status: completion.status,
                counters,
                error: completion.error,
            },
        );
        Ok(true)
    }

    /// Completes a still running run once none of its tasks is pending or
    /// running.
    pub(crate) async fn complete_run_if_done(&self, run_id: Uuid) -> Result<bool> {
        let _order = self.transitions.lock().await;
        if self.tasks.count_non_terminal(run_id).await? > 0 {
            return Ok(false);
        }
        if !self.runs.finish(run_id, RunStatus::Completed, Utc::now()).await? {
            return Ok(false);
        }

        self.forget_run(run_id);
        self.progress.publish(
            run_id,
            Event::RunCompleted {
                status: RunStatus::Completed,
            },
        );
        info!(%run_id, "Run completed");
        Ok(true)
    }
}
