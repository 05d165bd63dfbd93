use std::sync::Arc;

use collect_core::{Capability, TaskCounters, TaskError, TaskErrorKind};
use events::Event;
use futures::StreamExt;
use tracing::{debug, warn};

use super::{Inner, TaskJob};
use crate::collector::{CollectContext, CollectorError, RecordStream};
use crate::dedup::Admission;

/// How a worker ended, before the supervisor turns it into a transition.
#[derive(Debug)]
pub(crate) enum WorkerOutcome {
    Completed(TaskCounters),
    Failed {
        error: TaskError,
        counters: Option<TaskCounters>,
    },
    /// The task was already terminal when the worker got to it.
    Abandoned,
}

enum Interrupt {
    Collector(CollectorError),
    Failed(TaskError),
    Cancelled,
}

impl Interrupt {
    fn internal(err: impl std::fmt::Display) -> Self {
        Self::Failed(TaskError::new(TaskErrorKind::Internal, err.to_string()))
    }
}

fn cancelled(inner: &Inner) -> TaskError {
    let message = if inner.shutdown.is_cancelled() {
        "dispatcher shutting down"
    } else {
        "cancelled"
    };
    TaskError::new(TaskErrorKind::Cancelled, message)
}

/// Executes one task: waits for a worker slot, claims the task, drives the
/// collector and offers each record to the dedup engine.
pub(crate) async fn run(inner: Arc<Inner>, job: TaskJob) -> WorkerOutcome {
    let _permit = tokio::select! {
        biased;
        _ = job.cancel.cancelled() => {
            return WorkerOutcome::Failed { error: cancelled(&inner), counters: None };
        }
        permit = inner.workers.clone().acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(e) => {
                return WorkerOutcome::Failed {
                    error: TaskError::new(TaskErrorKind::Internal, e.to_string()),
                    counters: None,
                };
            }
        },
    };

    match inner.claim_task(&job.task).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(task_id = %job.task.id, "Task already finished before claim");
            return WorkerOutcome::Abandoned;
        }
        Err(e) => {
            return WorkerOutcome::Failed {
                error: TaskError::new(TaskErrorKind::Internal, e.to_string()),
                counters: None,
            };
        }
    }

    let mut counters = TaskCounters::default();
    match collect(&inner, &job, &mut counters).await {
        Ok(()) => WorkerOutcome::Completed(counters),
        Err(Interrupt::Collector(e)) => WorkerOutcome::Failed {
            error: TaskError::from(&e),
            counters: Some(counters),
        },
        Err(Interrupt::Failed(error)) => WorkerOutcome::Failed {
            error,
            counters: Some(counters),
        },
        Err(Interrupt::Cancelled) => WorkerOutcome::Failed {
            error: cancelled(&inner),
            counters: Some(counters),
        },
    }
}

async fn collect(inner: &Inner, job: &TaskJob, counters: &mut TaskCounters) -> Result<(), Interrupt> {
    let capability = job.task.capability;
    if !job.descriptor.supports(capability) {
        return Err(Interrupt::Collector(CollectorError::CapabilityNotSupported {
            platform: job.task.platform.clone(),
            capability,
        }));
    }

    let mut lease = if job.descriptor.requires_credential {
        let lease = inner.credentials.acquire(&job.task.platform).map_err(|e| {
            Interrupt::Failed(TaskError::new(TaskErrorKind::NoCredentialAvailable, e.to_string()))
        })?;
        Some(lease)
    } else {
        None
    };

    let ctx = CollectContext {
        tier: job.task.tier,
        credential: lease.as_ref().map(|l| l.secret().clone()),
        cancel: job.cancel.clone(),
    };

    let result = drain(inner, job, &ctx, counters).await;

    if let Some(lease) = lease.as_mut() {
        match &result {
            Ok(()) => lease.mark_succeeded(),
            Err(Interrupt::Collector(e)) => {
                if let Some(health) = lease.mark_failed(e) {
                    debug!(
                        credential_id = %health.id,
                        consecutive_errors = health.consecutive_errors,
                        active = health.active,
                        "Credential error recorded"
                    );
                }
            }
            Err(_) => {}
        }
    }

    result
}

async fn open(job: &TaskJob, ctx: &CollectContext) -> Result<RecordStream, CollectorError> {
    match job.task.capability {
        Capability::TermSearch => {
            job.collector
                .collect_by_terms(&job.specification.terms, job.date_range, ctx)
                .await
        }
        Capability::ActorSearch => {
            job.collector
                .collect_by_actors(&job.specification.actors, ctx)
                .await
        }
    }
}

async fn drain(
    inner: &Inner,
    job: &TaskJob,
    ctx: &CollectContext,
    counters: &mut TaskCounters,
) -> Result<(), Interrupt> {
    let mut stream = tokio::select! {
        _ = job.cancel.cancelled() => return Err(Interrupt::Cancelled),
        opened = open(job, ctx) => opened.map_err(Interrupt::Collector)?,
    };

    let interval = inner.config.progress_interval.max(1);
    let mut since_progress = 0u64;

    loop {
        let next = tokio::select! {
            _ = job.cancel.cancelled() => return Err(Interrupt::Cancelled),
            next = stream.next() => next,
        };
        let Some(item) = next else {
            break;
        };
        let raw = item.map_err(Interrupt::Collector)?;

        let admission = inner
            .dedup
            .admit(job.task.run_id, job.task.id, &job.descriptor, raw)
            .await
            .map_err(Interrupt::internal)?;
        tally(counters, &admission);

        since_progress += 1;
        if since_progress >= interval {
            since_progress = 0;
            report_progress(inner, job, *counters).await;
        }
    }

    if counters.duplicates_rejected > 0 || counters.near_duplicates > 0 {
        debug!(
            task_id = %job.task.id,
            admitted = counters.records_admitted,
            rejected = counters.duplicates_rejected,
            near_duplicates = counters.near_duplicates,
            "Dedup summary"
        );
    }
    Ok(())
}

fn tally(counters: &mut TaskCounters, admission: &Admission) {
    if admission.is_admitted() {
        counters.records_admitted += 1;
    } else {
        counters.duplicates_rejected += 1;
    }
    if admission.is_near_duplicate() {
        counters.near_duplicates += 1;
    }
}

async fn report_progress(inner: &Inner, job: &TaskJob, counters: TaskCounters) {
    match inner.tasks.update_counters(job.task.id, counters).await {
        Ok(true) => {
            inner.progress.publish(
                job.task.run_id,
                Event::TaskProgress {
                    task_id: job.task.id,
                    counters,
                },
            );
        }
        Ok(false) => {}
        Err(e) => warn!(task_id = %job.task.id, error = %e, "Failed to persist task progress"),
    }
}
