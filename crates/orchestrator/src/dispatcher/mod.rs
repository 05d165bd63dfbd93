//! Run lifecycle: planning, dispatch, supervision, timeouts and cancellation.

mod plan;
mod summary;
mod supervisor;
mod sweeper;
mod worker;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use collect_core::{
    CollectionRun, CollectionTask, ContentRecord, DateRange, LaunchRequest, ResearchSpecification,
    RunStatus, TaskError, TaskErrorKind, TaskStatus,
};
use db::{ContentRepository, RunRepository, SqlitePool, TaskCompletion, TaskRepository};
use events::{Event, ProgressBroadcaster, TaskSnapshot};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collector::{Collector, CollectorSet};
use crate::config::{DedupConfig, DispatcherConfig};
use crate::credentials::CredentialPool;
use crate::dedup::DedupEngine;
use crate::error::{OrchestratorError, Result};
use crate::registry::ArenaRegistry;
use crate::specification::{InMemorySpecifications, SpecificationSource};
use crate::tier::{TierLayers, TierResolver};

pub use summary::{RunSummary, RunTotals};
pub use sweeper::SweepReport;

/// An arena left out of a launch because of a configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SkippedArena {
    pub platform: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LaunchOutcome {
    pub run: CollectionRun,
    pub tasks: Vec<CollectionTask>,
    pub skipped: Vec<SkippedArena>,
}

/// Everything a worker needs to execute one task.
#[derive(Clone)]
pub(crate) struct TaskJob {
    pub task: CollectionTask,
    pub descriptor: collect_core::ArenaDescriptor,
    pub collector: Arc<dyn Collector>,
    pub specification: Arc<ResearchSpecification>,
    pub date_range: Option<DateRange>,
    pub cancel: CancellationToken,
}

pub(crate) struct ActiveRun {
    token: CancellationToken,
    tasks: HashMap<Uuid, CancellationToken>,
}

pub(crate) struct Inner {
    registry: Arc<ArenaRegistry>,
    resolver: TierResolver,
    collectors: CollectorSet,
    specifications: Arc<dyn SpecificationSource>,
    credentials: CredentialPool,
    dedup: DedupEngine,
    runs: RunRepository,
    tasks: TaskRepository,
    content: ContentRepository,
    progress: ProgressBroadcaster,
    config: DispatcherConfig,
    workers: Arc<Semaphore>,
    active: Mutex<HashMap<Uuid, ActiveRun>>,
    /// Orders terminal writes with their events across supervisors.
    transitions: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn active(&self) -> MutexGuard<'_, HashMap<Uuid, ActiveRun>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drops the task's token. Returns it so the caller may trigger it.
    pub(crate) fn forget_task(&self, run_id: Uuid, task_id: Uuid) -> Option<CancellationToken> {
        self.active()
            .get_mut(&run_id)
            .and_then(|run| run.tasks.remove(&task_id))
    }

    pub(crate) fn forget_run(&self, run_id: Uuid) -> Option<ActiveRun> {
        self.active().remove(&run_id)
    }
}

pub struct DispatcherBuilder {
    pool: SqlitePool,
    registry: Arc<ArenaRegistry>,
    config: DispatcherConfig,
    dedup: DedupConfig,
    collectors: CollectorSet,
    specifications: Option<Arc<dyn SpecificationSource>>,
    credentials: Option<CredentialPool>,
    progress: Option<ProgressBroadcaster>,
}

impl DispatcherBuilder {
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_dedup_config(mut self, config: DedupConfig) -> Self {
        self.dedup = config;
        self
    }

    pub fn with_collectors(mut self, collectors: CollectorSet) -> Self {
        self.collectors = collectors;
        self
    }

    pub fn with_collector(mut self, collector: Arc<dyn Collector>) -> Self {
        self.collectors.register(collector);
        self
    }

    pub fn with_specifications(mut self, source: Arc<dyn SpecificationSource>) -> Self {
        self.specifications = Some(source);
        self
    }

    pub fn with_credentials(mut self, credentials: CredentialPool) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_progress(mut self, progress: ProgressBroadcaster) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn build(self) -> Dispatcher {
        let content = ContentRepository::new(self.pool.clone());
        let inner = Inner {
            resolver: TierResolver::new(self.registry.clone()),
            registry: self.registry,
            collectors: self.collectors,
            specifications: self
                .specifications
                .unwrap_or_else(|| Arc::new(InMemorySpecifications::new())),
            credentials: self.credentials.unwrap_or_default(),
            dedup: DedupEngine::new(content.clone(), self.dedup),
            runs: RunRepository::new(self.pool.clone()),
            tasks: TaskRepository::new(self.pool),
            content,
            progress: self.progress.unwrap_or_default(),
            workers: Arc::new(Semaphore::new(self.config.max_workers.max(1))),
            config: self.config,
            active: Mutex::new(HashMap::new()),
            transitions: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            sweeper: Mutex::new(None),
        };

        Dispatcher {
            inner: Arc::new(inner),
        }
    }
}

/// Owns every run from launch to its terminal state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn builder(pool: SqlitePool, registry: Arc<ArenaRegistry>) -> DispatcherBuilder {
        DispatcherBuilder {
            pool,
            registry,
            config: DispatcherConfig::default(),
            dedup: DedupConfig::default(),
            collectors: CollectorSet::new(),
            specifications: None,
            credentials: None,
            progress: None,
        }
    }

    pub fn registry(&self) -> &Arc<ArenaRegistry> {
        &self.inner.registry
    }

    pub fn credentials(&self) -> &CredentialPool {
        &self.inner.credentials
    }

    pub fn progress(&self) -> &ProgressBroadcaster {
        &self.inner.progress
    }

    pub fn specifications(&self) -> &Arc<dyn SpecificationSource> {
        &self.inner.specifications
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    pub fn collectors(&self) -> &CollectorSet {
        &self.inner.collectors
    }

    /// Runs with at least one task this process is still tracking.
    pub fn active_runs(&self) -> usize {
        self.inner.active().len()
    }

    /// Validates, plans and persists a run, then dispatches its tasks.
    ///
    /// Configuration errors abort the launch before anything is written
    /// unless the request (or the dispatcher default) skips invalid arenas.
    pub async fn launch(&self, request: LaunchRequest) -> Result<LaunchOutcome> {
        request.validate()?;
        let inner = &self.inner;

        let specification = inner
            .specifications
            .get(&request.specification_id)
            .await?
            .ok_or_else(|| {
                OrchestratorError::SpecificationNotFound(request.specification_id.clone())
            })?;

        let resolution = inner.resolver.resolve(TierLayers {
            launch: &request.arena_overrides,
            specification: &specification.arena_tiers,
            default_tier: request.tier,
            enabled: &request.enabled_arenas,
        });
        let plan = plan::plan(resolution.resolved, &specification, &inner.collectors);
        let mut rejected = resolution.rejected;
        rejected.extend(plan.rejected);

        let skip_invalid = request.skip_invalid_arenas || inner.config.skip_invalid_arenas;
        if !rejected.is_empty() && (!skip_invalid || plan.tasks.is_empty()) {
            warn!(
                specification_id = %request.specification_id,
                errors = rejected.len(),
                "Launch rejected by configuration errors"
            );
            return Err(OrchestratorError::Configuration(rejected));
        }
        if plan.tasks.is_empty() {
            return Err(OrchestratorError::Validation(
                "no enabled arena to dispatch".to_string(),
            ));
        }

        let skipped: Vec<SkippedArena> = rejected
            .iter()
            .map(|err| {
                warn!(platform = err.platform().unwrap_or("-"), error = %err, "Skipping arena");
                SkippedArena {
                    platform: err.platform().map(str::to_string),
                    reason: err.to_string(),
                }
            })
            .collect();

        let run = CollectionRun::new(&request.specification_id, request.mode, request.tier)
            .with_overrides(request.arena_overrides.clone())
            .with_date_range(request.date_range);
        let tasks: Vec<CollectionTask> = plan
            .tasks
            .iter()
            .map(|p| {
                CollectionTask::new(run.id, p.arena.descriptor.platform.clone(), p.capability, p.arena.tier)
            })
            .collect();

        inner.runs.create_with_tasks(&run, &tasks).await?;
        info!(
            run_id = %run.id,
            specification_id = %run.specification_id,
            task_count = tasks.len(),
            skipped = skipped.len(),
            "Run launched"
        );

        let run_token = inner.shutdown.child_token();
        let specification = Arc::new(specification);
        let mut task_tokens = HashMap::with_capacity(tasks.len());
        let jobs: Vec<TaskJob> = plan
            .tasks
            .into_iter()
            .zip(tasks.iter().cloned())
            .map(|(planned, task)| {
                let cancel = run_token.child_token();
                task_tokens.insert(task.id, cancel.clone());
                TaskJob {
                    task,
                    descriptor: planned.arena.descriptor,
                    collector: planned.collector,
                    specification: specification.clone(),
                    date_range: request.date_range,
                    cancel,
                }
            })
            .collect();

        inner.active().insert(
            run.id,
            ActiveRun {
                token: run_token,
                tasks: task_tokens,
            },
        );

        inner.progress.publish(
            run.id,
            Event::RunStarted {
                specification_id: run.specification_id.clone(),
                task_count: tasks.len(),
            },
        );
        for task in &tasks {
            inner.progress.publish(
                run.id,
                Event::TaskCreated {
                    task: TaskSnapshot::from(task),
                },
            );
        }

        for job in jobs {
            tokio::spawn(supervisor::supervise(self.inner.clone(), job));
        }

        Ok(LaunchOutcome {
            run,
            tasks,
            skipped,
        })
    }

    /// Cancels a running run without waiting for its workers.
    pub async fn cancel(&self, run_id: Uuid, reason: &str) -> Result<RunSummary> {
        let inner = &self.inner;
        let run = inner
            .runs
            .find_by_id(run_id)
            .await?
            .ok_or(OrchestratorError::RunNotFound(run_id))?;

        let guard = inner.transitions.lock().await;
        let now = Utc::now();
        if run.status.is_terminal() || !inner.runs.finish(run_id, RunStatus::Cancelled, now).await? {
            return Err(OrchestratorError::RunFinished(run_id));
        }

        let error = TaskError::new(TaskErrorKind::Cancelled, reason);
        let completion = TaskCompletion {
            status: TaskStatus::Failed,
            counters: None,
            error: Some(error.clone()),
            completed_at: now,
        };
        let affected = inner.tasks.finish_all_for_run(run_id, &completion).await?;

        if let Some(active) = inner.forget_run(run_id) {
            active.token.cancel();
        }

        for task in &affected {
            inner.progress.publish(
                run_id,
                Event::TaskStatusChanged {
                    task_id: task.id,
                    platform: task.platform.clone(),
                    from_status: task.status,
                    to_status: TaskStatus::Failed,
                    counters: task.counters,
                    error: Some(error.clone()),
                },
            );
        }
        inner.progress.publish(
            run_id,
            Event::RunCancelled {
                reason: reason.to_string(),
            },
        );

        info!(%run_id, cancelled_tasks = affected.len(), %reason, "Run cancelled");
        drop(guard);
        self.summary(run_id).await
    }

    pub async fn summary(&self, run_id: Uuid) -> Result<RunSummary> {
        let run = self
            .inner
            .runs
            .find_by_id(run_id)
            .await?
            .ok_or(OrchestratorError::RunNotFound(run_id))?;
        let tasks = self.inner.tasks.find_by_run(run_id).await?;
        Ok(RunSummary::new(run, tasks))
    }

    pub async fn list_runs(&self) -> Result<Vec<CollectionRun>> {
        Ok(self.inner.runs.find_all().await?)
    }

    pub async fn records(&self, run_id: Uuid, limit: i64) -> Result<Vec<ContentRecord>> {
        if self.inner.runs.find_by_id(run_id).await?.is_none() {
            return Err(OrchestratorError::RunNotFound(run_id));
        }
        Ok(self.inner.content.find_by_run(run_id, limit).await?)
    }

    /// One pass of the stuck-task sweep.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        self.inner.sweep_once().await
    }

    /// Starts the periodic sweep. Calling it again has no effect.
    pub fn start(&self) {
        let mut slot = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_none() {
            *slot = Some(sweeper::spawn(self.inner.clone()));
            info!(
                interval_secs = self.inner.config.sweep_interval.as_secs_f64(),
                "Stuck-task sweep started"
            );
        }
    }

    /// Stops the sweep and signals every in-flight collector call to stop.
    pub async fn shutdown(&self) {
        info!("Shutting down dispatcher");
        self.inner.shutdown.cancel();

        let handle = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Sweep task failed"),
                Err(_) => warn!("Sweep task did not stop in time"),
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("arenas", &self.inner.registry.len())
            .field("collectors", &self.inner.collectors)
            .field("active_runs", &self.active_runs())
            .finish()
    }
}
