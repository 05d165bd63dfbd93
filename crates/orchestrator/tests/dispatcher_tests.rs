use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use collect_core::{
    ArenaConfig, ArenaDescriptor, ArenaSetting, Capability, CollectionRun, CollectionTask,
    DateRange, LaunchRequest, RawRecord, ResearchSpecification, RunMode, RunStatus, Secret,
    TaskCounters, TaskErrorKind, TaskStatus, Tier,
};
use db::{create_pool, run_migrations, DatabaseConfig, RunRepository, TaskCompletion, TaskRepository};
use events::Event;
use futures::stream::{self, StreamExt};
use orchestrator::{
    ArenaRegistry, CollectContext, Collector, CollectorError, CollectorSet, ConfigurationError,
    CredentialPolicy, CredentialPool, DedupConfig, Dispatcher, DispatcherConfig,
    InMemorySpecifications, OrchestratorError, RecordStream, RunSummary,
};
use tempfile::TempDir;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Fake collectors
// ---------------------------------------------------------------------------

/// Yields the same records for either capability.
struct FixedCollector {
    platform: &'static str,
    records: Vec<RawRecord>,
}

impl FixedCollector {
    fn new(platform: &'static str, count: usize) -> Self {
        let records = (0..count)
            .map(|i| {
                RawRecord::new(format!(
                    "{platform} post {i} on the {} policy debate",
                    WORDS[i % WORDS.len()]
                ))
                .with_url(format!("https://{platform}.example/posts/{i}"))
            })
            .collect();
        Self { platform, records }
    }

    fn stream(&self) -> RecordStream {
        stream::iter(self.records.clone().into_iter().map(Ok)).boxed()
    }
}

const WORDS: &[&str] = &[
    "climate", "energy", "housing", "transport", "health", "farming", "fishing", "mining",
    "tax", "school", "water", "border",
];

#[async_trait]
impl Collector for FixedCollector {
    fn platform(&self) -> &str {
        self.platform
    }

    async fn collect_by_terms(
        &self,
        _terms: &[String],
        _date_range: Option<DateRange>,
        _ctx: &CollectContext,
    ) -> Result<RecordStream, CollectorError> {
        Ok(self.stream())
    }

    async fn collect_by_actors(
        &self,
        _actors: &[String],
        _ctx: &CollectContext,
    ) -> Result<RecordStream, CollectorError> {
        Ok(self.stream())
    }
}

struct FailingCollector {
    platform: &'static str,
    error: CollectorError,
}

#[async_trait]
impl Collector for FailingCollector {
    fn platform(&self) -> &str {
        self.platform
    }

    async fn collect_by_terms(
        &self,
        _terms: &[String],
        _date_range: Option<DateRange>,
        _ctx: &CollectContext,
    ) -> Result<RecordStream, CollectorError> {
        Err(self.error.clone())
    }
}

/// Never answers.
struct HangingCollector(&'static str);

#[async_trait]
impl Collector for HangingCollector {
    fn platform(&self) -> &str {
        self.0
    }

    async fn collect_by_terms(
        &self,
        _terms: &[String],
        _date_range: Option<DateRange>,
        _ctx: &CollectContext,
    ) -> Result<RecordStream, CollectorError> {
        std::future::pending().await
    }
}

/// Yields its records, then stalls without ending the stream.
struct StallingCollector {
    inner: FixedCollector,
}

#[async_trait]
impl Collector for StallingCollector {
    fn platform(&self) -> &str {
        self.inner.platform
    }

    async fn collect_by_terms(
        &self,
        _terms: &[String],
        _date_range: Option<DateRange>,
        _ctx: &CollectContext,
    ) -> Result<RecordStream, CollectorError> {
        Ok(self.inner.stream().chain(stream::pending()).boxed())
    }
}

struct PanickingCollector(&'static str);

#[async_trait]
impl Collector for PanickingCollector {
    fn platform(&self) -> &str {
        self.0
    }

    async fn collect_by_terms(
        &self,
        _terms: &[String],
        _date_range: Option<DateRange>,
        _ctx: &CollectContext,
    ) -> Result<RecordStream, CollectorError> {
        panic!("collector bug")
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn term_arena(platform: &str) -> ArenaDescriptor {
    ArenaDescriptor::new(platform, "social_media")
        .with_tiers([Tier::Free, Tier::Medium])
        .with_capabilities([Capability::TermSearch])
}

fn specification(id: &str, platforms: &[&str]) -> ResearchSpecification {
    ResearchSpecification {
        id: id.to_string(),
        terms: vec!["climate".to_string()],
        actors: Vec::new(),
        arena_tiers: platforms
            .iter()
            .map(|p| (p.to_string(), ArenaSetting::default()))
            .collect(),
    }
}

struct Harness {
    dispatcher: Dispatcher,
    pool: db::SqlitePool,
    _dir: TempDir,
}

struct HarnessBuilder {
    arenas: Vec<ArenaDescriptor>,
    collectors: CollectorSet,
    specifications: Vec<ResearchSpecification>,
    config: DispatcherConfig,
    credentials: CredentialPool,
}

impl HarnessBuilder {
    fn new() -> Self {
        Self {
            arenas: Vec::new(),
            collectors: CollectorSet::new(),
            specifications: Vec::new(),
            config: DispatcherConfig::default().with_sweep_interval(Duration::from_millis(20)),
            credentials: CredentialPool::default(),
        }
    }

    fn arena(mut self, descriptor: ArenaDescriptor, collector: Arc<dyn Collector>) -> Self {
        self.arenas.push(descriptor);
        self.collectors.register(collector);
        self
    }

    fn specification(mut self, specification: ResearchSpecification) -> Self {
        self.specifications.push(specification);
        self
    }

    fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    fn credentials(mut self, credentials: CredentialPool) -> Self {
        self.credentials = credentials;
        self
    }

    async fn build(self) -> Harness {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let url = format!("sqlite:{}", dir.path().join("dispatch.db").display());
        let pool = create_pool(&DatabaseConfig::new(url))
            .await
            .expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        let registry = Arc::new(ArenaRegistry::new(self.arenas).expect("Invalid registry"));
        let specifications: InMemorySpecifications = self.specifications.into_iter().collect();

        let dispatcher = Dispatcher::builder(pool.clone(), registry)
            .with_config(self.config)
            .with_dedup_config(DedupConfig::default())
            .with_collectors(self.collectors)
            .with_specifications(Arc::new(specifications))
            .with_credentials(self.credentials)
            .build();
        dispatcher.start();

        Harness {
            dispatcher,
            pool,
            _dir: dir,
        }
    }
}

async fn wait_for_run(dispatcher: &Dispatcher, run_id: Uuid) -> RunSummary {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let summary = dispatcher.summary(run_id).await.expect("Failed to load summary");
            if summary.run.status.is_terminal() {
                return summary;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Run did not reach a terminal state in time")
}

async fn wait_for_running(dispatcher: &Dispatcher, run_id: Uuid) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let summary = dispatcher.summary(run_id).await.expect("Failed to load summary");
            if summary.totals.running > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("No task started running in time")
}

fn launch(specification_id: &str) -> LaunchRequest {
    LaunchRequest::new(specification_id, RunMode::Batch, Tier::Free)
}

fn events_of(dispatcher: &Dispatcher, run_id: Uuid) -> Vec<Event> {
    dispatcher
        .progress()
        .events_after(run_id, 0)
        .into_iter()
        .map(|e| e.event)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_every_task_reaches_a_terminal_state() {
        let harness = HarnessBuilder::new()
            .arena(term_arena("alpha"), Arc::new(FixedCollector::new("alpha", 10)))
            .arena(
                term_arena("beta"),
                Arc::new(FailingCollector {
                    platform: "beta",
                    error: CollectorError::UpstreamUnavailable("503".into()),
                }),
            )
            .arena(term_arena("gamma"), Arc::new(HangingCollector("gamma")))
            .specification(specification("s1", &["alpha", "beta", "gamma"]))
            .config(
                DispatcherConfig::default()
                    .with_sweep_interval(Duration::from_millis(20))
                    .with_platform_timeout("gamma", Duration::from_millis(300)),
            )
            .build()
            .await;
        let dispatcher = &harness.dispatcher;

        let outcome = dispatcher.launch(launch("s1")).await.unwrap();
        assert_eq!(outcome.tasks.len(), 3);
        assert!(outcome.skipped.is_empty());
        assert!(outcome.tasks.iter().all(|t| t.status == TaskStatus::Pending));

        let summary = wait_for_run(dispatcher, outcome.run.id).await;
        assert_eq!(summary.run.status, RunStatus::Completed);
        assert!(summary.run.finished_at.is_some());

        let alpha = summary.task("alpha").unwrap();
        assert_eq!(alpha.status, TaskStatus::Completed);
        assert_eq!(alpha.counters.records_admitted, 10);
        assert!(alpha.last_error.is_none());

        let beta = summary.task("beta").unwrap();
        assert_eq!(beta.status, TaskStatus::Failed);
        assert_eq!(
            beta.last_error.as_ref().map(|e| e.kind),
            Some(TaskErrorKind::UpstreamUnavailable)
        );

        let gamma = summary.task("gamma").unwrap();
        assert_eq!(gamma.status, TaskStatus::TimedOut);
        assert_eq!(
            gamma.last_error.as_ref().map(|e| e.kind),
            Some(TaskErrorKind::TimedOut)
        );
        assert!(gamma.completed_at.is_some());

        assert_eq!(summary.totals.completed, 1);
        assert_eq!(summary.totals.failed, 1);
        assert_eq!(summary.totals.timed_out, 1);
        assert_eq!(summary.totals.non_terminal(), 0);

        let records = dispatcher.records(outcome.run.id, 100).await.unwrap();
        assert_eq!(records.len(), 10);
        assert!(records.iter().all(|r| r.platform == "alpha"));
        assert_eq!(dispatcher.active_runs(), 0);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_collector_fails_its_task() {
        let harness = HarnessBuilder::new()
            .arena(term_arena("alpha"), Arc::new(PanickingCollector("alpha")))
            .arena(term_arena("beta"), Arc::new(FixedCollector::new("beta", 2)))
            .specification(specification("s1", &["alpha", "beta"]))
            .build()
            .await;

        let outcome = harness.dispatcher.launch(launch("s1")).await.unwrap();
        let summary = wait_for_run(&harness.dispatcher, outcome.run.id).await;

        assert_eq!(summary.run.status, RunStatus::Completed);
        let alpha = summary.task("alpha").unwrap();
        assert_eq!(alpha.status, TaskStatus::Failed);
        assert_eq!(
            alpha.last_error.as_ref().map(|e| e.kind),
            Some(TaskErrorKind::Internal)
        );
        assert_eq!(summary.task("beta").unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_tasks_queue_behind_a_single_worker() {
        let harness = HarnessBuilder::new()
            .arena(term_arena("alpha"), Arc::new(FixedCollector::new("alpha", 3)))
            .arena(term_arena("beta"), Arc::new(FixedCollector::new("beta", 3)))
            .arena(term_arena("gamma"), Arc::new(FixedCollector::new("gamma", 3)))
            .specification(specification("s1", &["alpha", "beta", "gamma"]))
            .config(
                DispatcherConfig::default()
                    .with_max_workers(1)
                    .with_sweep_interval(Duration::from_millis(20)),
            )
            .build()
            .await;

        let outcome = harness.dispatcher.launch(launch("s1")).await.unwrap();
        let summary = wait_for_run(&harness.dispatcher, outcome.run.id).await;

        assert_eq!(summary.totals.completed, 3);
        assert_eq!(summary.totals.records_admitted, 9);
    }

    #[tokio::test]
    async fn test_dual_capability_arena_runs_two_sub_jobs() {
        let arena = ArenaDescriptor::new("bluesky", "social_media")
            .with_tiers([Tier::Free])
            .with_capabilities([Capability::TermSearch, Capability::ActorSearch]);
        let mut spec = specification("s1", &["bluesky"]);
        spec.actors = vec!["@someone".to_string()];

        let harness = HarnessBuilder::new()
            .arena(arena, Arc::new(FixedCollector::new("bluesky", 3)))
            .specification(spec)
            .build()
            .await;

        let outcome = harness.dispatcher.launch(launch("s1")).await.unwrap();
        let capabilities: Vec<_> = outcome.tasks.iter().map(|t| t.capability).collect();
        assert_eq!(
            capabilities,
            vec![Capability::TermSearch, Capability::ActorSearch]
        );

        let summary = wait_for_run(&harness.dispatcher, outcome.run.id).await;
        assert_eq!(summary.totals.completed, 2);
        // Both sub-jobs see the same posts; each is stored once.
        assert_eq!(summary.totals.records_admitted, 3);
        assert_eq!(summary.totals.duplicates_rejected, 3);
    }

    #[tokio::test]
    async fn test_sweep_completes_orphaned_run() {
        let harness = HarnessBuilder::new()
            .arena(term_arena("alpha"), Arc::new(FixedCollector::new("alpha", 1)))
            .build()
            .await;

        // A run left running by an earlier process whose tasks all finished.
        let run = CollectionRun::new("s1", RunMode::Batch, Tier::Free);
        let task = CollectionTask::new(run.id, "alpha", Capability::TermSearch, Tier::Free);
        RunRepository::new(harness.pool.clone())
            .create_with_tasks(&run, std::slice::from_ref(&task))
            .await
            .unwrap();
        TaskRepository::new(harness.pool.clone())
            .finish(
                task.id,
                &TaskCompletion {
                    status: TaskStatus::Completed,
                    counters: Some(TaskCounters::default()),
                    error: None,
                    completed_at: chrono::Utc::now(),
                },
            )
            .await
            .unwrap();

        let report = harness.dispatcher.sweep_once().await.unwrap();
        assert_eq!(report.completed_runs, vec![run.id]);
        assert!(report.timed_out.is_empty());

        let summary = harness.dispatcher.summary(run.id).await.unwrap();
        assert_eq!(summary.run.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_sweep_times_out_stale_pending_task() {
        let harness = HarnessBuilder::new()
            .arena(term_arena("alpha"), Arc::new(FixedCollector::new("alpha", 1)))
            .config(DispatcherConfig::default().with_task_timeout(Duration::from_millis(50)))
            .build()
            .await;

        let run = CollectionRun::new("s1", RunMode::Batch, Tier::Free);
        let mut task = CollectionTask::new(run.id, "alpha", Capability::TermSearch, Tier::Free);
        task.dispatched_at = chrono::Utc::now() - chrono::Duration::seconds(5);
        RunRepository::new(harness.pool.clone())
            .create_with_tasks(&run, std::slice::from_ref(&task))
            .await
            .unwrap();

        let summary = wait_for_run(&harness.dispatcher, run.id).await;
        assert_eq!(summary.run.status, RunStatus::Completed);
        assert_eq!(summary.tasks[0].status, TaskStatus::TimedOut);
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn test_cancel_fails_in_flight_tasks() {
        let harness = HarnessBuilder::new()
            .arena(term_arena("alpha"), Arc::new(HangingCollector("alpha")))
            .arena(term_arena("beta"), Arc::new(HangingCollector("beta")))
            .specification(specification("s1", &["alpha", "beta"]))
            .build()
            .await;
        let dispatcher = &harness.dispatcher;

        let outcome = dispatcher.launch(launch("s1")).await.unwrap();
        wait_for_running(dispatcher, outcome.run.id).await;

        let summary = tokio::time::timeout(
            Duration::from_secs(2),
            dispatcher.cancel(outcome.run.id, "researcher stopped the run"),
        )
        .await
        .expect("Cancel waited for workers")
        .unwrap();

        assert_eq!(summary.run.status, RunStatus::Cancelled);
        assert_eq!(summary.totals.failed, 2);
        for task in &summary.tasks {
            let error = task.last_error.as_ref().unwrap();
            assert_eq!(error.kind, TaskErrorKind::Cancelled);
            assert_eq!(error.message, "researcher stopped the run");
        }

        // Workers noticing the cancellation must not overwrite the result.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let later = dispatcher.summary(outcome.run.id).await.unwrap();
        assert_eq!(later.run.status, RunStatus::Cancelled);
        assert!(later.tasks.iter().all(|t| {
            t.last_error.as_ref().map(|e| e.message.as_str()) == Some("researcher stopped the run")
        }));

        let events = events_of(dispatcher, outcome.run.id);
        assert!(matches!(events.last(), Some(Event::RunCancelled { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_task_keeps_counts_of_stored_records() {
        let harness = HarnessBuilder::new()
            .arena(
                term_arena("alpha"),
                Arc::new(StallingCollector {
                    inner: FixedCollector::new("alpha", 3),
                }),
            )
            .specification(specification("s1", &["alpha"]))
            .build()
            .await;
        let dispatcher = &harness.dispatcher;
        let content = db::ContentRepository::new(harness.pool.clone());

        let outcome = dispatcher.launch(launch("s1")).await.unwrap();
        let run_id = outcome.run.id;
        tokio::time::timeout(Duration::from_secs(5), async {
            while content.count_by_run(run_id).await.unwrap() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Records were not stored in time");

        dispatcher.cancel(run_id, "enough").await.unwrap();

        let task = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let summary = dispatcher.summary(run_id).await.unwrap();
                let task = summary.tasks[0].clone();
                if task.counters.records_admitted == 3 {
                    return task;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("Final counters were not recorded");

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(
            task.last_error.map(|e| e.kind),
            Some(TaskErrorKind::Cancelled)
        );
        assert_eq!(content.count_by_run(run_id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_cancel_finished_run_conflicts() {
        let harness = HarnessBuilder::new()
            .arena(term_arena("alpha"), Arc::new(FixedCollector::new("alpha", 1)))
            .specification(specification("s1", &["alpha"]))
            .build()
            .await;

        let outcome = harness.dispatcher.launch(launch("s1")).await.unwrap();
        wait_for_run(&harness.dispatcher, outcome.run.id).await;

        let err = harness
            .dispatcher
            .cancel(outcome.run.id, "too late")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::RunFinished(id) if id == outcome.run.id));
    }

    #[tokio::test]
    async fn test_cancel_unknown_run() {
        let harness = HarnessBuilder::new().build().await;
        let id = Uuid::new_v4();
        let err = harness.dispatcher.cancel(id, "nope").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::RunNotFound(missing) if missing == id));
    }
}

mod configuration {
    use super::*;

    #[tokio::test]
    async fn test_tier_precedence_reaches_tasks() {
        let premium = ArenaDescriptor::new("alpha", "social_media")
            .with_tiers([Tier::Free, Tier::Medium, Tier::Premium])
            .with_capabilities([Capability::TermSearch]);
        let mut spec = specification("s1", &[]);
        spec.arena_tiers = ArenaConfig::new()
            .with("alpha", ArenaSetting::tier(Tier::Medium))
            .with("beta", ArenaSetting::tier(Tier::Medium));

        let harness = HarnessBuilder::new()
            .arena(premium, Arc::new(FixedCollector::new("alpha", 1)))
            .arena(term_arena("beta"), Arc::new(FixedCollector::new("beta", 1)))
            .arena(term_arena("gamma"), Arc::new(FixedCollector::new("gamma", 1)))
            .specification(spec)
            .build()
            .await;

        let mut request = launch("s1");
        request.arena_overrides = ArenaConfig::new().with("alpha", ArenaSetting::tier(Tier::Premium));
        request.enabled_arenas.insert("gamma".to_string());

        let outcome = harness.dispatcher.launch(request).await.unwrap();
        let tier_of = |platform: &str| {
            outcome
                .tasks
                .iter()
                .find(|t| t.platform == platform)
                .map(|t| t.tier)
        };
        assert_eq!(tier_of("alpha"), Some(Tier::Premium));
        assert_eq!(tier_of("beta"), Some(Tier::Medium));
        assert_eq!(tier_of("gamma"), Some(Tier::Free));

        wait_for_run(&harness.dispatcher, outcome.run.id).await;
    }

    #[tokio::test]
    async fn test_unsupported_tier_aborts_launch() {
        let harness = HarnessBuilder::new()
            .arena(term_arena("alpha"), Arc::new(FixedCollector::new("alpha", 1)))
            .arena(term_arena("beta"), Arc::new(FixedCollector::new("beta", 1)))
            .specification(specification("s1", &["alpha", "beta"]))
            .build()
            .await;

        let mut request = launch("s1");
        request.arena_overrides = ArenaConfig::new().with("alpha", ArenaSetting::tier(Tier::Premium));

        let err = harness.dispatcher.launch(request).await.unwrap_err();
        match err {
            OrchestratorError::Configuration(errors) => {
                assert_eq!(
                    errors,
                    vec![ConfigurationError::UnsupportedTier {
                        platform: "alpha".to_string(),
                        tier: Tier::Premium,
                        supported: vec![Tier::Free, Tier::Medium],
                    }]
                );
            }
            other => panic!("expected configuration error, got {other:?}"),
        }

        // Nothing was persisted.
        assert!(harness.dispatcher.list_runs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skip_invalid_arenas_dispatches_the_rest() {
        let harness = HarnessBuilder::new()
            .arena(term_arena("alpha"), Arc::new(FixedCollector::new("alpha", 2)))
            .specification(specification("s1", &["alpha"]))
            .build()
            .await;

        let mut request = launch("s1");
        request.enabled_arenas.insert("nowhere".to_string());
        request.skip_invalid_arenas = true;

        let outcome = harness.dispatcher.launch(request).await.unwrap();
        assert_eq!(outcome.tasks.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].platform.as_deref(), Some("nowhere"));

        let summary = wait_for_run(&harness.dispatcher, outcome.run.id).await;
        assert_eq!(summary.totals.records_admitted, 2);
    }

    #[tokio::test]
    async fn test_unregistered_arena_aborts_by_default() {
        let harness = HarnessBuilder::new()
            .arena(term_arena("alpha"), Arc::new(FixedCollector::new("alpha", 2)))
            .specification(specification("s1", &["alpha"]))
            .build()
            .await;

        let mut request = launch("s1");
        request.enabled_arenas.insert("nowhere".to_string());

        let err = harness.dispatcher.launch(request).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Configuration(ref errors)
                if errors == &[ConfigurationError::ArenaNotRegistered("nowhere".to_string())]
        ));
        assert!(harness.dispatcher.list_runs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_collector_is_a_configuration_error() {
        let mut builder = HarnessBuilder::new()
            .arena(term_arena("alpha"), Arc::new(FixedCollector::new("alpha", 1)))
            .specification(specification("s1", &["alpha", "beta"]));
        builder.arenas.push(term_arena("beta"));
        let harness = builder.build().await;

        let err = harness.dispatcher.launch(launch("s1")).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Configuration(ref errors)
                if errors == &[ConfigurationError::NoCollector("beta".to_string())]
        ));
    }

    #[tokio::test]
    async fn test_launch_validation() {
        let harness = HarnessBuilder::new()
            .arena(term_arena("alpha"), Arc::new(FixedCollector::new("alpha", 1)))
            .specification(specification("s1", &["alpha"]))
            .build()
            .await;

        let err = harness.dispatcher.launch(launch("missing")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::SpecificationNotFound(ref id) if id == "missing"));

        let now = chrono::Utc::now();
        let mut live = LaunchRequest::new("s1", RunMode::Live, Tier::Free);
        live.date_range = Some(DateRange::new(now - chrono::Duration::days(1), now).unwrap());
        let err = harness.dispatcher.launch(live).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));

        let mut nothing_enabled = launch("s1");
        nothing_enabled.arena_overrides = ArenaConfig::new().with("alpha", ArenaSetting::disabled());
        let err = harness.dispatcher.launch(nothing_enabled).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
    }
}

mod credentials {
    use super::*;

    fn credentialed(platform: &str) -> ArenaDescriptor {
        term_arena(platform).requiring_credential()
    }

    fn pool_with(platform: &str) -> CredentialPool {
        let pool = CredentialPool::new(CredentialPolicy::default());
        pool.add(platform, Secret::new("token"));
        pool
    }

    #[tokio::test]
    async fn test_collector_error_reaches_the_pool() {
        let harness = HarnessBuilder::new()
            .arena(
                credentialed("reddit"),
                Arc::new(FailingCollector {
                    platform: "reddit",
                    error: CollectorError::rate_limited("429", Some(Duration::from_secs(60))),
                }),
            )
            .specification(specification("s1", &["reddit"]))
            .credentials(pool_with("reddit"))
            .build()
            .await;

        let outcome = harness.dispatcher.launch(launch("s1")).await.unwrap();
        let summary = wait_for_run(&harness.dispatcher, outcome.run.id).await;
        assert_eq!(
            summary.tasks[0].last_error.as_ref().map(|e| e.kind),
            Some(TaskErrorKind::RateLimited)
        );

        let health = harness.dispatcher.credentials().status("reddit");
        assert_eq!(health.len(), 1);
        assert_eq!(health[0].consecutive_errors, 1);
        assert!(health[0].cooldown_until.is_some());
        assert_eq!(health[0].in_flight, 0);
    }

    #[tokio::test]
    async fn test_upstream_error_leaves_credential_alone() {
        let harness = HarnessBuilder::new()
            .arena(
                credentialed("reddit"),
                Arc::new(FailingCollector {
                    platform: "reddit",
                    error: CollectorError::UpstreamUnavailable("502".into()),
                }),
            )
            .specification(specification("s1", &["reddit"]))
            .credentials(pool_with("reddit"))
            .build()
            .await;

        let outcome = harness.dispatcher.launch(launch("s1")).await.unwrap();
        wait_for_run(&harness.dispatcher, outcome.run.id).await;

        let health = harness.dispatcher.credentials().status("reddit");
        assert_eq!(health[0].consecutive_errors, 0);
        assert!(health[0].active);
    }

    #[tokio::test]
    async fn test_missing_credential_fails_task() {
        let harness = HarnessBuilder::new()
            .arena(credentialed("reddit"), Arc::new(FixedCollector::new("reddit", 1)))
            .specification(specification("s1", &["reddit"]))
            .build()
            .await;

        let outcome = harness.dispatcher.launch(launch("s1")).await.unwrap();
        let summary = wait_for_run(&harness.dispatcher, outcome.run.id).await;
        assert_eq!(summary.tasks[0].status, TaskStatus::Failed);
        assert_eq!(
            summary.tasks[0].last_error.as_ref().map(|e| e.kind),
            Some(TaskErrorKind::NoCredentialAvailable)
        );
    }
}

mod progress {
    use super::*;

    #[tokio::test]
    async fn test_events_follow_the_run() {
        let harness = HarnessBuilder::new()
            .arena(term_arena("alpha"), Arc::new(FixedCollector::new("alpha", 5)))
            .specification(specification("s1", &["alpha"]))
            .config(
                DispatcherConfig::default()
                    .with_progress_interval(2)
                    .with_sweep_interval(Duration::from_millis(20)),
            )
            .build()
            .await;
        let dispatcher = &harness.dispatcher;

        let outcome = dispatcher.launch(launch("s1")).await.unwrap();
        wait_for_run(dispatcher, outcome.run.id).await;

        let events = events_of(dispatcher, outcome.run.id);
        let names: Vec<_> = events.iter().map(Event::name).collect();
        assert_eq!(
            names,
            vec![
                "run.started",
                "task.created",
                "task.status_changed",
                "task.progress",
                "task.progress",
                "task.status_changed",
                "run.completed",
            ]
        );

        match &events[5] {
            Event::TaskStatusChanged {
                from_status,
                to_status,
                counters,
                ..
            } => {
                assert_eq!(*from_status, TaskStatus::Running);
                assert_eq!(*to_status, TaskStatus::Completed);
                assert_eq!(counters.records_admitted, 5);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let snapshot = dispatcher.progress().snapshot(outcome.run.id).unwrap();
        assert_eq!(snapshot.status, RunStatus::Completed);
        assert_eq!(snapshot.tasks[0].status, TaskStatus::Completed);
    }
}
