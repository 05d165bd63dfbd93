//! Per-run progress fan-out.
//!
//! Every run gets a bounded, append-only log of envelopes and a live view of
//! its tasks. Observers first receive that view, then every later event for
//! the run. The broadcaster never blocks publishers and holds no reference
//! to the dispatcher, so observers can come and go without affecting a run.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use collect_core::RunStatus;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::types::{Event, EventEnvelope, RunSnapshot, TaskSnapshot};

/// Capacity for the broadcast channel
const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
/// Envelopes retained per run for reconnects
pub const DEFAULT_LOG_CAPACITY: usize = 1000;
/// Logs of finished runs kept around for late observers
const DEFAULT_RETAINED_FINISHED: usize = 64;

struct RunLog {
    next_sequence: u64,
    status: RunStatus,
    tasks: BTreeMap<Uuid, TaskSnapshot>,
    events: VecDeque<EventEnvelope>,
}

impl RunLog {
    fn new() -> Self {
        Self {
            next_sequence: 1,
            status: RunStatus::Running,
            tasks: BTreeMap::new(),
            events: VecDeque::new(),
        }
    }

    fn apply(&mut self, event: &Event) {
        match event {
            Event::RunStarted { .. } => {}
            Event::TaskCreated { task } => {
                self.tasks.insert(task.task_id, task.clone());
            }
            Event::TaskStatusChanged {
                task_id,
                to_status,
                counters,
                error,
                ..
            } => {
                if let Some(task) = self.tasks.get_mut(task_id) {
                    task.status = *to_status;
                    task.counters = *counters;
                    if error.is_some() {
                        task.last_error = error.clone();
                    }
                }
            }
            Event::TaskProgress { task_id, counters } => {
                if let Some(task) = self.tasks.get_mut(task_id) {
                    task.counters = *counters;
                }
            }
            Event::RunCompleted { status } => self.status = *status,
            Event::RunCancelled { .. } => self.status = RunStatus::Cancelled,
        }
    }

    fn snapshot(&self, run_id: Uuid) -> RunSnapshot {
        RunSnapshot {
            run_id,
            status: self.status,
            sequence: self.next_sequence - 1,
            tasks: self.tasks.values().cloned().collect(),
        }
    }
}

#[derive(Default)]
struct Logs {
    runs: HashMap<Uuid, RunLog>,
    finished: VecDeque<Uuid>,
}

/// Append-only per-run event logs with live fan-out
#[derive(Clone)]
pub struct ProgressBroadcaster {
    sender: broadcast::Sender<EventEnvelope>,
    logs: Arc<Mutex<Logs>>,
    log_capacity: usize,
    retained_finished: usize,
    /// Number of events published (for monitoring)
    event_count: Arc<AtomicUsize>,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY, DEFAULT_LOG_CAPACITY)
    }

    pub fn with_capacity(channel_capacity: usize, log_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            sender,
            logs: Arc::new(Mutex::new(Logs::default())),
            log_capacity: log_capacity.max(1),
            retained_finished: DEFAULT_RETAINED_FINISHED,
            event_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Logs> {
        self.logs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an event to the run's log and fan it out.
    pub fn publish(&self, run_id: Uuid, event: Event) -> EventEnvelope {
        let mut logs = self.lock();
        let log = logs.runs.entry(run_id).or_insert_with(RunLog::new);

        let envelope = EventEnvelope::new(run_id, log.next_sequence, event);
        log.next_sequence += 1;
        log.apply(&envelope.event);
        if log.events.len() >= self.log_capacity {
            log.events.pop_front();
        }
        log.events.push_back(envelope.clone());

        if envelope.event.is_run_terminal() {
            logs.finished.push_back(run_id);
            while logs.finished.len() > self.retained_finished {
                if let Some(evicted) = logs.finished.pop_front() {
                    logs.runs.remove(&evicted);
                }
            }
        }

        // Sent under the lock so subscribers never see a sequence gap
        // between their snapshot and the live stream.
        self.event_count.fetch_add(1, Ordering::Relaxed);
        let _ = self.sender.send(envelope.clone());
        envelope
    }

    /// Snapshot of the run plus a receiver for every later event.
    ///
    /// Returns `None` for runs this broadcaster has never seen.
    pub fn subscribe(&self, run_id: Uuid) -> Option<RunSubscription> {
        let logs = self.lock();
        let log = logs.runs.get(&run_id)?;
        Some(self.from_snapshot(run_id, log))
    }

    /// Resume after `sequence`: replay what the log still holds, then live.
    ///
    /// Falls back to a snapshot subscription when events after `sequence`
    /// were already evicted from the log, or when `sequence` is ahead of it.
    pub fn resume(&self, run_id: Uuid, sequence: u64) -> Option<RunSubscription> {
        let logs = self.lock();
        let log = logs.runs.get(&run_id)?;

        let latest = log.next_sequence - 1;
        let evicted = log
            .events
            .front()
            .is_some_and(|oldest| oldest.sequence > sequence.saturating_add(1));
        if evicted || sequence > latest {
            return Some(self.from_snapshot(run_id, log));
        }

        let pending: VecDeque<_> = log
            .events
            .iter()
            .filter(|e| e.sequence > sequence)
            .cloned()
            .collect();
        let receiver = self.sender.subscribe();

        Some(RunSubscription {
            run_id,
            last_sequence: sequence,
            finished: pending.is_empty() && log.status.is_terminal(),
            snapshot: None,
            receiver,
            pending,
            broadcaster: self.clone(),
        })
    }

    fn from_snapshot(&self, run_id: Uuid, log: &RunLog) -> RunSubscription {
        let snapshot = log.snapshot(run_id);
        let receiver = self.sender.subscribe();

        RunSubscription {
            run_id,
            last_sequence: snapshot.sequence,
            finished: snapshot.status.is_terminal(),
            snapshot: Some(snapshot),
            receiver,
            pending: VecDeque::new(),
            broadcaster: self.clone(),
        }
    }

    pub fn snapshot(&self, run_id: Uuid) -> Option<RunSnapshot> {
        self.lock().runs.get(&run_id).map(|log| log.snapshot(run_id))
    }

    /// Envelopes still in the run's log with a sequence above `sequence`.
    pub fn events_after(&self, run_id: Uuid, sequence: u64) -> Vec<EventEnvelope> {
        self.lock()
            .runs
            .get(&run_id)
            .map(|log| {
                log.events
                    .iter()
                    .filter(|e| e.sequence > sequence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get the number of live receivers across all runs
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the total number of events published
    pub fn event_count(&self) -> usize {
        self.event_count.load(Ordering::Relaxed)
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressBroadcaster")
            .field("subscriber_count", &self.subscriber_count())
            .field("event_count", &self.event_count())
            .finish()
    }
}

/// One observer's view of one run.
pub struct RunSubscription {
    run_id: Uuid,
    last_sequence: u64,
    finished: bool,
    snapshot: Option<RunSnapshot>,
    receiver: broadcast::Receiver<EventEnvelope>,
    pending: VecDeque<EventEnvelope>,
    broadcaster: ProgressBroadcaster,
}

impl RunSubscription {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The initial snapshot, if this subscription started from one.
    pub fn take_snapshot(&mut self) -> Option<RunSnapshot> {
        self.snapshot.take()
    }

    /// Next event for this run, in sequence order.
    ///
    /// Returns `None` after the run's terminal event has been delivered.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        loop {
            if let Some(envelope) = self.pending.pop_front() {
                if envelope.sequence <= self.last_sequence {
                    continue;
                }
                return Some(self.deliver(envelope));
            }
            if self.finished {
                return None;
            }

            match self.receiver.recv().await {
                Ok(envelope) => {
                    if envelope.run_id != self.run_id || envelope.sequence <= self.last_sequence {
                        continue;
                    }
                    return Some(self.deliver(envelope));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(run_id = %self.run_id, skipped, "Progress observer lagged, replaying from log");
                    self.pending = self
                        .broadcaster
                        .events_after(self.run_id, self.last_sequence)
                        .into();
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn deliver(&mut self, envelope: EventEnvelope) -> EventEnvelope {
        self.last_sequence = envelope.sequence;
        if envelope.event.is_run_terminal() {
            self.finished = true;
            self.pending.clear();
        }
        envelope
    }
}
