//! Event types for run and task progress

use chrono::{DateTime, Utc};
use collect_core::{
    Capability, CollectionTask, RunStatus, TaskCounters, TaskError, TaskStatus, Tier,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// Run this event belongs to
    pub run_id: Uuid,
    /// Position in the run's log, starting at 1
    pub sequence: u64,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create an envelope with auto-generated ID and timestamp
    pub fn new(run_id: Uuid, sequence: u64, event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            sequence,
            timestamp: Utc::now(),
            event,
        }
    }
}

/// All progress events of a collection run
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type")]
pub enum Event {
    /// Run launched with its tasks persisted
    #[serde(rename = "run.started")]
    RunStarted {
        specification_id: String,
        task_count: usize,
    },

    /// Task created in `pending`
    #[serde(rename = "task.created")]
    TaskCreated { task: TaskSnapshot },

    /// Task moved between states
    #[serde(rename = "task.status_changed")]
    TaskStatusChanged {
        task_id: Uuid,
        platform: String,
        from_status: TaskStatus,
        to_status: TaskStatus,
        counters: TaskCounters,
        error: Option<TaskError>,
    },

    /// Running task admitted more records
    #[serde(rename = "task.progress")]
    TaskProgress { task_id: Uuid, counters: TaskCounters },

    /// Every task terminal
    #[serde(rename = "run.completed")]
    RunCompleted { status: RunStatus },

    /// Cancelled by the caller
    #[serde(rename = "run.cancelled")]
    RunCancelled { reason: String },
}

impl Event {
    /// Get the task ID associated with this event, if any
    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            Event::TaskCreated { task } => Some(task.task_id),
            Event::TaskStatusChanged { task_id, .. } => Some(*task_id),
            Event::TaskProgress { task_id, .. } => Some(*task_id),
            Event::RunStarted { .. } | Event::RunCompleted { .. } | Event::RunCancelled { .. } => {
                None
            }
        }
    }

    /// Wire name, also used as the SSE event type
    pub fn name(&self) -> &'static str {
        match self {
            Event::RunStarted { .. } => "run.started",
            Event::TaskCreated { .. } => "task.created",
            Event::TaskStatusChanged { .. } => "task.status_changed",
            Event::TaskProgress { .. } => "task.progress",
            Event::RunCompleted { .. } => "run.completed",
            Event::RunCancelled { .. } => "run.cancelled",
        }
    }

    /// Whether no further events follow for the run
    pub fn is_run_terminal(&self) -> bool {
        matches!(self, Event::RunCompleted { .. } | Event::RunCancelled { .. })
    }
}

/// Current view of one task as seen by observers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct TaskSnapshot {
    pub task_id: Uuid,
    pub platform: String,
    pub capability: Capability,
    pub tier: Tier,
    pub status: TaskStatus,
    pub counters: TaskCounters,
    pub last_error: Option<TaskError>,
}

impl From<&CollectionTask> for TaskSnapshot {
    fn from(task: &CollectionTask) -> Self {
        Self {
            task_id: task.id,
            platform: task.platform.clone(),
            capability: task.capability,
            tier: task.tier,
            status: task.status,
            counters: task.counters,
            last_error: task.last_error.clone(),
        }
    }
}

/// State delivered to an observer before live events
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Sequence of the last event reflected in this snapshot
    pub sequence: u64,
    pub tasks: Vec<TaskSnapshot>,
}
