use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use events::{EventEnvelope, RunSnapshot, RunSubscription, TaskSnapshot};
use futures::stream::{self, BoxStream, StreamExt};
use orchestrator::RunSummary;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

type SseStream = BoxStream<'static, Result<Event, Infallible>>;

fn last_event_id(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("Last-Event-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

fn envelope_to_sse_event(envelope: &EventEnvelope) -> Result<Event, Infallible> {
    let data = serde_json::to_string(envelope).unwrap_or_else(|_| "{}".to_string());

    Ok(Event::default()
        .id(envelope.sequence.to_string())
        .event(envelope.event.name())
        .data(data))
}

fn snapshot_to_sse_event(snapshot: &RunSnapshot) -> Result<Event, Infallible> {
    let data = serde_json::to_string(snapshot).unwrap_or_else(|_| "{}".to_string());

    Ok(Event::default()
        .id(snapshot.sequence.to_string())
        .event("snapshot")
        .data(data))
}

/// Snapshot for a run the broadcaster does not hold, e.g. one from before a
/// restart.
fn stored_snapshot(summary: &RunSummary) -> RunSnapshot {
    RunSnapshot {
        run_id: summary.run.id,
        status: summary.run.status,
        sequence: 0,
        tasks: summary.tasks.iter().map(TaskSnapshot::from).collect(),
    }
}

/// The subscription's snapshot, if it carries one, then its live events.
fn subscription_events(mut subscription: RunSubscription) -> SseStream {
    let head = subscription
        .take_snapshot()
        .map(|snapshot| snapshot_to_sse_event(&snapshot));
    let live = stream::unfold(subscription, |mut subscription| async move {
        let envelope = subscription.recv().await?;
        Some((envelope_to_sse_event(&envelope), subscription))
    });

    stream::iter(head).chain(live).boxed()
}

#[utoipa::path(
    get,
    path = "/api/runs/{id}/events",
    params(
        ("id" = Uuid, Path, description = "Run ID"),
        ("Last-Event-ID" = Option<u64>, Header, description = "Resume after this event sequence"),
    ),
    responses(
        (status = 200, description = "SSE stream: a snapshot (or the missed events), then live events until the run ends"),
        (status = 404, description = "Run not found"),
    ),
    tag = "events"
)]
pub async fn run_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let progress = state.progress();

    let subscription = match last_event_id(&headers) {
        Some(sequence) => progress.resume(id, sequence),
        None => progress.subscribe(id),
    };

    let stream: SseStream = match subscription {
        Some(subscription) => subscription_events(subscription),
        None => {
            let summary = state.dispatcher.summary(id).await?;
            tracing::debug!(run_id = %id, "Serving stored snapshot for untracked run");
            stream::once(async move { snapshot_to_sse_event(&stored_snapshot(&summary)) }).boxed()
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    ))
}
