use std::collections::BTreeSet;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use collect_core::{CollectionRun, ContentRecord, DateRange, LaunchRequest, RunMode, Tier};
use orchestrator::{canonicalize_arena_config, LaunchOutcome, RunSummary};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_RECORD_LIMIT: i64 = 100;
const MAX_RECORD_LIMIT: i64 = 1000;

/// Launch payload. `arena_overrides` accepts any of the supported
/// per-arena configuration shapes.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LaunchRunRequest {
    pub specification_id: String,
    #[serde(default = "default_mode")]
    pub mode: RunMode,
    #[serde(default = "default_tier")]
    pub tier: Tier,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub arena_overrides: serde_json::Value,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub enabled_arenas: BTreeSet<String>,
    #[serde(default)]
    pub skip_invalid_arenas: bool,
}

fn default_mode() -> RunMode {
    RunMode::Batch
}

fn default_tier() -> Tier {
    Tier::Free
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelRunRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RecordsQuery {
    /// Maximum records returned (default 100, at most 1000)
    pub limit: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/api/runs",
    request_body = LaunchRunRequest,
    responses(
        (status = 201, description = "Run launched", body = LaunchOutcome),
        (status = 400, description = "Invalid request or arena configuration"),
        (status = 404, description = "Specification not found"),
    ),
    tag = "runs"
)]
pub async fn launch_run(
    State(state): State<AppState>,
    Json(payload): Json<LaunchRunRequest>,
) -> Result<(StatusCode, Json<LaunchOutcome>), AppError> {
    let arena_overrides = canonicalize_arena_config(&payload.arena_overrides, state.registry())?;

    let request = LaunchRequest {
        specification_id: payload.specification_id,
        mode: payload.mode,
        tier: payload.tier,
        arena_overrides,
        date_range: payload.date_range,
        enabled_arenas: payload.enabled_arenas,
        skip_invalid_arenas: payload.skip_invalid_arenas,
    };

    let outcome = state.dispatcher.launch(request).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[utoipa::path(
    get,
    path = "/api/runs",
    responses(
        (status = 200, description = "All runs, newest first", body = Vec<CollectionRun>)
    ),
    tag = "runs"
)]
pub async fn list_runs(State(state): State<AppState>) -> Result<Json<Vec<CollectionRun>>, AppError> {
    Ok(Json(state.dispatcher.list_runs().await?))
}

#[utoipa::path(
    get,
    path = "/api/runs/{id}",
    params(
        ("id" = Uuid, Path, description = "Run ID"),
    ),
    responses(
        (status = 200, description = "Run with its tasks and totals", body = RunSummary),
        (status = 404, description = "Run not found"),
    ),
    tag = "runs"
)]
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunSummary>, AppError> {
    Ok(Json(state.dispatcher.summary(id).await?))
}

#[utoipa::path(
    post,
    path = "/api/runs/{id}/cancel",
    params(
        ("id" = Uuid, Path, description = "Run ID"),
    ),
    responses(
        (status = 200, description = "Run cancelled", body = RunSummary),
        (status = 404, description = "Run not found"),
        (status = 409, description = "Run already finished"),
    ),
    tag = "runs"
)]
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelRunRequest>>,
) -> Result<Json<RunSummary>, AppError> {
    let reason = payload
        .and_then(|Json(body)| body.reason)
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "cancelled by request".to_string());

    Ok(Json(state.dispatcher.cancel(id, &reason).await?))
}

#[utoipa::path(
    get,
    path = "/api/runs/{id}/records",
    params(
        ("id" = Uuid, Path, description = "Run ID"),
        RecordsQuery,
    ),
    responses(
        (status = 200, description = "Admitted records, oldest first", body = Vec<ContentRecord>),
        (status = 400, description = "Invalid limit"),
        (status = 404, description = "Run not found"),
    ),
    tag = "runs"
)]
pub async fn list_records(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<Vec<ContentRecord>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_RECORD_LIMIT);
    if !(1..=MAX_RECORD_LIMIT).contains(&limit) {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_RECORD_LIMIT
        )));
    }

    Ok(Json(state.dispatcher.records(id, limit).await?))
}
