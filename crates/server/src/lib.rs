pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Collection Orchestration API",
        version = "0.1.0",
        description = "Launch, observe and cancel multi-platform collection runs"
    ),
    paths(
        routes::health_check,
        routes::arenas::list_arenas,
        routes::arenas::list_specifications,
        routes::arenas::credential_status,
        routes::arenas::reactivate_credential,
        routes::runs::launch_run,
        routes::runs::list_runs,
        routes::runs::get_run,
        routes::runs::cancel_run,
        routes::runs::list_records,
        routes::sse::run_events,
    ),
    components(schemas(
        routes::HealthResponse,
        routes::runs::LaunchRunRequest,
        error::ErrorResponse,
        orchestrator::LaunchOutcome,
        orchestrator::SkippedArena,
        orchestrator::RunSummary,
        orchestrator::RunTotals,
        orchestrator::TierSource,
        collect_core::ArenaDescriptor,
        collect_core::ArenaSetting,
        collect_core::Capability,
        collect_core::CollectionRun,
        collect_core::CollectionTask,
        collect_core::ContentRecord,
        collect_core::CredentialHealth,
        collect_core::DateRange,
        collect_core::ResearchSpecification,
        collect_core::RunMode,
        collect_core::RunStatus,
        collect_core::TaskCounters,
        collect_core::TaskError,
        collect_core::TaskErrorKind,
        collect_core::TaskStatus,
        collect_core::Tier,
        events::EventEnvelope,
        events::Event,
        events::RunSnapshot,
        events::TaskSnapshot,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "arenas", description = "Arena catalog and specifications"),
        (name = "credentials", description = "Credential pool health"),
        (name = "runs", description = "Collection run lifecycle"),
        (name = "events", description = "Real-time run progress (SSE)"),
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route("/api/openapi.json", get(openapi_json))
        .route("/api/arenas", get(routes::arenas::list_arenas))
        .route(
            "/api/specifications",
            get(routes::arenas::list_specifications),
        )
        .route(
            "/api/arenas/{platform}/credentials",
            get(routes::arenas::credential_status),
        )
        .route(
            "/api/credentials/{id}/reactivate",
            post(routes::arenas::reactivate_credential),
        )
        .route(
            "/api/runs",
            get(routes::runs::list_runs).post(routes::runs::launch_run),
        )
        .route("/api/runs/{id}", get(routes::runs::get_run))
        .route("/api/runs/{id}/cancel", post(routes::runs::cancel_run))
        .route("/api/runs/{id}/records", get(routes::runs::list_records))
        .route("/api/runs/{id}/events", get(routes::sse::run_events))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
