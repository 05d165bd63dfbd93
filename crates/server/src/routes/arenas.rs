use axum::extract::{Path, State};
use axum::Json;
use collect_core::{ArenaDescriptor, CredentialHealth, ResearchSpecification};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/arenas",
    responses(
        (status = 200, description = "Registered arenas, sorted by platform", body = Vec<ArenaDescriptor>)
    ),
    tag = "arenas"
)]
pub async fn list_arenas(State(state): State<AppState>) -> Json<Vec<ArenaDescriptor>> {
    Json(state.registry().iter().cloned().collect())
}

#[utoipa::path(
    get,
    path = "/api/specifications",
    responses(
        (status = 200, description = "Research specifications available to launch", body = Vec<ResearchSpecification>)
    ),
    tag = "arenas"
)]
pub async fn list_specifications(
    State(state): State<AppState>,
) -> Result<Json<Vec<ResearchSpecification>>, AppError> {
    Ok(Json(state.specifications().list().await?))
}

#[utoipa::path(
    get,
    path = "/api/arenas/{platform}/credentials",
    params(
        ("platform" = String, Path, description = "Platform identifier"),
    ),
    responses(
        (status = 200, description = "Credential health, secrets omitted", body = Vec<CredentialHealth>),
        (status = 404, description = "Platform not registered"),
    ),
    tag = "credentials"
)]
pub async fn credential_status(
    State(state): State<AppState>,
    Path(platform): Path<String>,
) -> Result<Json<Vec<CredentialHealth>>, AppError> {
    if !state.registry().contains(&platform) {
        return Err(AppError::NotFound(format!("Arena not registered: {}", platform)));
    }
    Ok(Json(state.credentials().status(&platform)))
}

#[utoipa::path(
    post,
    path = "/api/credentials/{id}/reactivate",
    params(
        ("id" = Uuid, Path, description = "Credential ID"),
    ),
    responses(
        (status = 200, description = "Credential back in rotation", body = CredentialHealth),
        (status = 404, description = "Unknown credential"),
    ),
    tag = "credentials"
)]
pub async fn reactivate_credential(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CredentialHealth>, AppError> {
    Ok(Json(state.credentials().reactivate(id)?))
}
