use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orchestrator::{ConfigurationError, CredentialError, OrchestratorError};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
    Orchestrator(OrchestratorError),
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            AppError::Orchestrator(err) => {
                let message = err.to_string();
                match err {
                    OrchestratorError::RunNotFound(_)
                    | OrchestratorError::SpecificationNotFound(_)
                    | OrchestratorError::Credential(CredentialError::UnknownCredential(_)) => {
                        (StatusCode::NOT_FOUND, "not_found", message)
                    }
                    OrchestratorError::Validation(_) => {
                        (StatusCode::BAD_REQUEST, "bad_request", message)
                    }
                    OrchestratorError::Configuration(_) => {
                        (StatusCode::BAD_REQUEST, "configuration_error", message)
                    }
                    OrchestratorError::RunFinished(_)
                    | OrchestratorError::InvalidTransition { .. }
                    | OrchestratorError::Credential(CredentialError::NoCredentialAvailable(_)) => {
                        (StatusCode::CONFLICT, "conflict", message)
                    }
                    OrchestratorError::Database(err) => {
                        tracing::error!(error = ?err, "Database error");
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "database_error",
                            "Database error occurred".to_string(),
                        )
                    }
                }
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        AppError::Orchestrator(err)
    }
}

impl From<ConfigurationError> for AppError {
    fn from(err: ConfigurationError) -> Self {
        AppError::Orchestrator(err.into())
    }
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        AppError::Orchestrator(err.into())
    }
}
