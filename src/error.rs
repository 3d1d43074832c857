use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::{
    dao::storage::StorageError,
    state::{
        AbortError, ApplyError, PlanError,
        rules::{InvalidMoveReason, MoveError},
    },
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// A concurrent write won; the caller should reload and retry.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
    /// The turn engine refused the move.
    #[error(transparent)]
    Move(#[from] MoveError),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            conflict @ (StorageError::VersionConflict { .. }
            | StorageError::AlreadyExists { .. }) => ServiceError::Conflict(conflict.to_string()),
            unavailable @ StorageError::Unavailable { .. } => ServiceError::Unavailable(unavailable),
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// The caller is not allowed to act right now.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Conflict(message) => AppError::Conflict(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Timeout => AppError::ServiceUnavailable("operation timed out".into()),
            ServiceError::Move(err) => err.into(),
        }
    }
}

impl From<MoveError> for AppError {
    fn from(err: MoveError) -> Self {
        let message = err.to_string();
        match err {
            MoveError::InvalidMove(_) => AppError::BadRequest(message),
            MoveError::NotYourTurn => AppError::Forbidden(message),
            MoveError::GameNotActive => AppError::Conflict(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

impl From<PlanError> for ServiceError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::AlreadyPending => {
                ServiceError::Move(MoveError::from(InvalidMoveReason::MoveInProgress))
            }
            PlanError::Rejected(rejection) => ServiceError::Move(rejection),
        }
    }
}

impl From<ApplyError> for ServiceError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::NoPending => ServiceError::InvalidState("no mutation is pending".into()),
            ApplyError::IdMismatch { .. } => {
                ServiceError::InvalidState("pending mutation does not match".into())
            }
            ApplyError::VersionMismatch { expected, actual } => ServiceError::InvalidState(
                format!("session version mismatch during commit (expected {expected}, got {actual})"),
            ),
        }
    }
}

impl From<AbortError> for ServiceError {
    fn from(err: AbortError) -> Self {
        match err {
            AbortError::NoPending => ServiceError::InvalidState("no pending mutation".into()),
            AbortError::IdMismatch { .. } => {
                ServiceError::InvalidState("mutation plan does not match".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn status_of(err: impl Into<AppError>) -> StatusCode {
        let err: AppError = err.into();
        err.into_response().status()
    }

    #[test]
    fn move_errors_map_to_distinct_statuses() {
        assert_eq!(
            status_of(ServiceError::Move(MoveError::from(
                InvalidMoveReason::AlreadyRevealed(3)
            ))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ServiceError::Move(MoveError::NotYourTurn)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(ServiceError::Move(MoveError::GameNotActive)),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn storage_failures_map_to_service_unavailable_or_conflict() {
        let conflict = ServiceError::from(StorageError::VersionConflict {
            id: Uuid::nil(),
            expected: 3,
            actual: Some(4),
        });
        assert_eq!(status_of(conflict), StatusCode::CONFLICT);

        let unavailable = ServiceError::from(StorageError::unavailable(
            "down".into(),
            std::io::Error::other("refused"),
        ));
        assert_eq!(status_of(unavailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(ServiceError::Degraded), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(ServiceError::Timeout), StatusCode::SERVICE_UNAVAILABLE);
    }
}
