//! Maps the orchestrator's error taxonomy onto HTTP responses per the
//! service's error handling design: every handler returns
//! `Result<T, ApiError>` and `?`-propagates a `DtsError` straight through.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dts_model::DtsError;

#[derive(Debug, serde::Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl std::fmt::Display) -> Self {
        Self {
            status,
            error: error.to_string(),
        }
    }
}

impl From<DtsError> for ApiError {
    fn from(err: DtsError) -> Self {
        let status = match &err {
            DtsError::TransferNotFound(_) => StatusCode::NOT_FOUND,
            DtsError::DatabaseNotFound(_) => StatusCode::NOT_FOUND,
            DtsError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            DtsError::Unauthorized => StatusCode::UNAUTHORIZED,
            DtsError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            DtsError::InvalidSearchParameter { .. } => StatusCode::BAD_REQUEST,
            DtsError::InvalidEndpoint(_) => StatusCode::BAD_REQUEST,
            DtsError::NoFilesRequested => StatusCode::BAD_REQUEST,
            DtsError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DtsError::DowngradedRedirect(_) => StatusCode::BAD_GATEWAY,
            DtsError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DtsError::AlreadyRegistered(_) | DtsError::AlreadyRunning | DtsError::NotOpen => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            DtsError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %err, "request failed with an internal error");
        }
        Self::new(status, err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, axum::Json(self)).into_response()
    }
}
