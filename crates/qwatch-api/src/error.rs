use qwatch_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl From<qwatch_model::ModelError> for ApiError {
    fn from(err: qwatch_model::ModelError) -> Self {
        ApiError::InvalidRequest(err.to_string())
    }
}

#[cfg(feature = "http")]
impl ApiError {
    pub fn status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;

        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::TaskNotFound(_) | ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Core(e) => match e {
                CoreError::TaskNotFound(_) | CoreError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                CoreError::NoBuilder(_) | CoreError::InvalidRequest(_) | CoreError::Model(_) => {
                    StatusCode::BAD_REQUEST
                }
                CoreError::DuplicateTask(_) | CoreError::MonitorInUse(_) => StatusCode::CONFLICT,
                CoreError::NoRuntime | CoreError::Config(_) | CoreError::Monitor(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

#[cfg(feature = "http")]
impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(all(test, feature = "http"))]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse};
    use qwatch_model::TaskId;

    #[test]
    fn core_errors_map_to_http_statuses() {
        let cases = [
            (ApiError::from(CoreError::TaskNotFound(TaskId::from("9"))), StatusCode::NOT_FOUND),
            (ApiError::from(CoreError::NoBuilder("scan".into())), StatusCode::BAD_REQUEST),
            (ApiError::from(CoreError::NoRuntime), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::Forbidden("admin only".into()), StatusCode::FORBIDDEN),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
