//! Error responses.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::CommerceError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub error: &'static str,
    pub message: String,
}

impl CommerceError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CommerceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = ErrorBody {
            status_code: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error"),
            message,
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for CommerceError {
    fn from(rejection: JsonRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<PathRejection> for CommerceError {
    fn from(rejection: PathRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<QueryRejection> for CommerceError {
    fn from(rejection: QueryRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_internal_detail_is_hidden() {
        let response = CommerceError::Internal("db password is hunter2".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["statusCode"], 500);
        assert_eq!(body["error"], "Internal Server Error");
        assert_eq!(body["message"], "Internal server error");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(CommerceError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(CommerceError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(CommerceError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(CommerceError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
    }
}
