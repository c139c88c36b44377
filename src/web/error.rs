use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::chat::ChatError;
use crate::store::StoreError;

/// Request-level failure mapped to an HTTP status and JSON body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request body: {0}")]
    BadRequest(String),

    #[error("storage unavailable: {0}")]
    Storage(#[from] StoreError),

    #[error("reply generation failed: {0}")]
    Generator(String),
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::Store(e) => ApiError::Storage(e),
            ChatError::Generator(msg) => ApiError::Generator(msg),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Generator(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error, detail) = match self {
            ApiError::BadRequest(detail) => ("invalid request body", detail.clone()),
            ApiError::Storage(e) => ("storage unavailable", e.to_string()),
            ApiError::Generator(detail) => ("reply generation failed", detail.clone()),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": error,
            "detail": detail,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_status_codes() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ChatError::Store(StoreError::Connection("down".into()))).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(ChatError::Generator("timeout".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
