//! The one error envelope every endpoint speaks.
//!
//! Success is 2xx with a typed body; every failure is a non-2xx status with
//! `{"error": {"code", "message", "details"}}`. Failure is never smuggled
//! inside a 200.

use crate::agencies::AdapterError;
use crate::fetch::FetchError;
use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorCode {
    InvalidParams,
    UnknownAgency,
    NotFound,
    Forbidden,
    RideFull,
    AlreadyJoined,
    MissingCredentials,
    UpstreamTimeout,
    UpstreamUnavailable,
    UpstreamDecode,
    Internal,
}

impl ApiErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidParams => StatusCode::BAD_REQUEST,
            ApiErrorCode::UnknownAgency | ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ApiErrorCode::RideFull | ApiErrorCode::AlreadyJoined => StatusCode::CONFLICT,
            ApiErrorCode::MissingCredentials => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiErrorCode::UpstreamUnavailable | ApiErrorCode::UpstreamDecode => {
                StatusCode::BAD_GATEWAY
            }
            ApiErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::InvalidParams, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        (status, Json(json!({ "error": self }))).into_response()
    }
}

impl From<AdapterError> for ApiError {
    fn from(err: AdapterError) -> Self {
        let message = err.to_string();
        match err {
            AdapterError::MissingCredentials(_) => {
                ApiError::new(ApiErrorCode::MissingCredentials, message)
            }
            AdapterError::Fetch(FetchError::Timeout(_)) => {
                ApiError::new(ApiErrorCode::UpstreamTimeout, message)
            }
            AdapterError::Fetch(FetchError::Decode(_)) | AdapterError::Vendor { .. } => {
                ApiError::new(ApiErrorCode::UpstreamDecode, message)
            }
            AdapterError::Fetch(FetchError::Status { status, .. }) => {
                ApiError::new(ApiErrorCode::UpstreamUnavailable, message)
                    .with_details(json!({ "upstream_status": status }))
            }
            AdapterError::Fetch(_) | AdapterError::Rejected { .. } => {
                ApiError::new(ApiErrorCode::UpstreamUnavailable, message)
            }
            AdapterError::UnknownRoute { .. } => ApiError::invalid_params(message),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::NotFound => ApiError::new(ApiErrorCode::NotFound, message),
            StoreError::NotOwner => ApiError::new(ApiErrorCode::Forbidden, message),
            StoreError::RideFull => ApiError::new(ApiErrorCode::RideFull, message),
            StoreError::AlreadyJoined => ApiError::new(ApiErrorCode::AlreadyJoined, message),
            StoreError::Transport(_) | StoreError::Rejected(_) => {
                ApiError::new(ApiErrorCode::UpstreamUnavailable, message)
            }
            StoreError::Decode(_) => ApiError::new(ApiErrorCode::Internal, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiErrorCode::InvalidParams.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiErrorCode::RideFull.status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiErrorCode::UpstreamTimeout.status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiErrorCode::MissingCredentials.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_envelope_shape() {
        let err = ApiError::new(ApiErrorCode::RideFull, "ride is already full");
        let body = serde_json::to_value(&err).unwrap();
        assert_eq!(body["code"], "ride_full");
        assert_eq!(body["message"], "ride is already full");
        assert!(body.get("details").is_none());
    }

    #[test]
    fn test_store_error_conversion() {
        let err: ApiError = StoreError::RideFull.into();
        assert_eq!(err.code, ApiErrorCode::RideFull);

        let err: ApiError = StoreError::NotOwner.into();
        assert_eq!(err.code, ApiErrorCode::Forbidden);
    }
}
