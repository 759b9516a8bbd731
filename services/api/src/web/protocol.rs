//! services/api/src/web/protocol.rs
//!
//! The uniform JSON envelope returned by every REST endpoint, plus the
//! helpers that shape validation and port errors into it.

use axum::http::StatusCode;
use axum::Json;
use book_discovery_core::ports::PortError;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// `{success, message?, data?, errors?}` — the envelope every endpoint
/// speaks, success and failure alike.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Per-field validation messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

impl<T> ApiEnvelope<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            errors: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            errors: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
            errors: None,
        }
    }

    pub fn validation(errors: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            success: false,
            message: Some("Validation failed".to_string()),
            data: None,
            errors: Some(errors),
        }
    }
}

/// The error side of every handler's `Result`.
pub type ErrorResponse = (StatusCode, Json<ApiEnvelope<Value>>);

pub fn error_response(status: StatusCode, message: impl Into<String>) -> ErrorResponse {
    (status, Json(ApiEnvelope::error(message)))
}

pub fn validation_response(errors: BTreeMap<String, Vec<String>>) -> ErrorResponse {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ApiEnvelope::validation(errors)),
    )
}

/// Maps a port error onto the envelope. Internal failure detail stays in
/// the logs, not in the response body.
pub fn port_error_response(error: PortError) -> ErrorResponse {
    match error {
        PortError::NotFound(message) => error_response(StatusCode::NOT_FOUND, message),
        PortError::Conflict(message) => error_response(StatusCode::CONFLICT, message),
        PortError::Unauthorized => error_response(StatusCode::UNAUTHORIZED, "Unauthorized"),
        PortError::Unavailable(_) | PortError::Unexpected(_) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Something went wrong, please try again",
        ),
    }
}

/// Accumulates per-field validation messages before a handler commits to
/// doing any work.
#[derive(Debug, Default)]
pub struct FieldErrors {
    map: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.map.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn into_response(self) -> ErrorResponse {
        validation_response(self.map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shapes() {
        let ok = serde_json::to_value(ApiEnvelope::data(42)).unwrap();
        assert_eq!(ok["success"], true);
        assert_eq!(ok["data"], 42);
        assert!(ok.get("message").is_none());
        assert!(ok.get("errors").is_none());

        let failed = serde_json::to_value(ApiEnvelope::<Value>::error("nope")).unwrap();
        assert_eq!(failed["success"], false);
        assert_eq!(failed["message"], "nope");
    }

    #[test]
    fn field_errors_group_by_field() {
        let mut errors = FieldErrors::default();
        assert!(errors.is_empty());
        errors.push("q", "The q parameter is required");
        errors.push("per_page", "per_page may not be greater than 40");
        errors.push("per_page", "per_page must be at least 1");

        let (status, Json(envelope)) = errors.into_response();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let errors = envelope.errors.unwrap();
        assert_eq!(errors["per_page"].len(), 2);
        assert_eq!(errors["q"].len(), 1);
    }

    #[test]
    fn port_errors_map_to_status_codes() {
        let (status, _) = port_error_response(PortError::NotFound("x".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = port_error_response(PortError::Conflict("x".into()));
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = port_error_response(PortError::Unauthorized);
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, Json(envelope)) =
            port_error_response(PortError::Unexpected("secret detail".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        // Internals never leak into the body.
        assert!(!envelope.message.unwrap().contains("secret"));
    }
}
