use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use causerie_store::StoreError;

/// Error taxonomy of the delivery core.
///
/// Presence-layer push failures never appear here: once a message is
/// durable, a failed live push is logged and swallowed, not surfaced as a
/// failure of the triggering operation.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Malformed send request: empty payload, self-messaging, bad
    /// attachment metadata.  Rejected before persistence.
    #[error("Invalid message: {0}")]
    Invalid(String),

    /// Referenced message or user does not exist, or is already in the
    /// requested terminal state.  Benign; callers refresh rather than
    /// retry.
    #[error("Record not found")]
    NotFound,

    /// Missing or unresolvable bearer token.
    #[error("Authentication required")]
    Unauthenticated,

    /// The caller may not perform this action (wrong role, or a policy
    /// such as the delete retention window rejected it).
    #[error("Forbidden: {0}")]
    Unauthorized(String),

    /// Persistence layer failure.  Always surfaced to the initiating
    /// caller; never reported as partial success.
    #[error("Storage error: {0}")]
    Storage(#[source] StoreError),

    /// A bounded storage operation exceeded its deadline.  Retryable.
    #[error("Operation timed out: {0}")]
    Timeout(&'static str),

    /// Unexpected internal failure (e.g. a panicked blocking task).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServerError::NotFound,
            other => ServerError::Storage(other),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Invalid(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::Unauthorized(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::Storage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }
            ServerError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, self.to_string()),
            ServerError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err = ServerError::from(StoreError::NotFound);
        assert!(matches!(err, ServerError::NotFound));
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (ServerError::Invalid("x".into()), StatusCode::BAD_REQUEST),
            (ServerError::NotFound, StatusCode::NOT_FOUND),
            (ServerError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (ServerError::Unauthorized("x".into()), StatusCode::FORBIDDEN),
            (ServerError::Timeout("fetch"), StatusCode::GATEWAY_TIMEOUT),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
