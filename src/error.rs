// Typed errors with thiserror. Surface readable messages to JS, never raw traces.
// See DESIGN.md: Error handling

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport-level failure of a backend call, as reported by the host.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HttpFailure {
    /// Server answered with an error status.
    #[error("API Error {status}: {message}")]
    Status { status: u16, message: String },

    /// Request went out, nothing came back.
    #[error("Network Error: No response from server")]
    NoResponse,

    #[error("Request Error: {message}")]
    Request { message: String },
}

/// Document-store failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreErrorKind {
    PermissionDenied,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    Aborted,
    Unavailable,
    DeadlineExceeded,
    ResourceExhausted,
    Unauthenticated,
    Other,
}

impl StoreErrorKind {
    /// Classify a store error code such as `permission-denied`.
    pub fn from_code(code: &str) -> Self {
        // Some SDKs prefix codes with the service name.
        let code = code.rsplit('/').next().unwrap_or(code);
        match code {
            "permission-denied" => StoreErrorKind::PermissionDenied,
            "not-found" | "object-not-found" => StoreErrorKind::NotFound,
            "already-exists" => StoreErrorKind::AlreadyExists,
            "failed-precondition" => StoreErrorKind::FailedPrecondition,
            "aborted" => StoreErrorKind::Aborted,
            "unavailable" => StoreErrorKind::Unavailable,
            "deadline-exceeded" => StoreErrorKind::DeadlineExceeded,
            "resource-exhausted" => StoreErrorKind::ResourceExhausted,
            "unauthenticated" => StoreErrorKind::Unauthenticated,
            _ => StoreErrorKind::Other,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            StoreErrorKind::PermissionDenied => "Permission denied. Please check your authentication.",
            StoreErrorKind::NotFound => "Route not found.",
            StoreErrorKind::AlreadyExists => "Route already exists.",
            StoreErrorKind::FailedPrecondition => "Operation failed due to a precondition.",
            StoreErrorKind::Aborted => "Operation was aborted. Please try again.",
            StoreErrorKind::Unavailable => "Service is currently unavailable. Please try again later.",
            StoreErrorKind::DeadlineExceeded => "Request timed out. Please try again.",
            StoreErrorKind::ResourceExhausted => "Too many requests. Please try again later.",
            StoreErrorKind::Unauthenticated => "You must be logged in to perform this action.",
            StoreErrorKind::Other => "A database error occurred",
        }
    }
}

/// Core error types.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Http(#[from] HttpFailure),

    #[error("{}", .0.message())]
    Store(StoreErrorKind),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("unauthenticated: no signed-in user")]
    AuthRequired,

    #[error("Invalid request: {0} is required")]
    MissingField(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Host bridge error: {0}")]
    Bridge(String),
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        ScanError::Serialization(err.to_string())
    }
}

impl ScanError {
    /// Message safe to show the user. `context` names the failed action.
    pub fn user_message(&self, context: &str) -> String {
        match self {
            ScanError::Store(kind) => kind.message().to_string(),
            ScanError::AuthRequired => "Please sign in to continue.".to_string(),
            other => friendly_message(&other.to_string(), Some(context)),
        }
    }
}

/// Normalize raw failure text into a short user-facing message.
pub fn friendly_message(raw: &str, context: Option<&str>) -> String {
    let lower = raw.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    let message = if has("auth/requires-recent-login") {
        "For security, please reauthenticate and try again."
    } else if has("permission") {
        "You do not have permission to perform this action."
    } else if has("unauthenticated") {
        "Please sign in to continue."
    } else if has("network") || has("failed to fetch") {
        "Network error. Check your connection and try again."
    } else if has("timeout") || has("timed out") {
        "The request took too long. Please try again."
    } else if has("object-not-found") || has("not found") {
        "The requested item could not be found."
    } else if has("unavailable") {
        "Service is temporarily unavailable. Please try again later."
    } else if has("invalid") || has("bad request") {
        "Something seems off with the request. Please try again."
    } else if let Some(context) = context {
        return format!("{} failed. Please try again.", context);
    } else {
        "Something went wrong. Please try again."
    };

    message.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ScanError::InvalidConfig("missing field".to_string());
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn http_failure_display_matches_wire_text() {
        let err = HttpFailure::Status {
            status: 502,
            message: "Bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "API Error 502: Bad gateway");
        assert_eq!(
            HttpFailure::NoResponse.to_string(),
            "Network Error: No response from server"
        );
    }

    #[test]
    fn no_response_becomes_network_message() {
        let err = ScanError::from(HttpFailure::NoResponse);
        assert_eq!(
            err.user_message("Detecting route"),
            "Network error. Check your connection and try again."
        );
    }

    #[test]
    fn unknown_failure_falls_back_to_context() {
        let err = ScanError::from(HttpFailure::Status {
            status: 500,
            message: "boom".to_string(),
        });
        assert_eq!(
            err.user_message("Reading route grade"),
            "Reading route grade failed. Please try again."
        );
        assert_eq!(
            friendly_message("boom", None),
            "Something went wrong. Please try again."
        );
    }

    #[test]
    fn store_codes_map_to_categories() {
        assert_eq!(
            StoreErrorKind::from_code("permission-denied"),
            StoreErrorKind::PermissionDenied
        );
        assert_eq!(
            StoreErrorKind::from_code("storage/object-not-found"),
            StoreErrorKind::NotFound
        );
        assert_eq!(StoreErrorKind::from_code("weird"), StoreErrorKind::Other);
        let err = ScanError::Store(StoreErrorKind::Unavailable);
        assert_eq!(
            err.user_message("Saving route"),
            "Service is currently unavailable. Please try again later."
        );
    }

    #[test]
    fn http_failure_parses_from_host_json() {
        let failure: HttpFailure =
            serde_json::from_str(r#"{"kind":"status","status":404,"message":"missing"}"#).unwrap();
        assert_eq!(
            failure,
            HttpFailure::Status {
                status: 404,
                message: "missing".to_string()
            }
        );
    }
}
