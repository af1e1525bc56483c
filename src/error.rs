use actix_web::http::StatusCode;
use thiserror::Error;

/// Failure taxonomy surfaced through the JSON envelopes.
///
/// Every variant carries a human-readable message; nothing past the endpoint
/// layer ever sees a raw panic or backend error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing input. The caller can fix the request.
    #[error("{0}")]
    Validation(String),

    /// The browser could not reach or render the target URL.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The datastore rejected a read or write.
    #[error("database error: {0}")]
    Persistence(String),

    /// No record exists for the requested identifier.
    #[error("no capture found for that id")]
    NotFound,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Fetch(_) | AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            AppError::Validation("url is required".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Fetch("navigation timed out".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Persistence("connection refused".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn messages_surface_the_underlying_cause() {
        let e = AppError::Fetch("net::ERR_NAME_NOT_RESOLVED".into());
        assert_eq!(e.to_string(), "fetch failed: net::ERR_NAME_NOT_RESOLVED");

        let e = AppError::Validation("url must start with http:// or https://".into());
        assert_eq!(e.to_string(), "url must start with http:// or https://");
    }
}
