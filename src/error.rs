// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

/// HTTP API error with appropriate status codes and client-friendly messages.
///
/// The variants are the service's whole error taxonomy on the wire: callers
/// get a small, stable set of distinguishable shapes ("license not found" vs
/// "email not authorized" vs "account disabled" vs "too many attempts").
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 403 Forbidden - missing or bad admin credential
    Unauthorized(String),

    // 403 Forbidden - license or membership disabled (distinct message)
    Inactive(String),

    // 404 Not Found - no such license code
    NotFound(String),

    // 429 Too Many Requests, with a retry-after hint in seconds
    RateLimited { message: String, retry_after_secs: u64 },

    // 500 Internal Server Error
    Internal(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized(_) => 403,
            ApiError::Inactive(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::RateLimited { .. } => 429,
            ApiError::Internal(_) => 500,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Inactive(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::RateLimited { message, .. } => message,
            ApiError::Internal(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Inactive(_) => "INACTIVE",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::RateLimited { .. } => "TOO_MANY_REQUESTS",
            ApiError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "success": false,
            "error": self.message(),
            "code": self.error_code(),
        })
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn inactive(message: impl Into<String>) -> Self {
        ApiError::Inactive(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        ApiError::RateLimited { message: message.into(), retry_after_secs }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }
}

// Convert storage errors to ApiError without exposing internal detail
impl From<crate::database::store::StoreError> for ApiError {
    fn from(err: crate::database::store::StoreError) -> Self {
        tracing::error!("store error: {}", err);
        ApiError::internal("Database error")
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = self.to_json();

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after_secs, .. } = self {
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(ApiError::bad_request("x").status_code(), 400);
        assert_eq!(ApiError::unauthorized("x").status_code(), 403);
        assert_eq!(ApiError::inactive("x").status_code(), 403);
        assert_eq!(ApiError::not_found("x").status_code(), 404);
        assert_eq!(ApiError::rate_limited("x", 900).status_code(), 429);
        assert_eq!(ApiError::internal("x").status_code(), 500);
    }

    #[test]
    fn inactive_and_unauthorized_are_distinguishable() {
        let unauthorized = ApiError::unauthorized("Unauthorized access");
        let inactive = ApiError::inactive("Account disabled. Contact your administrator.");
        assert_eq!(unauthorized.status_code(), inactive.status_code());
        assert_ne!(unauthorized.error_code(), inactive.error_code());
    }

    #[test]
    fn body_carries_success_false() {
        let body = ApiError::not_found("License not found").to_json();
        assert_eq!(body["success"], serde_json::json!(false));
        assert_eq!(body["error"], serde_json::json!("License not found"));
    }
}
