use serde_json::Value;
use thiserror::Error;

/// Shown when the backend's error payload has no usable message.
pub const GENERIC_ERROR_MESSAGE: &str = "Request failed. Please check your details and try again.";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull the backend's own message out of an error payload.
    ///
    /// The backend reports errors as `{ error }` or `{ message }`, where the
    /// value is either a string or a map of field errors.
    pub fn backend_message(body: &str) -> Option<String> {
        let payload: Value = serde_json::from_str(body).ok()?;
        let reported = payload
            .get("error")
            .filter(|v| !v.is_null())
            .or_else(|| payload.get("message"))?;

        match reported {
            Value::String(message) if !message.trim().is_empty() => Some(message.clone()),
            Value::Object(fields) => match fields.values().next() {
                Some(Value::String(message)) => Some(message.clone()),
                Some(_) => Some(reported.to_string()),
                None => None,
            },
            _ => None,
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = Self::backend_message(body).unwrap_or_else(|| Self::truncate_body(body));
        match status.as_u16() {
            400 | 409 | 422 => ApiError::BadRequest(detail),
            401 => ApiError::Unauthorized(detail),
            403 => ApiError::AccessDenied(detail),
            404 => ApiError::NotFound(detail),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(detail),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, detail)),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// Readable message for the person at the keyboard.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::BadRequest(detail)
            | ApiError::Unauthorized(detail)
            | ApiError::AccessDenied(detail)
            | ApiError::NotFound(detail)
                if Self::looks_like_message(detail) =>
            {
                detail.clone()
            }
            ApiError::RateLimited => "Too many attempts. Please wait and try again.".to_string(),
            ApiError::NetworkError(_) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            _ => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }

    /// Raw bodies (HTML error pages, JSON blobs) are not worth showing.
    fn looks_like_message(detail: &str) -> bool {
        let trimmed = detail.trim();
        !trimmed.is_empty() && !trimmed.starts_with('<') && !trimmed.starts_with('{')
    }
}
