use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Longest non-JSON body we are willing to show to a user verbatim.
const MAX_PLAIN_MESSAGE_LEN: usize = 200;

// ============================================================================
// Decode failures
// ============================================================================

/// Failure produced by the response decoder.
///
/// `ItemSkipped` is recovered inside batch decoding and never reaches the UI.
/// `MalformedPayload` fails the whole page or request.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecodeFailure {
    #[error("malformed payload: {reason}")]
    MalformedPayload { reason: String },

    #[error("item skipped ({shape}): {reason}")]
    ItemSkipped { shape: String, reason: String },
}

impl DecodeFailure {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            reason: reason.into(),
        }
    }

    pub fn skipped(shape: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ItemSkipped {
            shape: shape.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_item_level(&self) -> bool {
        matches!(self, Self::ItemSkipped { .. })
    }
}

// ============================================================================
// Transport failures
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkFailure {
    NoConnection,
    Timeout,
    Cancelled,
    Other,
}

// ============================================================================
// ApiError
// ============================================================================

/// Classified failure of a backend call.
///
/// `HttpClient` implementations map transport and status failures into this
/// type, usually through [`ApiError::from_status`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u32> },

    #[error("service unavailable")]
    ServiceUnavailable,

    #[error("server error {code}: {message}")]
    ServerError { code: u16, message: String },

    #[error("network error: {0:?}")]
    Network(NetworkFailure),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeFailure),
}

impl ApiError {
    /// Maps a non-2xx status plus its body to an error kind.
    #[must_use]
    pub fn from_status(code: u16, body: Option<&str>) -> Self {
        let server_message = body.and_then(extract_server_message);
        match code {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::RateLimited {
                retry_after_secs: None,
            },
            502..=504 => Self::ServiceUnavailable,
            500..=599 => Self::ServerError {
                code,
                message: server_message.unwrap_or_else(|| "Server error. Please try again.".into()),
            },
            _ => Self::ServerError {
                code,
                message: server_message.unwrap_or_else(|| format!("Request failed ({code})")),
            },
        }
    }

    #[must_use]
    pub fn requires_auth(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::ServiceUnavailable | Self::RateLimited { .. }
        ) || matches!(self, Self::ServerError { code, .. } if *code >= 500)
    }

    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Forbidden => Some(403),
            Self::NotFound => Some(404),
            Self::RateLimited { .. } => Some(429),
            Self::ServiceUnavailable => Some(503),
            Self::ServerError { code, .. } => Some(*code),
            Self::Network(_) | Self::Decode(_) => None,
        }
    }

    /// Text shown in `Error` states and toasts. Server messages pass through verbatim.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized => "Please sign in to continue.".into(),
            Self::Forbidden => "Access denied.".into(),
            Self::NotFound => "Not found.".into(),
            Self::RateLimited {
                retry_after_secs: Some(secs),
            } => format!("Too many requests. Please try again in {secs} seconds."),
            Self::RateLimited {
                retry_after_secs: None,
            } => "Too many requests. Please try again later.".into(),
            Self::ServiceUnavailable => {
                "Service is temporarily unavailable. Please try again in a minute.".into()
            }
            Self::ServerError { message, .. } => message.clone(),
            Self::Network(NetworkFailure::Timeout) => "Network timeout. Please try again.".into(),
            Self::Network(NetworkFailure::Cancelled) => "Request was cancelled.".into(),
            Self::Network(_) => "Network error. Check your connection and try again.".into(),
            Self::Decode(_) => "Failed to read the server response.".into(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Mutations
// ============================================================================

/// Failure of a user-initiated write. Input problems are caught before any
/// request is made.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MutationError {
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("a change to {0} is already in progress")]
    AlreadyPending(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl MutationError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput { reason, .. } => reason.clone(),
            Self::AlreadyPending(_) => "Please wait for the previous change to finish.".into(),
            Self::Api(e) => e.user_message(),
        }
    }
}

/// Pulls a human-readable message out of an error body.
///
/// Key priority: `message`, `error`, `data.message`, `data.error`, `errors[0]`.
/// A short non-JSON body is used as-is.
#[must_use]
pub fn extract_server_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        if trimmed.starts_with('<') || trimmed.len() > MAX_PLAIN_MESSAGE_LEN {
            return None;
        }
        return Some(trimmed.to_string());
    };

    let data = value.get("data");
    let first_error = value.get("errors").and_then(|errors| match errors {
        Value::Array(items) => items.first(),
        other => Some(other),
    });

    let found = [
        value.get("message"),
        value.get("error"),
        data.and_then(|d| d.get("message")),
        data.and_then(|d| d.get("error")),
        first_error,
        first_error.and_then(|e| e.get("message")),
    ]
    .into_iter()
    .flatten()
    .find_map(|candidate| match candidate {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    });
    found
}
