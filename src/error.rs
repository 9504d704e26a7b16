//! Typed error hierarchy for the sophos-central crate.
//!
//! `SophosError` is a closed enum: one variant per failure category the
//! transport can surface. The transport core (`client::SophosClient`) is the
//! only place that turns raw HTTP responses into these variants, so every
//! resource function and the CLI see the same classification.
//!
//! Every variant renders as a single human-readable line that names the
//! category and, when the server supplied them, the correlation id and
//! request id. The CLI prints that line verbatim; support cases need nothing
//! else.

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::CredentialSource;

/// Diagnostic context parsed from a non-success Sophos API response.
///
/// Sophos error bodies look like
/// `{"error": "...", "message": "...", "correlationId": "...", "requestId": "..."}`.
/// Any of these may be missing; a non-JSON body becomes the `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiErrorDetails {
    /// HTTP status returned by the API.
    pub status: StatusCode,
    /// Machine-readable error code (the body's `error` field).
    pub code: Option<String>,
    /// Human-readable message from the body, or the raw body text.
    pub message: String,
    /// Correlation id for Sophos support escalation.
    pub correlation_id: Option<String>,
    /// Request id for Sophos support escalation.
    pub request_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    correlation_id: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
}

impl ApiErrorDetails {
    /// Builds details from a status code and the raw response body.
    pub fn from_body(status: StatusCode, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => ApiErrorDetails {
                status,
                code: parsed.error,
                message: parsed
                    .message
                    .unwrap_or_else(|| default_message(status)),
                correlation_id: parsed.correlation_id,
                request_id: parsed.request_id,
            },
            Err(_) => ApiErrorDetails {
                status,
                code: None,
                message: if body.trim().is_empty() {
                    default_message(status)
                } else {
                    body.trim().to_string()
                },
                correlation_id: None,
                request_id: None,
            },
        }
    }
}

fn default_message(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("unknown error")
        .to_string()
}

impl fmt::Display for ApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (status {}", self.message, self.status.as_u16())?;
        if let Some(code) = &self.code {
            write!(f, ", code {code}")?;
        }
        if let Some(id) = &self.correlation_id {
            write!(f, ", correlation id {id}")?;
        }
        if let Some(id) = &self.request_id {
            write!(f, ", request id {id}")?;
        }
        write!(f, ")")
    }
}

/// Unified error type for all sophos-central library operations.
#[derive(Debug, thiserror::Error)]
pub enum SophosError {
    /// DNS, connect, or timeout failure. No HTTP status is available.
    /// Retried under the transport's backoff policy before surfacing.
    #[error("connectivity error: {message}")]
    Connectivity {
        /// What the transport was trying to reach.
        message: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Credentials were rejected or token acquisition failed.
    ///
    /// `credential_source` says where the client id and secret came from
    /// (flag, environment, or config file) so the user knows what to fix.
    #[error("authentication error: {message} [credentials from {credential_source}]")]
    Authentication {
        /// Description including the HTTP status and body when available.
        message: String,
        /// Where the credentials in use were loaded from.
        credential_source: CredentialSource,
        /// The underlying transport or parse error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// HTTP 429 after the retry budget was spent (or retries were disabled).
    #[error("rate limit error: {details}{}", fmt_retry_after(.retry_after))]
    RateLimited {
        /// Parsed error body.
        details: ApiErrorDetails,
        /// Server-provided `Retry-After`, if any.
        retry_after: Option<Duration>,
    },

    /// HTTP 404. Never retried.
    #[error("resource not found: {0}")]
    NotFound(ApiErrorDetails),

    /// Client-side builder validation (no request was sent) or HTTP 400.
    #[error("validation error: {}", fmt_validation(.message, .details.as_ref()))]
    Validation {
        /// What was invalid.
        message: String,
        /// Present when the server rejected the request.
        details: Option<ApiErrorDetails>,
    },

    /// HTTP 403: the credentials are valid but lack scope for this resource.
    #[error("permission error: {0}")]
    Permission(ApiErrorDetails),

    /// HTTP 5xx that was not retried, or still failing after all retries.
    #[error("server error after {attempts} attempt(s): {details}")]
    Server {
        /// Parsed error body.
        details: ApiErrorDetails,
        /// Total attempts made, including the first.
        attempts: u32,
    },

    /// Any other non-success status (409, 422, ...).
    #[error("API error: {0}")]
    Api(ApiErrorDetails),

    /// The API returned a body that does not match the expected shape.
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// Writing an export file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn fmt_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" [retry after {}s]", d.as_secs()),
        None => String::new(),
    }
}

fn fmt_validation(message: &str, details: Option<&ApiErrorDetails>) -> String {
    match details {
        Some(d) => format!("{message}: {d}"),
        None => message.to_string(),
    }
}

impl SophosError {
    /// Shorthand for a client-side validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        SophosError::Validation {
            message: message.into(),
            details: None,
        }
    }

    /// Server-side details, if this error came from an HTTP response.
    pub fn details(&self) -> Option<&ApiErrorDetails> {
        match self {
            SophosError::RateLimited { details, .. }
            | SophosError::Server { details, .. }
            | SophosError::NotFound(details)
            | SophosError::Permission(details)
            | SophosError::Api(details) => Some(details),
            SophosError::Validation { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// HTTP status, if this error came from an HTTP response.
    pub fn status(&self) -> Option<StatusCode> {
        self.details().map(|d| d.status)
    }

    /// Sophos correlation id, if the server returned one.
    pub fn correlation_id(&self) -> Option<&str> {
        self.details().and_then(|d| d.correlation_id.as_deref())
    }

    /// Sophos request id, if the server returned one.
    pub fn request_id(&self) -> Option<&str> {
        self.details().and_then(|d| d.request_id.as_deref())
    }

    /// Server-requested wait before re-invoking, for rate-limit errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SophosError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether re-invoking the same call later might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SophosError::Connectivity { .. }
                | SophosError::RateLimited { .. }
                | SophosError::Server { .. }
        )
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, SophosError>;
