//! Error taxonomy for the RUGGUARD engine
//!
//! Only `RateLimited` and `BudgetExhausted` are meant to leave an analysis as
//! errors. Every other variant is handled where it occurs: a missing profile
//! becomes an error report, a failed trust-list fetch keeps the previous set,
//! a failed edge lookup counts as "not following".

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Main error type for the engine and its adapters
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Account data unavailable: @{handle} - {reason}")]
    DataUnavailable { handle: String, reason: Unavailability },

    #[error("Trusted list unavailable: {message}")]
    TrustListUnavailable { message: String },

    #[error("Edge lookup failed: @{follower} -> @{target} - {message}")]
    EdgeLookupFailed {
        follower: String,
        target: String,
        message: String,
    },

    #[error("Rate limited by upstream API{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Upstream API budget exhausted: {message}")]
    BudgetExhausted { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Network operation failed: {operation}")]
    Network {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Why a profile could not be analysed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailability {
    NotFound,
    Private,
    Suspended,
}

impl std::fmt::Display for Unavailability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Unavailability::NotFound => "not found",
            Unavailability::Private => "private",
            Unavailability::Suspended => "suspended",
        };
        f.write_str(text)
    }
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(" (retry after {secs}s)"),
        None => String::new(),
    }
}

pub type GuardResult<T> = Result<T, GuardError>;

impl GuardError {
    pub fn data_unavailable(handle: impl Into<String>, reason: Unavailability) -> Self {
        Self::DataUnavailable {
            handle: handle.into(),
            reason,
        }
    }

    pub fn trust_list(message: impl Into<String>) -> Self {
        Self::TrustListUnavailable {
            message: message.into(),
        }
    }

    pub fn edge_lookup(
        follower: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::EdgeLookupFailed {
            follower: follower.into(),
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    pub fn budget_exhausted(message: impl Into<String>) -> Self {
        Self::BudgetExhausted {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn network(operation: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            operation: operation.into(),
            source,
        }
    }

    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Conditions the caller may retry later; the engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GuardError::RateLimited { .. })
    }

    /// Conditions that should reach an operator rather than a user.
    pub fn needs_operator(&self) -> bool {
        matches!(self, GuardError::BudgetExhausted { .. })
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let status = match self {
            GuardError::DataUnavailable { .. } => StatusCode::NOT_FOUND,
            GuardError::Validation { .. } => StatusCode::BAD_REQUEST,
            GuardError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GuardError::Network { .. }
            | GuardError::EdgeLookupFailed { .. }
            | GuardError::TrustListUnavailable { .. } => StatusCode::BAD_GATEWAY,
            GuardError::BudgetExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GuardError::Config { .. }
            | GuardError::Serialization { .. }
            | GuardError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(err: serde_json::Error) -> Self {
        GuardError::serialization("json_operation", err)
    }
}

impl From<reqwest::Error> for GuardError {
    fn from(err: reqwest::Error) -> Self {
        GuardError::network("http_request", err)
    }
}

impl From<figment::Error> for GuardError {
    fn from(err: figment::Error) -> Self {
        GuardError::config(err.to_string())
    }
}
