//! API error types and responses.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use kidbank_core::{AccessDenied, CoreError};
use kidbank_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed body, query or field.
    #[error("{0}")]
    InvalidRequest(String),

    /// Unknown frequency, or a day-spec that doesn't match it.
    #[error("{0}")]
    InvalidFrequency(String),

    /// Amount outside the accepted range.
    #[error("{0}")]
    InvalidAmount(String),

    /// Note too long.
    #[error("{0}")]
    InvalidNote(String),

    /// Interest rate outside the accepted range.
    #[error("{0}")]
    InvalidRate(String),

    /// Withdrawal larger than the balance.
    #[error("insufficient funds: requested {requested} cents, available {available} cents")]
    InsufficientFunds {
        /// Requested amount in cents.
        requested: i64,
        /// Current balance in cents.
        available: i64,
    },

    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found (or in another family).
    #[error("{0}")]
    NotFound(String),

    /// Conflict - resource already exists.
    #[error("{0}")]
    Conflict(String),

    /// Pause on a paused schedule.
    #[error("schedule is already paused")]
    AlreadyPaused,

    /// Resume on an active schedule.
    #[error("schedule is already active")]
    AlreadyActive,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl ApiError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidFrequency(_) => "invalid_frequency",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidNote(_) => "invalid_note",
            Self::InvalidRate(_) => "invalid_rate",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::AlreadyPaused => "already_paused",
            Self::AlreadyActive => "already_active",
            Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_)
            | Self::InvalidFrequency(_)
            | Self::InvalidAmount(_)
            | Self::InvalidNote(_)
            | Self::InvalidRate(_)
            | Self::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::AlreadyPaused | Self::AlreadyActive => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, details) = match &self {
            Self::InsufficientFunds {
                requested,
                available,
            } => (
                self.to_string(),
                Some(serde_json::json!({
                    "requested": requested,
                    "available": available
                })),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                ("An internal error occurred".to_string(), None)
            }
            _ => (self.to_string(), None),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, .. } => Self::NotFound(format!("{entity} not found")),
            StoreError::InsufficientFunds { balance, required } => Self::InsufficientFunds {
                requested: required,
                available: balance,
            },
            StoreError::ScheduleConflict { .. } | StoreError::DuplicateName(_) => {
                Self::Conflict(err.to_string())
            }
            StoreError::AlreadyPaused => Self::AlreadyPaused,
            StoreError::AlreadyActive => Self::AlreadyActive,
            StoreError::Database(msg) | StoreError::Decode(msg) | StoreError::Precondition(msg) => {
                Self::Internal(msg)
            }
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let msg = err.to_string();
        match err {
            CoreError::InvalidAmount { .. } => Self::InvalidAmount(msg),
            CoreError::UnknownFrequency(_) | CoreError::InvalidFrequencyDayCombination(_) => {
                Self::InvalidFrequency(msg)
            }
            CoreError::InvalidNote { .. } => Self::InvalidNote(msg),
            CoreError::InvalidRate { .. } => Self::InvalidRate(msg),
            CoreError::InvalidName(_) | CoreError::InvalidId(_) => Self::InvalidRequest(msg),
        }
    }
}

impl From<AccessDenied> for ApiError {
    fn from(err: AccessDenied) -> Self {
        match err {
            AccessDenied::NotFound => Self::NotFound("child not found".into()),
            AccessDenied::Forbidden => Self::Forbidden,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    // Ids that don't parse can't name anything.
    fn from(_: PathRejection) -> Self {
        Self::NotFound("resource not found".into())
    }
}

/// `Json` extractor whose rejection renders as an [`ApiError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Query` extractor whose rejection renders as an [`ApiError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// `Path` extractor whose rejection renders as an [`ApiError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);
