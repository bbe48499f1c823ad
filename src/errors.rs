//! # Error Handling
//!
//! One error type, [`ApiError`], flows through the model layer, resource
//! hooks and the dispatcher. At the dispatch boundary every variant except
//! [`ApiError::Configuration`] is folded into the response envelope with a
//! status code; configuration errors are wiring bugs and propagate.
//!
//! Internal details (database errors, configuration faults) are logged with
//! `tracing` and never sent to clients.
//!
//! ```rust,ignore
//! use modelkit::ApiError;
//!
//! async fn before_store(&self, request: &mut ResourceRequest, envelope: &mut ResponseEnvelope)
//!     -> Result<(), ApiError>
//! {
//!     if request.input.get("owner_id").is_none() {
//!         return Err(ApiError::domain("ownership", "An owner is required."));
//!     }
//!     Ok(())
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use std::fmt;

use crate::resource::ResponseEnvelope;
use crate::validation::ValidationResult;

/// Envelope key of the not-found error entry.
pub const NOT_FOUND_KEY: &str = "not_found";

/// API error type with automatic logging and sanitized responses
#[derive(Debug)]
pub enum ApiError {
    /// 404 Not Found - lookup by key yielded nothing
    NotFound {
        /// Rendered user-facing message
        message: String,
    },

    /// 400 Bad Request - the request itself could not be read
    BadRequest {
        /// User-facing error message
        message: String,
    },

    /// 422 Unprocessable Entity - field-scoped validation errors
    ValidationFailed {
        /// Messages keyed by field
        errors: ValidationResult,
    },

    /// Raised explicitly by model or resource code; the dispatcher maps the
    /// category to a status code
    Domain {
        /// Category used for the status lookup
        category: String,
        /// User-facing error message
        message: String,
        /// Validation errors of the attached entity, if any
        errors: Option<ValidationResult>,
    },

    /// Wiring bug (e.g. a relationship declared against a missing accessor)
    Configuration {
        /// Model type the fault was found on
        model: String,
        /// Internal description (logged, not sent to user)
        message: String,
    },

    /// 500 Internal Server Error - Database error (details logged, not exposed)
    Database {
        /// User-facing generic message
        message: String,
        /// Internal error (logged, not sent to user)
        internal: DbErr,
    },

    /// 500 Internal Server Error - Generic internal error
    Internal {
        /// User-facing generic message
        message: String,
        /// Internal error details (logged, not sent to user)
        internal: Option<String>,
    },

    /// Custom error with specific status code
    Custom {
        /// HTTP status code
        status: StatusCode,
        /// User-facing message
        message: String,
    },
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn validation_failed(errors: ValidationResult) -> Self {
        Self::ValidationFailed { errors }
    }

    /// Domain error without attached validation errors.
    ///
    /// ```rust,ignore
    /// return Err(ApiError::domain("quota", "Widget limit reached."));
    /// ```
    pub fn domain(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Domain {
            category: category.into(),
            message: message.into(),
            errors: None,
        }
    }

    /// Domain error carrying the validation errors of an entity.
    pub fn domain_with_errors(
        category: impl Into<String>,
        message: impl Into<String>,
        errors: ValidationResult,
    ) -> Self {
        Self::Domain {
            category: category.into(),
            message: message.into(),
            errors: Some(errors),
        }
    }

    pub fn configuration(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            model: model.into(),
            message: message.into(),
        }
    }

    /// The database error details are logged but NOT sent to the user.
    #[must_use]
    pub fn database(err: DbErr) -> Self {
        Self::Database {
            message: "A database error occurred".to_string(),
            internal: err,
        }
    }

    pub fn internal(message: impl Into<String>, internal: Option<String>) -> Self {
        Self::Internal {
            message: message.into(),
            internal,
        }
    }

    pub fn custom(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Custom {
            status,
            message: message.into(),
        }
    }

    /// Whether this error is a wiring bug rather than a request outcome.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest { .. } | Self::Domain { .. } => StatusCode::BAD_REQUEST,
            Self::ValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Configuration { .. } | Self::Database { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Custom { status, .. } => *status,
        }
    }

    /// Get the user-facing error message (sanitized)
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { message }
            | Self::BadRequest { message }
            | Self::Domain { message, .. }
            | Self::Database { message, .. }
            | Self::Internal { message, .. }
            | Self::Custom { message, .. } => message.clone(),
            Self::ValidationFailed { errors } => {
                let messages: Vec<String> =
                    errors.all().into_iter().map(|error| error.message).collect();
                if messages.len() == 1 {
                    messages[0].clone()
                } else {
                    format!("Validation failed: {}", messages.join(", "))
                }
            }
            Self::Configuration { .. } => "Internal server error".to_string(),
        }
    }

    /// Log internal error details (not sent to user)
    ///
    /// Uses the `tracing` crate - only logs if the application installed a
    /// subscriber.
    pub fn log_internal(&self) {
        match self {
            Self::Database { internal, .. } => {
                tracing::error!(error = ?internal, "Database error occurred");
            }
            Self::Configuration { model, message } => {
                tracing::error!(model = %model, details = %message, "Configuration error");
            }
            Self::Internal {
                internal: Some(details),
                ..
            } => {
                tracing::error!(details = %details, "Internal error occurred");
            }
            _ => {
                tracing::debug!(
                    error = %self.user_message(),
                    status = %self.status_code(),
                    "API error"
                );
            }
        }
    }

    /// Folds this error into `envelope`.
    ///
    /// Not-found errors are keyed `not_found`, validation errors are merged
    /// per field, everything else becomes a positional entry. The envelope
    /// status is set unless something already set one.
    pub fn record(self, envelope: &mut ResponseEnvelope) {
        self.log_internal();
        envelope.set_status_if_unset(self.status_code());

        match self {
            Self::NotFound { message } => envelope.add_error(NOT_FOUND_KEY, message),
            Self::ValidationFailed { errors } => envelope.merge_validation(&errors),
            Self::Domain {
                errors: Some(errors),
                ..
            } if errors.fails() => envelope.merge_validation(&errors),
            other => envelope.push_error(other.user_message()),
        };
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut envelope = ResponseEnvelope::new();
        self.record(&mut envelope);
        envelope.into_response()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { message, .. } => write!(f, "{message}"),
            _ => write!(f, "{}", self.user_message()),
        }
    }
}

impl std::error::Error for ApiError {}

/// Convert `SeaORM` `DbErr` to `ApiError`
///
/// - `DbErr::RecordNotFound` → 404 Not Found
/// - All other `DbErr` variants → 500 (logged internally, sanitized for users)
impl From<DbErr> for ApiError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::RecordNotFound(message) => Self::not_found(message),
            other => Self::database(other),
        }
    }
}

impl From<ValidationResult> for ApiError {
    fn from(errors: ValidationResult) -> Self {
        Self::validation_failed(errors)
    }
}
