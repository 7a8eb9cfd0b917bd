//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::models::AddressValidationError;
use crate::services::{CheckoutError, LedgerError, ReconcileError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(RepositoryError),

    /// No signed-in user.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request contradicts current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A dependency is temporarily unavailable; retrying may succeed.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The payment processor refused a request.
    #[error("Payment processor error: {0}")]
    Upstream(String),

    /// Webhook signature could not be verified.
    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) | Self::SignatureInvalid(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    // Internal details stay in logs and Sentry
    fn public_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Upstream(_) => "Payment processor error".to_string(),
            Self::Unavailable(_) => "Service temporarily unavailable, please retry".to_string(),
            Self::SignatureInvalid(_) => "Invalid signature".to_string(),
            Self::Unauthorized(msg)
            | Self::BadRequest(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(
            self,
            Self::Database(_) | Self::Internal(_) | Self::Upstream(_)
        ) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else if matches!(self, Self::Unavailable(_)) {
            tracing::warn!(error = %self, "Dependency unavailable");
        }

        let body = json!({
            "success": false,
            "message": self.public_message(),
        });

        (self.status(), Json(body)).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            e if e.is_transient() => Self::Unavailable(e.to_string()),
            RepositoryError::NotFound => Self::NotFound("Not found".to_string()),
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            e => Self::Database(e),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<AddressValidationError> for AppError {
    fn from(err: AddressValidationError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            // Someone else's order looks the same as a missing one
            LedgerError::NotFound(id) | LedgerError::OwnerMismatch { order_id: id, .. } => {
                Self::NotFound(format!("Order {id} not found"))
            }
            LedgerError::Conflict { order_id, reason } => {
                Self::Conflict(format!("Order {order_id}: {reason}"))
            }
            LedgerError::Repository(e) => e.into(),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::EmptyCart
            | CheckoutError::InvalidQuantity { .. }
            | CheckoutError::TotalOverflow => Self::BadRequest(err.to_string()),
            CheckoutError::InvalidAddress(_) | CheckoutError::ProductNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            CheckoutError::InProgress => Self::Conflict(err.to_string()),
            CheckoutError::PaymentSessionFailed(e) if e.is_retryable() => {
                Self::Unavailable(e.to_string())
            }
            CheckoutError::PaymentSessionFailed(e) => Self::Upstream(e.to_string()),
            CheckoutError::Repository(e) => e.into(),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Signature(e) => Self::SignatureInvalid(e.to_string()),
            ReconcileError::MalformedPayload(e) => Self::BadRequest(format!("Malformed payload: {e}")),
            e @ (ReconcileError::Processor(_) | ReconcileError::Storage(_)) => {
                Self::Unavailable(e.to_string())
            }
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this once the session identifies the buyer so errors are associated
/// with them.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
