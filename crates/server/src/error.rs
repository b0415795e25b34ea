//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::services::WorkflowError;

/// Application-level error type for the order backend.
#[derive(Debug, Error)]
pub enum AppError {
    /// A workflow operation was rejected or failed.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Missing or invalid bearer token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Workflow(err) => match err {
                WorkflowError::Validation(_) | WorkflowError::SignatureInvalid => {
                    StatusCode::BAD_REQUEST
                }
                WorkflowError::PermissionDenied => StatusCode::FORBIDDEN,
                WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
                WorkflowError::InvalidOrderState { .. }
                | WorkflowError::OrderLocked { .. }
                | WorkflowError::InvalidTransition { .. }
                | WorkflowError::InsufficientStock { .. } => StatusCode::CONFLICT,
                WorkflowError::SerialGenerationExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
                WorkflowError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Workflow(WorkflowError::Repository(_)) => "Internal server error".to_string(),
            Self::Workflow(WorkflowError::SerialGenerationExhausted(_)) => {
                "Service temporarily unavailable, please retry".to_string()
            }
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Called by the bearer token extractor so errors are associated with users.
pub fn set_sentry_user(user_id: &impl ToString, role: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
        scope.set_tag("user.role", role);
    });
}

/// Add a breadcrumb for a payment or order event.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of events
/// leading up to an error.
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
