//! Error type definitions for the stream curator
//!
//! `AppError` is the single error type returned across the crate. Automation
//! specific failures live in [`AutomationError`] and are wrapped transparently
//! so callers can still match on queue-full or invalid-rule conditions.

use thiserror::Error;

pub use crate::automation::types::AutomationError;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Automation engine errors (queue capacity, probing, rules, config conflicts)
    #[error(transparent)]
    Automation(#[from] AutomationError),

    /// Database-related errors (SeaORM)
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stored or received JSON could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: ToString>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an upstream-unavailable error for an external collaborator
    pub fn upstream<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::Automation(AutomationError::UpstreamUnavailable {
            service: service.into(),
            message: message.into(),
        })
    }

    /// Whether this error is a rejected enqueue
    pub fn is_queue_full(&self) -> bool {
        matches!(self, Self::Automation(AutomationError::QueueFull { .. }))
    }

    /// Whether this error means an external collaborator could not be reached
    pub fn is_upstream_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Automation(AutomationError::UpstreamUnavailable { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_full_is_detected_through_wrapper() {
        let error: AppError = AutomationError::QueueFull { max_size: 2 }.into();
        assert!(error.is_queue_full());
        assert!(!error.is_upstream_unavailable());
        assert_eq!(error.to_string(), "Check queue is full (max size 2)");
    }

    #[test]
    fn test_upstream_helper() {
        let error = AppError::upstream("platform", "connection refused");
        assert!(error.is_upstream_unavailable());
        assert!(error.to_string().contains("platform"));
    }
}
