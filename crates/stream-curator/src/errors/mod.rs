//! Centralized error handling for the stream curator
//!
//! # Error Categories
//!
//! - **Automation Errors**: queue capacity, probe failures, unreachable
//!   collaborators, malformed rules, conflicting pipeline configuration
//! - **Database Errors**: SQLite operations and migrations
//! - **Validation Errors**: input validation and business rule violations
//!
//! # Usage
//!
//! ```rust
//! use stream_curator::errors::{AppError, AppResult};
//!
//! async fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;
