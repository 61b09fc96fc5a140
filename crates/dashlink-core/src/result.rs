//! Convenience result type alias for dashlink.

use crate::error::AppError;

/// A specialized `Result` type for dashlink operations.
pub type AppResult<T> = Result<T, AppError>;
