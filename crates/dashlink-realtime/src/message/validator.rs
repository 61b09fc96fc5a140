//! Inbound frame validation rules.

use dashlink_core::error::AppError;

/// Maximum accepted inbound frame size in bytes.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Validates a raw inbound frame before parsing.
pub fn validate_inbound(raw: &str) -> Result<(), AppError> {
    if raw.len() > MAX_FRAME_SIZE {
        return Err(AppError::validation(format!(
            "Frame exceeds maximum size of {} bytes",
            MAX_FRAME_SIZE
        )));
    }

    if raw.trim().is_empty() {
        return Err(AppError::validation("Empty frame"));
    }

    Ok(())
}
