pub mod health_handlers;
pub mod image_handlers;
pub mod user_handlers;

use crate::errors::AppError;

/// Minimum length for user-supplied text fields (titles, descriptions,
/// display names).
pub(crate) const MIN_TEXT_LEN: usize = 3;

/// Boundary validation for mutable text fields. The services themselves
/// never see a value that fails this check.
pub(crate) fn validate_min_length(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().chars().count() < MIN_TEXT_LEN {
        Err(AppError::bad_request(format!(
            "{} must be at least {} characters",
            field, MIN_TEXT_LEN
        )))
    } else {
        Ok(())
    }
}
