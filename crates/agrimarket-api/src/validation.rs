//! Request field validation shared by the handlers

use crate::error::AppError;
use agrimarket_core::normalize_email;
use validator::ValidateEmail;

/// Fail with "Missing required fields: a, b" listing every absent or blank field
pub fn require_fields(fields: &[(&str, Option<&str>)]) -> Result<(), AppError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| *name)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

/// Normalise and check an email address
pub fn validate_email(email: &str) -> Result<String, AppError> {
    let email = normalize_email(email);
    if email.validate_email() {
        Ok(email)
    } else {
        Err(AppError::BadRequest("Invalid email format".to_string()))
    }
}

/// Trim an optional text field; present-but-blank is rejected
pub fn optional_text(field: &str, value: Option<String>) -> Result<Option<String>, AppError> {
    match value {
        None => Ok(None),
        Some(v) if v.trim().is_empty() => {
            Err(AppError::BadRequest(format!("Field {field} cannot be empty")))
        }
        Some(v) => Ok(Some(v.trim().to_string())),
    }
}

/// Query flag semantics: `1`, `true`, `yes` and `on` are set
pub fn is_truthy(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

/// Default 20, clamped to 1..=100
pub fn page_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(20).clamp(1, 100)
}

pub fn page_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}
