use crate::error::AppError;

/// Validate a trimmed title (1-256 Unicode characters).
pub fn validate_title(title: &str) -> Result<(), AppError> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > 256 {
        return Err(AppError::Validation(
            "Title must be 1-256 characters".into(),
        ));
    }
    Ok(())
}

/// Validate a price (finite and >= 0).
pub fn validate_price(price: f64, what: &str) -> Result<(), AppError> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::Validation(format!("{what} must be >= 0")));
    }
    Ok(())
}

/// Trim, drop empty entries and deduplicate (first occurrence wins) a list of names.
pub fn normalize_names(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim();
        if !name.is_empty() && !out.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            out.push(name.to_string());
        }
    }
    out
}
