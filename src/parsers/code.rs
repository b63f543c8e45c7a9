use crate::error::NormalizeError;

/// Undoes spreadsheet float rendering of numeric codes (`"7891234.0"` → `"7891234"`).
///
/// Tokens without a decimal point come back trimmed and otherwise untouched, so
/// the function is idempotent. Dotted tokens that are not numbers are an error
/// the caller is expected to handle.
pub fn normalize_code(raw: &str) -> Result<String, NormalizeError> {
    let token = raw.trim();
    if !token.contains('.') {
        return Ok(token.to_string());
    }

    let value: f64 = token
        .parse()
        .map_err(|_| NormalizeError::NotNumeric(token.to_string()))?;
    if !value.is_finite() {
        return Err(NormalizeError::NotNumeric(token.to_string()));
    }

    let truncated = value.trunc();
    if truncated.abs() >= 1e19 {
        return Err(NormalizeError::OutOfRange(token.to_string()));
    }
    Ok(format!("{}", truncated as i128))
}
