//! Input validation, run before any request leaves the process.

use crate::{LakebaseError, Result};
use url::Url;

/// Characters that would break out of a single URL path segment.
const PATH_BREAKING_CHARS: &str = "/?#%\\";

/// Maximum allowed length for instance and endpoint names.
const MAX_NAME_LENGTH: usize = 255;

/// Validates and normalizes a workspace base URL.
///
/// The URL must be absolute, use `http` or `https`, and carry a host.
/// Trailing slashes are removed so paths can be appended with a single `/`.
///
/// # Errors
///
/// Returns [`LakebaseError::InvalidInput`] if the URL is empty or malformed.
///
/// # Example
///
/// ```
/// use lakebase::validation::normalize_base_url;
///
/// assert_eq!(
///     normalize_base_url("https://adb-123.azuredatabricks.net/").unwrap(),
///     "https://adb-123.azuredatabricks.net"
/// );
/// assert!(normalize_base_url("adb-123.azuredatabricks.net").is_err());
/// assert!(normalize_base_url("").is_err());
/// ```
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(LakebaseError::InvalidInput(
            "workspace base URL cannot be empty".to_string(),
        ));
    }

    let parsed = Url::parse(trimmed).map_err(|e| {
        LakebaseError::InvalidInput(format!("workspace base URL is not a valid absolute URL: {}", e))
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LakebaseError::InvalidInput(format!(
            "workspace base URL must use http or https, got '{}'",
            parsed.scheme()
        )));
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(LakebaseError::InvalidInput(
            "workspace base URL has no host".to_string(),
        ));
    }

    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(LakebaseError::InvalidInput(
            "workspace base URL must not carry a query or fragment".to_string(),
        ));
    }

    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Joins a normalized base URL and an API path with exactly one `/`.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Checks that a required string argument is not empty or whitespace.
///
/// Only the field name appears in the error, never the value.
pub fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LakebaseError::InvalidInput(format!(
            "{} cannot be empty",
            field
        )));
    }
    Ok(())
}

/// Validates a database instance name before it is placed in a URL path.
///
/// Rejects:
/// - Empty names
/// - Names longer than 255 characters
/// - Control characters and whitespace
/// - Characters that would escape the path segment (`/ ? # % \`)
///
/// # Errors
///
/// Returns [`LakebaseError::InvalidInput`] if validation fails.
///
/// # Example
///
/// ```
/// use lakebase::validation::validate_instance_name;
///
/// assert!(validate_instance_name("pgh-stateful-backend").is_ok());
/// assert!(validate_instance_name("").is_err());
/// assert!(validate_instance_name("../credentials").is_err());
/// ```
pub fn validate_instance_name(name: &str) -> Result<()> {
    validate_path_segment("instance name", name)
}

/// Validates a serving endpoint name. Same rules as [`validate_instance_name`].
pub fn validate_endpoint_name(name: &str) -> Result<()> {
    validate_path_segment("serving endpoint name", name)
}

fn validate_path_segment(field: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LakebaseError::InvalidInput(format!(
            "{} cannot be empty",
            field
        )));
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(LakebaseError::InvalidInput(format!(
            "{} exceeds maximum length of {} characters",
            field, MAX_NAME_LENGTH
        )));
    }

    if name.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(LakebaseError::InvalidInput(format!(
            "{} contains whitespace or control characters",
            field
        )));
    }

    if name.chars().any(|c| PATH_BREAKING_CHARS.contains(c)) {
        return Err(LakebaseError::InvalidInput(format!(
            "{} contains characters not allowed in a URL path segment ({})",
            field, PATH_BREAKING_CHARS
        )));
    }

    Ok(())
}
