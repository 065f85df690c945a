//! Garde validation helpers.

use crate::domain::DomainError;
use garde::{Report, Validate};

/// Validate a struct, turning the garde report into a [`DomainError::ValidationError`]
pub fn validate_struct<T>(value: &T) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| DomainError::ValidationError(format_report(&report)))
}

/// Render a report as `path: message` pairs separated by commas
fn format_report(report: &Report) -> String {
    report
        .iter()
        .map(|(path, error)| {
            let path = path.to_string();
            if path.is_empty() {
                error.message().to_string()
            } else {
                format!("{}: {}", path, error.message())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
