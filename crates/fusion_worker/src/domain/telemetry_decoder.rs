use common::domain::{DomainError, DomainResult, StreamEntry, TelemetryEvent};
use common::garde::validate_struct;

/// Stream entry field carrying the JSON-encoded telemetry event
pub const DATA_FIELD: &str = "data";

/// Decode a raw stream entry into a validated telemetry event.
///
/// - `MalformedMessage` when `data` is missing or not text
/// - `InvalidPayload` when `data` is not a telemetry event, or its device or
///   tenant id is empty
pub fn decode_entry(entry: &StreamEntry) -> DomainResult<TelemetryEvent> {
    let field = entry.field(DATA_FIELD).ok_or_else(|| {
        DomainError::MalformedMessage(format!(
            "entry {} has no '{}' field",
            entry.id, DATA_FIELD
        ))
    })?;

    let data = field.as_text().ok_or_else(|| {
        DomainError::MalformedMessage(format!(
            "entry {} field '{}' holds {} instead of text",
            entry.id,
            DATA_FIELD,
            field.kind()
        ))
    })?;

    let event: TelemetryEvent = serde_json::from_str(data).map_err(|e| {
        DomainError::InvalidPayload(format!("entry {}: {}", entry.id, e))
    })?;

    validate_struct(&event).map_err(|e| match e {
        DomainError::ValidationError(report) => {
            DomainError::InvalidPayload(format!("entry {}: {}", entry.id, report))
        }
        other => other,
    })?;

    Ok(event)
}
