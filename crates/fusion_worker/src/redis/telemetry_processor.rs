use crate::domain::{decode_entry, IngestionOutcome, TelemetryIngestionService};
use common::domain::StreamEntry;
use common::redis::{BatchProcessor, ProcessingResult};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Create a BatchProcessor that decodes each telemetry entry and runs it through the ingestion service.
///
/// Entries are handled in read order and independently. Every entry is
/// acknowledged once handled: undecodable entries and ingestion failures are
/// logged and dropped, fused and skipped events are done.
pub fn create_telemetry_processor(
    service: Arc<TelemetryIngestionService>,
    stream: impl Into<String>,
) -> BatchProcessor {
    let stream: Arc<str> = Arc::from(stream.into());

    Box::new(move |entries: &[StreamEntry]| {
        let service = Arc::clone(&service);
        let stream = Arc::clone(&stream);

        // Decode up front so the future does not borrow the batch
        let decoded: Vec<_> = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (idx, entry.id.clone(), decode_entry(entry)))
            .collect();

        Box::pin(async move {
            let mut ack = Vec::with_capacity(decoded.len());

            for (idx, entry_id, decoded) in decoded {
                let event = match decoded {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(
                            error = %e,
                            stream = %stream,
                            entry_id = %entry_id,
                            "dropping undecodable telemetry entry"
                        );
                        ack.push(idx);
                        continue;
                    }
                };

                let device_id = event.device_id.clone();
                let tenant_id = event.tenant_id.clone();

                match service.process_event(event).await {
                    Ok(IngestionOutcome::Fused { card_id }) => {
                        debug!(entry_id = %entry_id, card_id = %card_id, "processed telemetry entry");
                        ack.push(idx);
                    }
                    Ok(IngestionOutcome::Skipped) => {
                        ack.push(idx);
                    }
                    Err(e) => {
                        error!(
                            error = %e,
                            stream = %stream,
                            entry_id = %entry_id,
                            device_id = %device_id,
                            tenant_id = %tenant_id,
                            "dropping telemetry entry after processing failure"
                        );
                        ack.push(idx);
                    }
                }
            }

            Ok(ProcessingResult::new(ack, Vec::new()))
        })
    })
}
