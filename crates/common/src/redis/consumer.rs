use crate::domain::StreamEntry;
use crate::redis::backoff::Backoff;
use crate::redis::traits::{
    ReadGroupRequest, StreamGroupClient, NEW_ENTRIES_CURSOR, PENDING_ENTRIES_CURSOR,
};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of processing a batch of entries
/// Entries listed in `ack` are acknowledged; entries in `nak` stay pending for redelivery
#[derive(Debug, Default, PartialEq)]
pub struct ProcessingResult {
    pub ack: Vec<usize>,
    pub nak: Vec<(usize, Option<String>)>,
}

impl ProcessingResult {
    /// Create a result where all entries should be acknowledged
    pub fn ack_all(count: usize) -> Self {
        Self {
            ack: (0..count).collect(),
            nak: Vec::new(),
        }
    }

    /// Create a result where all entries should stay pending
    pub fn nak_all(count: usize, error: Option<String>) -> Self {
        Self {
            ack: Vec::new(),
            nak: (0..count).map(|i| (i, error.clone())).collect(),
        }
    }

    pub fn new(ack: Vec<usize>, nak: Vec<(usize, Option<String>)>) -> Self {
        Self { ack, nak }
    }
}

/// Type alias for the batch processor function
/// Takes the entries of one read and returns which of them to acknowledge.
/// The processor owns decoding and business logic and must handle entries in order.
pub type BatchProcessor =
    Box<dyn Fn(&[StreamEntry]) -> BoxFuture<'static, Result<ProcessingResult>> + Send + Sync>;

/// Settings of one consumer instance
#[derive(Debug, Clone)]
pub struct StreamConsumerConfig {
    pub stream: String,
    pub group: String,
    /// Must be unique per running instance within the group
    pub consumer_name: String,
    pub batch_size: usize,
    pub block: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

/// Where the next read starts
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReadCursor {
    /// Re-reading this consumer's pending entries after the given id
    Pending(String),
    New,
}

impl ReadCursor {
    fn as_str(&self) -> &str {
        match self {
            ReadCursor::Pending(id) => id,
            ReadCursor::New => NEW_ENTRIES_CURSOR,
        }
    }

    /// Move past a batch: pending reads advance to the last id, an empty
    /// pending read means the backlog is drained
    fn advance(&mut self, entries: &[StreamEntry]) {
        if let ReadCursor::Pending(_) = self {
            *self = match entries.last() {
                Some(last) => ReadCursor::Pending(last.id.clone()),
                None => ReadCursor::New,
            };
        }
    }
}

/// Consumer-group reader for one stream.
/// Fetching, acknowledgment and backoff live here; decoding and business logic
/// are delegated to the processor function.
pub struct StreamConsumer {
    client: Arc<dyn StreamGroupClient>,
    config: StreamConsumerConfig,
    processor: BatchProcessor,
}

impl StreamConsumer {
    /// Ensures the consumer group exists. Failing to create it is fatal.
    pub async fn new(
        client: Arc<dyn StreamGroupClient>,
        config: StreamConsumerConfig,
        processor: BatchProcessor,
    ) -> Result<Self> {
        debug!(
            stream = %config.stream,
            group = %config.group,
            consumer = %config.consumer_name,
            "Creating stream consumer"
        );

        client
            .ensure_group(&config.stream, &config.group)
            .await
            .with_context(|| {
                format!(
                    "Failed to create consumer group {} for {}",
                    config.group, config.stream
                )
            })?;

        info!(
            stream = %config.stream,
            group = %config.group,
            consumer = %config.consumer_name,
            "Stream consumer created"
        );

        Ok(Self {
            client,
            config,
            processor,
        })
    }

    /// Consume until `ctx` is cancelled. Read failures back off and retry;
    /// processing failures never stop the loop.
    pub async fn run(&self, ctx: CancellationToken) -> Result<()> {
        info!(stream = %self.config.stream, "Starting consumer loop");

        let mut backoff = Backoff::new(self.config.initial_backoff, self.config.max_backoff);
        let mut cursor = ReadCursor::Pending(PENDING_ENTRIES_CURSOR.to_string());

        loop {
            if ctx.is_cancelled() {
                break;
            }

            let read = tokio::select! {
                _ = ctx.cancelled() => break,
                result = self.read_batch(&cursor) => result,
            };

            match read {
                Ok(entries) => {
                    backoff.reset();
                    cursor.advance(&entries);
                    if !entries.is_empty() {
                        self.process_batch(&entries).await;
                    }
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    error!(
                        error = %e,
                        stream = %self.config.stream,
                        backoff_ms = delay.as_millis() as u64,
                        "Failed to consume stream"
                    );

                    tokio::select! {
                        _ = ctx.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!(stream = %self.config.stream, "Consumer stopped gracefully");
        Ok(())
    }

    async fn read_batch(&self, cursor: &ReadCursor) -> Result<Vec<StreamEntry>> {
        let entries = self
            .client
            .read_group(ReadGroupRequest {
                stream: self.config.stream.clone(),
                group: self.config.group.clone(),
                consumer: self.config.consumer_name.clone(),
                cursor: cursor.as_str().to_string(),
                count: self.config.batch_size,
                block: self.config.block,
            })
            .await?;

        if !entries.is_empty() {
            debug!(
                entry_count = entries.len(),
                cursor = cursor.as_str(),
                "Received stream batch"
            );
        }
        Ok(entries)
    }

    async fn process_batch(&self, entries: &[StreamEntry]) {
        let result = match (self.processor)(entries).await {
            Ok(result) => result,
            Err(e) => {
                // Keep everything pending so the batch is redelivered
                error!(error = %e, "Processor returned error, leaving batch pending");
                ProcessingResult::nak_all(entries.len(), Some(e.to_string()))
            }
        };

        let mut ack_ids = Vec::with_capacity(result.ack.len());
        for idx in result.ack {
            match entries.get(idx) {
                Some(entry) => ack_ids.push(entry.id.clone()),
                None => warn!(
                    entry_index = idx,
                    batch_size = entries.len(),
                    "Invalid ack index in ProcessingResult"
                ),
            }
        }

        for (idx, reason) in &result.nak {
            if let Some(entry) = entries.get(*idx) {
                warn!(
                    entry_id = %entry.id,
                    reason = reason.as_deref().unwrap_or("unspecified"),
                    "Leaving entry pending"
                );
            }
        }

        if ack_ids.is_empty() {
            return;
        }

        match self
            .client
            .ack(&self.config.stream, &self.config.group, &ack_ids)
            .await
        {
            Ok(acked) => debug!(ack_count = acked, "Acknowledged entries"),
            Err(e) => error!(
                error = %e,
                entry_count = ack_ids.len(),
                "Failed to acknowledge entries"
            ),
        }
    }
}
