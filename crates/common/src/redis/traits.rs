use crate::domain::StreamEntry;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Cursor value that asks the broker for entries never delivered to any consumer of the group
pub const NEW_ENTRIES_CURSOR: &str = ">";

/// Cursor value that asks the broker for this consumer's pending entries from the start
pub const PENDING_ENTRIES_CURSOR: &str = "0";

/// Parameters of a consumer-group read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadGroupRequest {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    /// `>` for new entries, or an entry id to read this consumer's pending entries after it
    pub cursor: String,
    pub count: usize,
    /// How long the read may block waiting for entries
    pub block: Duration,
}

/// Trait for consumer-group operations on a stream broker
/// Abstracts the Redis Streams commands used by the stream consumer
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait StreamGroupClient: Send + Sync {
    /// Create the consumer group (and the stream) if it does not exist yet
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<()>;

    /// Read a batch of entries for one consumer of a group
    async fn read_group(&self, request: ReadGroupRequest) -> Result<Vec<StreamEntry>>;

    /// Acknowledge processed entries, returning how many were acknowledged
    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<usize>;
}
