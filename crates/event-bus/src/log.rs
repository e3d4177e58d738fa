use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;

/// A record stored in one partition of a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub topic: String,
    pub partition: u32,
    /// Position inside the partition, starting at 0.
    pub offset: u64,
    pub key: String,
    pub payload: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

/// Where an appended record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPosition {
    pub partition: u32,
    pub offset: u64,
}

/// Core trait for the event channel.
///
/// A topic is split into a fixed number of partitions. Records inside a
/// partition are totally ordered by offset; nothing is ordered across
/// partitions. Consumers track their progress per consumer group with
/// committed offsets, so delivery is at-least-once: a record whose offset
/// was not committed before a restart is delivered again.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Appends a record to the partition selected by `key`.
    async fn append(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<LogPosition>;

    /// Number of partitions of a topic.
    async fn partitions(&self, topic: &str) -> Result<u32>;

    /// Reads up to `max_records` records starting at `from_offset` (inclusive).
    async fn read(
        &self,
        topic: &str,
        partition: u32,
        from_offset: u64,
        max_records: usize,
    ) -> Result<Vec<LogRecord>>;

    /// Next offset a consumer group should read. 0 when nothing was committed yet.
    async fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> Result<u64>;

    /// Stores the next offset a consumer group should read.
    async fn commit(&self, group: &str, topic: &str, partition: u32, next_offset: u64)
    -> Result<()>;
}

/// Maps a record key onto a partition.
///
/// Uses FNV-1a so every process, whatever its build, agrees on the placement.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    if partitions <= 1 {
        return 0;
    }

    let hash = key.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    });
    (hash % u64::from(partitions)) as u32
}
