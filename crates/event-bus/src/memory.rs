use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::log::{EventLog, LogPosition, LogRecord, partition_for};
use crate::{BusError, Result};

#[derive(Default)]
struct LogState {
    /// topic -> partitions -> records
    topics: HashMap<String, Vec<Vec<LogRecord>>>,
    /// (group, topic, partition) -> next offset
    offsets: HashMap<(String, String, u32), u64>,
}

/// In-memory event log.
///
/// Provides the same partition/offset semantics as the PostgreSQL log and is
/// shared between services running in one process (tests, local runs).
#[derive(Clone)]
pub struct InMemoryEventLog {
    state: Arc<RwLock<LogState>>,
    partitions: u32,
    fail_on_append: Arc<AtomicBool>,
}

impl InMemoryEventLog {
    /// Creates an empty log with a single partition per topic.
    pub fn new() -> Self {
        Self::with_partitions(1)
    }

    /// Creates an empty log with `partitions` partitions per topic.
    pub fn with_partitions(partitions: u32) -> Self {
        Self {
            state: Arc::new(RwLock::new(LogState::default())),
            partitions: partitions.max(1),
            fail_on_append: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every subsequent append fail until reset.
    pub fn set_fail_on_append(&self, fail: bool) {
        self.fail_on_append.store(fail, Ordering::SeqCst);
    }

    /// Returns all records of a topic, partition by partition.
    pub async fn records(&self, topic: &str) -> Vec<LogRecord> {
        self.state
            .read()
            .await
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the total number of records in a topic.
    pub async fn record_count(&self, topic: &str) -> usize {
        self.state
            .read()
            .await
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<LogPosition> {
        if self.fail_on_append.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable(format!(
                "append to {topic} rejected"
            )));
        }

        let partition = partition_for(key, self.partitions);
        let mut state = self.state.write().await;
        let partitions = state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); self.partitions as usize]);
        let records = &mut partitions[partition as usize];
        let offset = records.len() as u64;

        records.push(LogRecord {
            topic: topic.to_string(),
            partition,
            offset,
            key: key.to_string(),
            payload,
            timestamp: Utc::now(),
        });

        Ok(LogPosition { partition, offset })
    }

    async fn partitions(&self, _topic: &str) -> Result<u32> {
        Ok(self.partitions)
    }

    async fn read(
        &self,
        topic: &str,
        partition: u32,
        from_offset: u64,
        max_records: usize,
    ) -> Result<Vec<LogRecord>> {
        if partition >= self.partitions {
            return Err(BusError::InvalidPartition {
                topic: topic.to_string(),
                partition,
            });
        }

        let state = self.state.read().await;
        let records = state
            .topics
            .get(topic)
            .map(|partitions| {
                partitions[partition as usize]
                    .iter()
                    .skip(from_offset as usize)
                    .take(max_records)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(records)
    }

    async fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .offsets
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
            .unwrap_or(0))
    }

    async fn commit(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        next_offset: u64,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .offsets
            .insert((group.to_string(), topic.to_string(), partition), next_offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_assigns_sequential_offsets() {
        let log = InMemoryEventLog::new();

        let first = log.append("loans", "k", b"one".to_vec()).await.unwrap();
        let second = log.append("loans", "k", b"two".to_vec()).await.unwrap();

        assert_eq!(first, LogPosition { partition: 0, offset: 0 });
        assert_eq!(second, LogPosition { partition: 0, offset: 1 });
        assert_eq!(log.record_count("loans").await, 2);
    }

    #[tokio::test]
    async fn read_from_offset() {
        let log = InMemoryEventLog::new();
        for payload in ["a", "b", "c"] {
            log.append("t", "k", payload.as_bytes().to_vec())
                .await
                .unwrap();
        }

        let records = log.read("t", 0, 1, 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload, b"b");
        assert_eq!(records[1].offset, 2);

        let limited = log.read("t", 0, 0, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn read_unknown_topic_is_empty() {
        let log = InMemoryEventLog::new();
        assert!(log.read("missing", 0, 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_invalid_partition_fails() {
        let log = InMemoryEventLog::with_partitions(2);
        let result = log.read("t", 2, 0, 10).await;
        assert!(matches!(result, Err(BusError::InvalidPartition { .. })));
    }

    #[tokio::test]
    async fn same_key_lands_in_same_partition() {
        let log = InMemoryEventLog::with_partitions(4);
        let a = log.append("t", "loan-7", vec![1]).await.unwrap();
        let b = log.append("t", "loan-7", vec![2]).await.unwrap();
        assert_eq!(a.partition, b.partition);
        assert_eq!(b.offset, a.offset + 1);
    }

    #[tokio::test]
    async fn offsets_are_tracked_per_group() {
        let log = InMemoryEventLog::new();
        assert_eq!(log.committed_offset("billing", "t", 0).await.unwrap(), 0);

        log.commit("billing", "t", 0, 5).await.unwrap();

        assert_eq!(log.committed_offset("billing", "t", 0).await.unwrap(), 5);
        assert_eq!(log.committed_offset("audit", "t", 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn fail_on_append() {
        let log = InMemoryEventLog::new();
        log.set_fail_on_append(true);
        assert!(log.append("t", "k", vec![]).await.is_err());
        assert_eq!(log.record_count("t").await, 0);

        log.set_fail_on_append(false);
        assert!(log.append("t", "k", vec![]).await.is_ok());
    }
}
