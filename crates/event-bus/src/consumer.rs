//! Consumer loop for the event log.
//!
//! Each partition of the subscribed topic is drained in offset order by its
//! own loop. After a record has been dispatched its offset is committed,
//! whatever the outcome: handler failures are logged and skipped so that a
//! single bad record cannot block the partition. Records that were delivered
//! but not yet committed when the process stopped are delivered again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::watch;

use crate::Result;
use crate::event::{EventEnvelope, LendingEvent};
use crate::log::{EventLog, LogRecord};

/// Error returned by an event handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Reacts to events delivered by an [`EventConsumer`].
///
/// Delivery is at-least-once, so `handle` must be idempotent.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Handles one decoded event.
    async fn handle(&self, event: LendingEvent) -> std::result::Result<(), HandlerError>;
}

#[async_trait]
impl<H: EventHandler + ?Sized> EventHandler for Arc<H> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn handle(&self, event: LendingEvent) -> std::result::Result<(), HandlerError> {
        (**self).handle(event).await
    }
}

/// Consumer settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Consumer group whose offsets are tracked.
    pub group: String,
    /// Topic to subscribe to.
    pub topic: String,
    /// Wait between polls of an idle partition.
    pub poll_interval: Duration,
    /// Maximum records fetched per read.
    pub batch_size: usize,
}

impl ConsumerConfig {
    pub fn new(group: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            topic: topic.into(),
            poll_interval: Duration::from_millis(250),
            batch_size: 100,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// What happened to a delivered record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler accepted the event.
    Handled,
    /// The event name is not known here; the record was dropped.
    Ignored,
    /// The record could not be decoded or the handler failed.
    Failed,
}

impl DispatchOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Handled => "handled",
            DispatchOutcome::Ignored => "ignored",
            DispatchOutcome::Failed => "failed",
        }
    }
}

/// Reads a topic as a member of a consumer group and feeds a handler.
pub struct EventConsumer<L> {
    log: L,
    config: ConsumerConfig,
}

impl<L: EventLog> EventConsumer<L> {
    pub fn new(log: L, config: ConsumerConfig) -> Self {
        Self { log, config }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Drains every partition once and returns the number of records consumed.
    ///
    /// Used by tests and tools that want to step the choreography by hand.
    #[tracing::instrument(skip(self, handler), fields(group = %self.config.group, topic = %self.config.topic))]
    pub async fn poll_once<H: EventHandler>(&self, handler: &H) -> Result<usize> {
        let partitions = self.log.partitions(&self.config.topic).await?;
        let mut consumed = 0;

        for partition in 0..partitions {
            loop {
                let count = self.poll_partition(partition, handler, None).await?;
                if count == 0 {
                    break;
                }
                consumed += count;
            }
        }

        Ok(consumed)
    }

    /// Consumes until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run<H: EventHandler>(
        &self,
        handler: &H,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let partitions = self.log.partitions(&self.config.topic).await?;

        tracing::info!(
            group = %self.config.group,
            topic = %self.config.topic,
            partitions,
            handler = handler.name(),
            "Consumer started"
        );

        join_all(
            (0..partitions).map(|partition| self.run_partition(partition, handler, shutdown.clone())),
        )
        .await;

        tracing::info!(group = %self.config.group, topic = %self.config.topic, "Consumer stopped");
        Ok(())
    }

    async fn run_partition<H: EventHandler>(
        &self,
        partition: u32,
        handler: &H,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.poll_partition(partition, handler, Some(&shutdown)).await {
                Ok(count) if count > 0 => continue,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(
                        topic = %self.config.topic,
                        partition,
                        error = %e,
                        "Failed to read from event log"
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Reads one batch from the committed offset and dispatches it.
    async fn poll_partition<H: EventHandler>(
        &self,
        partition: u32,
        handler: &H,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<usize> {
        let topic = &self.config.topic;
        let group = &self.config.group;

        let from = self.log.committed_offset(group, topic, partition).await?;
        let records = self
            .log
            .read(topic, partition, from, self.config.batch_size)
            .await?;

        let mut consumed = 0;
        for record in records {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                break;
            }

            let outcome = dispatch(&record, handler).await;
            metrics::counter!(
                "events_consumed_total",
                "topic" => topic.clone(),
                "outcome" => outcome.as_str()
            )
            .increment(1);

            self.log
                .commit(group, topic, partition, record.offset + 1)
                .await?;
            consumed += 1;
        }

        Ok(consumed)
    }
}

/// Decodes a record and hands it to the handler. Never fails.
pub async fn dispatch<H: EventHandler + ?Sized>(record: &LogRecord, handler: &H) -> DispatchOutcome {
    let envelope = match EventEnvelope::from_bytes(&record.payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "Malformed envelope"
            );
            return DispatchOutcome::Failed;
        }
    };

    let event = match LendingEvent::from_envelope(&envelope) {
        Ok(Some(event)) => event,
        Ok(None) => {
            tracing::warn!(
                event_id = %envelope.event_id,
                event_name = %envelope.event_name,
                "Unknown event, skipping"
            );
            return DispatchOutcome::Ignored;
        }
        Err(e) => {
            tracing::error!(
                event_id = %envelope.event_id,
                event_name = %envelope.event_name,
                error = %e,
                "Malformed event payload"
            );
            return DispatchOutcome::Failed;
        }
    };

    match handler.handle(event).await {
        Ok(()) => {
            tracing::debug!(
                event_id = %envelope.event_id,
                event_name = %envelope.event_name,
                handler = handler.name(),
                "Event handled"
            );
            DispatchOutcome::Handled
        }
        Err(e) => {
            tracing::error!(
                event_id = %envelope.event_id,
                event_name = %envelope.event_name,
                handler = handler.name(),
                error = %e,
                "Event handler failed"
            );
            DispatchOutcome::Failed
        }
    }
}
