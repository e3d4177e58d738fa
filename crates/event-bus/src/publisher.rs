use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::event::{EventId, LendingEvent};
use crate::log::EventLog;
use crate::{BusError, Result};

/// Default write timeout for a single publish.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Port used by the services to emit events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes an event. Returns once the log acknowledged the write.
    async fn publish(&self, event: &LendingEvent) -> Result<EventId>;
}

#[async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    async fn publish(&self, event: &LendingEvent) -> Result<EventId> {
        (**self).publish(event).await
    }
}

/// Publishes events to one topic of an [`EventLog`], keyed by loan.
#[derive(Clone)]
pub struct LogPublisher<L> {
    log: L,
    topic: String,
    write_timeout: Duration,
}

impl<L: EventLog> LogPublisher<L> {
    /// Creates a publisher for `topic` with the default write timeout.
    pub fn new(log: L, topic: impl Into<String>) -> Self {
        Self {
            log,
            topic: topic.into(),
            write_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    /// Overrides the write timeout.
    pub fn with_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Topic this publisher writes to.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl<L: EventLog> EventPublisher for LogPublisher<L> {
    #[tracing::instrument(skip(self, event), fields(topic = %self.topic, event_name = event.event_name()))]
    async fn publish(&self, event: &LendingEvent) -> Result<EventId> {
        let event_id = EventId::new();
        let payload = event.to_envelope(event_id.clone())?.to_bytes()?;
        let key = event.partition_key();

        let start = Instant::now();
        let position = tokio::time::timeout(
            self.write_timeout,
            self.log.append(&self.topic, &key, payload),
        )
        .await
        .map_err(|_| BusError::Timeout {
            topic: self.topic.clone(),
            after: self.write_timeout,
        })??;

        metrics::histogram!("event_publish_duration_seconds").record(start.elapsed().as_secs_f64());
        metrics::counter!("events_published_total", "topic" => self.topic.clone()).increment(1);

        tracing::debug!(
            %event_id,
            partition = position.partition,
            offset = position.offset,
            "Event published"
        );

        Ok(event_id)
    }
}
