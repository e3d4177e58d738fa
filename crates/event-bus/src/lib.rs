//! Event channel between the billing and payment services.
//!
//! Events travel as JSON envelopes over a partitioned, append-only log with
//! at-least-once delivery. Records are keyed by loan id, so all events of one
//! loan are consumed in publish order.

pub mod consumer;
pub mod error;
pub mod event;
pub mod log;
pub mod memory;
pub mod postgres;
pub mod publisher;

pub use consumer::{
    ConsumerConfig, DispatchOutcome, EventConsumer, EventHandler, HandlerError, dispatch,
};
pub use error::{BusError, Result};
pub use event::{
    EventEnvelope, EventId, LOAN_CREATED, LendingEvent, LoanCreatedData, PAYMENT_PAID,
    PaymentPaidData, ScheduleSnapshot,
};
pub use log::{EventLog, LogPosition, LogRecord, partition_for};
pub use memory::InMemoryEventLog;
pub use postgres::PostgresEventLog;
pub use publisher::{DEFAULT_PUBLISH_TIMEOUT, EventPublisher, LogPublisher};
