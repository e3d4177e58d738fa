//! Wire format shared by the billing and payment services.
//!
//! Every message on the log is an [`EventEnvelope`]:
//! `{"event_id": "...", "event_name": "...", "data": {...}}`.
//! Decoding is two-phase: the envelope is parsed first, then `data` is
//! parsed into the payload type selected by `event_name`.

use chrono::{DateTime, Utc};
use common::{CustomerId, LoanId, PaymentId, PaymentStatus, ScheduleId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// Event name of [`LendingEvent::LoanCreated`].
pub const LOAN_CREATED: &str = "LoanCreated";

/// Event name of [`LendingEvent::PaymentPaid`].
pub const PAYMENT_PAID: &str = "PaymentPaid";

/// Unique identifier for an event.
///
/// Ids minted here are UUIDs, but on the wire the id is an opaque string, so
/// envelopes from producers using another id scheme still decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The envelope every event travels in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// The kind of event, used to select the payload type.
    pub event_name: String,

    /// The event payload as JSON.
    pub data: serde_json::Value,
}

impl EventEnvelope {
    /// Serializes the envelope for the log.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses an envelope without looking at the payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Events exchanged between the two services.
#[derive(Debug, Clone, PartialEq)]
pub enum LendingEvent {
    /// A loan and its full schedule were created by the billing service.
    LoanCreated(LoanCreatedData),

    /// A schedule entry was paid through the payment service.
    PaymentPaid(PaymentPaidData),
}

impl LendingEvent {
    /// Returns the event name written into the envelope.
    pub fn event_name(&self) -> &'static str {
        match self {
            LendingEvent::LoanCreated(_) => LOAN_CREATED,
            LendingEvent::PaymentPaid(_) => PAYMENT_PAID,
        }
    }

    /// Returns the loan this event belongs to.
    pub fn loan_id(&self) -> LoanId {
        match self {
            LendingEvent::LoanCreated(data) => data.loan_id,
            LendingEvent::PaymentPaid(data) => data.loan_id,
        }
    }

    /// Key used to pick a partition. Events of one loan always share a partition.
    pub fn partition_key(&self) -> String {
        self.loan_id().to_string()
    }

    /// Wraps the event in an envelope.
    pub fn to_envelope(&self, event_id: EventId) -> Result<EventEnvelope> {
        let data = match self {
            LendingEvent::LoanCreated(data) => serde_json::to_value(data)?,
            LendingEvent::PaymentPaid(data) => serde_json::to_value(data)?,
        };
        Ok(EventEnvelope {
            event_id,
            event_name: self.event_name().to_string(),
            data,
        })
    }

    /// Decodes the payload of an envelope.
    ///
    /// Returns `Ok(None)` for event names this system does not know.
    pub fn from_envelope(envelope: &EventEnvelope) -> Result<Option<Self>> {
        let event = match envelope.event_name.as_str() {
            LOAN_CREATED => {
                LendingEvent::LoanCreated(LoanCreatedData::deserialize(&envelope.data)?)
            }
            PAYMENT_PAID => {
                LendingEvent::PaymentPaid(PaymentPaidData::deserialize(&envelope.data)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Data for LoanCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanCreatedData {
    pub loan_id: LoanId,
    pub customer_id: CustomerId,
    /// The full schedule, ordered by payment number.
    pub schedules: Vec<ScheduleSnapshot>,
}

/// One schedule entry as carried by LoanCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub schedule_id: ScheduleId,
    pub payment_no: u32,
    pub payment_due_date: DateTime<Utc>,
    pub payment_amount: Decimal,
    pub payment_status: PaymentStatus,
}

/// Data for PaymentPaid event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentPaidData {
    pub loan_id: LoanId,
    pub schedule_id: ScheduleId,
    pub payment_id: PaymentId,
    pub payment_status: PaymentStatus,
    pub payment_date: DateTime<Utc>,
}
