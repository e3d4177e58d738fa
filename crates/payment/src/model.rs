use chrono::{DateTime, Utc};
use common::{AuditStamp, CustomerId, LoanId, PaymentId, PaymentStatus, ScheduleId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payment method recorded when the request does not carry one.
pub const DEFAULT_PAYMENT_METHOD: &str = "bank_transfer";

/// Local copy of a billing loan, built from `LoanCreated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanMirror {
    pub loan_id: LoanId,
    pub customer_id: CustomerId,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

/// Local copy of a billing schedule entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleMirror {
    pub schedule_id: ScheduleId,
    pub loan_id: LoanId,
    pub payment_no: u32,
    pub payment_due_date: DateTime<Utc>,
    pub payment_amount: Decimal,
    pub payment_status: PaymentStatus,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

/// One processed payment. At most one exists per schedule entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: PaymentId,
    pub loan_id: LoanId,
    pub schedule_id: ScheduleId,
    pub payment_date: DateTime<Utc>,
    pub amount_paid: Decimal,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

/// Request to pay one installment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub customer_id: CustomerId,
    pub loan_id: LoanId,
    pub schedule_id: ScheduleId,
    pub amount: Decimal,
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// Result of a processed payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub amount_paid: Decimal,
    pub payment_id: PaymentId,
    pub payment_status: PaymentStatus,
    pub payment_date: DateTime<Utc>,
}

impl From<&Payment> for PaymentReceipt {
    fn from(payment: &Payment) -> Self {
        Self {
            amount_paid: payment.amount_paid,
            payment_id: payment.payment_id,
            payment_status: payment.payment_status,
            payment_date: payment.payment_date,
        }
    }
}
