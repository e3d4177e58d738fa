use chrono::{DateTime, Utc};
use common::{AuditStamp, CustomerId, LoanId, PaymentStatus, ScheduleId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A loan together with its full repayment schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub loan_id: LoanId,
    pub customer_id: CustomerId,
    pub principal_amount: Decimal,
    pub interest_rate: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_finished: bool,
    /// Ordered by `payment_no`, contiguous from 1.
    pub schedules: Vec<Schedule>,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

impl Loan {
    /// Sum of the amounts still pending.
    pub fn outstanding(&self) -> Decimal {
        self.schedules
            .iter()
            .filter(|s| !s.payment_status.is_terminal())
            .map(|s| s.payment_amount)
            .sum()
    }

    /// Whether any installment is still pending.
    pub fn has_unpaid(&self) -> bool {
        self.schedules.iter().any(|s| !s.payment_status.is_terminal())
    }
}

/// One installment of a loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub schedule_id: ScheduleId,
    pub loan_id: LoanId,
    /// 1-based period number.
    pub payment_no: u32,
    pub payment_due_date: DateTime<Utc>,
    pub payment_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub is_missed_payment: bool,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

impl Schedule {
    /// Moves the entry to Paid. Returns `false` if it was already paid.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> bool {
        if !self.payment_status.can_pay() {
            return false;
        }
        self.payment_status = PaymentStatus::Paid;
        self.audit.touch(now);
        true
    }
}
