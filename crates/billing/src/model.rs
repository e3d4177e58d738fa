//! Response shapes returned by the billing service.

use chrono::{DateTime, Utc};
use common::{CustomerId, LoanId, PaymentStatus, ScheduleId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::loan::{Loan, Schedule};

/// A created loan with its repayable total and schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanView {
    pub loan_id: LoanId,
    pub customer_id: CustomerId,
    pub principal_amount: Decimal,
    pub interest_rate: Decimal,
    /// Principal plus interest, rounded to whole currency units.
    pub loan_amount: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub schedules: Vec<ScheduleView>,
}

impl LoanView {
    pub fn new(loan: &Loan, loan_amount: Decimal) -> Self {
        Self {
            loan_id: loan.loan_id,
            customer_id: loan.customer_id,
            principal_amount: loan.principal_amount,
            interest_rate: loan.interest_rate,
            loan_amount,
            start_date: loan.start_date,
            end_date: loan.end_date,
            schedules: loan.schedules.iter().map(ScheduleView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleView {
    pub schedule_id: ScheduleId,
    pub loan_id: LoanId,
    pub payment_no: u32,
    pub payment_due_date: DateTime<Utc>,
    pub payment_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub is_missed_payment: bool,
}

impl From<&Schedule> for ScheduleView {
    fn from(schedule: &Schedule) -> Self {
        Self {
            schedule_id: schedule.schedule_id,
            loan_id: schedule.loan_id,
            payment_no: schedule.payment_no,
            payment_due_date: schedule.payment_due_date,
            payment_amount: schedule.payment_amount,
            payment_status: schedule.payment_status,
            is_missed_payment: schedule.is_missed_payment,
        }
    }
}

/// Cached under `delinquency:{customer_id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelinquencyStatus {
    pub is_delinquent: bool,
}

/// Cached under `outstanding:{customer_id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingBalance {
    pub outstanding_balance: Decimal,
}
