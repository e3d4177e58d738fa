use async_trait::async_trait;
use common::{CustomerId, LoanId, ScheduleId};

use crate::Result;
use crate::model::{LoanMirror, Payment, ScheduleMirror};

/// Storage port of the payment aggregate.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Stores a loan mirror and its schedule atomically.
    ///
    /// Returns `false` without touching anything if the loan is already mirrored.
    async fn create_loan_mirror(&self, loan: &LoanMirror, schedules: &[ScheduleMirror])
    -> Result<bool>;

    async fn customer_has_loan(&self, customer_id: CustomerId, loan_id: LoanId) -> Result<bool>;

    async fn find_schedule(
        &self,
        loan_id: LoanId,
        schedule_id: ScheduleId,
    ) -> Result<Option<ScheduleMirror>>;

    /// Marks the schedule paid and inserts the payment in one step.
    ///
    /// Returns `false` if the schedule was no longer pending; nothing is written then.
    async fn record_payment(&self, payment: &Payment) -> Result<bool>;

    async fn payment_for_schedule(&self, schedule_id: ScheduleId) -> Result<Option<Payment>>;
}
