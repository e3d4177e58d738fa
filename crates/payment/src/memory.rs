use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CustomerId, LoanId, PaymentStatus, ScheduleId};
use tokio::sync::RwLock;

use crate::Result;
use crate::model::{LoanMirror, Payment, ScheduleMirror};
use crate::repository::PaymentRepository;

#[derive(Default)]
struct PaymentState {
    loans: HashMap<LoanId, LoanMirror>,
    schedules: HashMap<ScheduleId, ScheduleMirror>,
    payments: HashMap<ScheduleId, Payment>,
}

/// In-memory payment store for tests and single-process runs.
#[derive(Clone, Default)]
pub struct InMemoryPaymentRepository {
    state: Arc<RwLock<PaymentState>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of mirrored loans.
    pub async fn loan_count(&self) -> usize {
        self.state.read().await.loans.len()
    }

    /// Returns the number of mirrored schedule entries.
    pub async fn schedule_count(&self) -> usize {
        self.state.read().await.schedules.len()
    }

    /// Returns the number of payment records.
    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn create_loan_mirror(
        &self,
        loan: &LoanMirror,
        schedules: &[ScheduleMirror],
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.loans.contains_key(&loan.loan_id) {
            return Ok(false);
        }

        state.loans.insert(loan.loan_id, loan.clone());
        for schedule in schedules {
            state.schedules.insert(schedule.schedule_id, schedule.clone());
        }
        Ok(true)
    }

    async fn customer_has_loan(&self, customer_id: CustomerId, loan_id: LoanId) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state
            .loans
            .get(&loan_id)
            .is_some_and(|loan| loan.customer_id == customer_id))
    }

    async fn find_schedule(
        &self,
        loan_id: LoanId,
        schedule_id: ScheduleId,
    ) -> Result<Option<ScheduleMirror>> {
        let state = self.state.read().await;
        Ok(state
            .schedules
            .get(&schedule_id)
            .filter(|s| s.loan_id == loan_id)
            .cloned())
    }

    async fn record_payment(&self, payment: &Payment) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(schedule) = state.schedules.get_mut(&payment.schedule_id) else {
            return Ok(false);
        };
        if !schedule.payment_status.can_pay() {
            return Ok(false);
        }

        schedule.payment_status = PaymentStatus::Paid;
        schedule.audit.touch(payment.audit.updated_at);
        state.payments.insert(payment.schedule_id, payment.clone());
        Ok(true)
    }

    async fn payment_for_schedule(&self, schedule_id: ScheduleId) -> Result<Option<Payment>> {
        Ok(self.state.read().await.payments.get(&schedule_id).cloned())
    }
}
