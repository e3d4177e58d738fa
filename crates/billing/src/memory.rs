use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, LoanId, ScheduleId};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::customer::Customer;
use crate::loan::{Loan, Schedule};
use crate::repository::BillingRepository;
use crate::{BillingError, Result};

#[derive(Default)]
struct BillingState {
    customers: Vec<Customer>,
    loans: HashMap<LoanId, Loan>,
    schedule_index: HashMap<ScheduleId, LoanId>,
}

impl BillingState {
    fn schedule(&self, schedule_id: ScheduleId) -> Option<&Schedule> {
        let loan_id = *self.schedule_index.get(&schedule_id)?;
        self.loans
            .get(&loan_id)?
            .schedules
            .iter()
            .find(|s| s.schedule_id == schedule_id)
    }

    fn schedule_mut(&mut self, schedule_id: ScheduleId) -> Option<&mut Schedule> {
        let loan_id = *self.schedule_index.get(&schedule_id)?;
        self.loans
            .get_mut(&loan_id)?
            .schedules
            .iter_mut()
            .find(|s| s.schedule_id == schedule_id)
    }
}

/// In-memory billing store for tests and single-process runs.
#[derive(Clone, Default)]
pub struct InMemoryBillingRepository {
    state: Arc<RwLock<BillingState>>,
    fail_on_finish: Arc<AtomicBool>,
}

impl InMemoryBillingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `mark_loan_finished` fail until reset.
    pub fn set_fail_on_finish(&self, fail: bool) {
        self.fail_on_finish.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored loans.
    pub async fn loan_count(&self) -> usize {
        self.state.read().await.loans.len()
    }
}

#[async_trait]
impl BillingRepository for InMemoryBillingRepository {
    async fn create_customer(&self, customer: &Customer) -> Result<()> {
        let mut state = self.state.write().await;
        if state.customers.iter().any(|c| c.email == customer.email) {
            return Err(BillingError::CustomerAlreadyExists(customer.email.clone()));
        }
        state.customers.push(customer.clone());
        Ok(())
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        Ok(self.state.read().await.customers.clone())
    }

    async fn get_customer(&self, customer_id: CustomerId) -> Result<Option<Customer>> {
        let state = self.state.read().await;
        Ok(state
            .customers
            .iter()
            .find(|c| c.customer_id == customer_id)
            .cloned())
    }

    async fn create_loan(&self, loan: &Loan) -> Result<()> {
        let mut state = self.state.write().await;
        for schedule in &loan.schedules {
            state.schedule_index.insert(schedule.schedule_id, loan.loan_id);
        }
        state.loans.insert(loan.loan_id, loan.clone());
        Ok(())
    }

    async fn get_loan(&self, loan_id: LoanId, customer_id: CustomerId) -> Result<Option<Loan>> {
        let state = self.state.read().await;
        Ok(state
            .loans
            .get(&loan_id)
            .filter(|loan| loan.customer_id == customer_id)
            .cloned())
    }

    async fn find_loan(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        Ok(self.state.read().await.loans.get(&loan_id).cloned())
    }

    async fn active_loan(&self, customer_id: CustomerId) -> Result<Option<Loan>> {
        let state = self.state.read().await;
        Ok(state
            .loans
            .values()
            .filter(|loan| loan.customer_id == customer_id && !loan.is_finished)
            .max_by_key(|loan| (loan.start_date, loan.audit.created_at))
            .cloned())
    }

    async fn overdue_schedules(
        &self,
        loan_id: LoanId,
        until: DateTime<Utc>,
    ) -> Result<Vec<Schedule>> {
        let state = self.state.read().await;
        let mut overdue: Vec<Schedule> = state
            .loans
            .get(&loan_id)
            .map(|loan| {
                loan.schedules
                    .iter()
                    .filter(|s| {
                        (s.payment_status.can_pay() || s.is_missed_payment)
                            && s.payment_due_date < until
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        overdue.sort_by_key(|s| s.payment_no);
        Ok(overdue)
    }

    async fn outstanding_amount(&self, loan_id: LoanId) -> Result<Decimal> {
        let state = self.state.read().await;
        Ok(state
            .loans
            .get(&loan_id)
            .map(Loan::outstanding)
            .unwrap_or_default())
    }

    async fn has_unpaid_schedules(&self, loan_id: LoanId) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.loans.get(&loan_id).is_some_and(Loan::has_unpaid))
    }

    async fn get_schedule(&self, schedule_id: ScheduleId) -> Result<Option<Schedule>> {
        let state = self.state.read().await;
        Ok(state.schedule(schedule_id).cloned())
    }

    async fn update_schedule(&self, schedule: &Schedule) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .schedule_mut(schedule.schedule_id)
            .ok_or(BillingError::ScheduleNotFound(schedule.schedule_id))?;
        stored.payment_status = schedule.payment_status;
        stored.is_missed_payment = schedule.is_missed_payment;
        stored.audit.updated_at = schedule.audit.updated_at;
        Ok(())
    }

    async fn mark_loan_finished(&self, loan_id: LoanId, now: DateTime<Utc>) -> Result<()> {
        if self.fail_on_finish.load(Ordering::SeqCst) {
            return Err(BillingError::Database(sqlx::Error::Protocol(
                "simulated failure finishing loan".into(),
            )));
        }
        let mut state = self.state.write().await;
        let loan = state
            .loans
            .get_mut(&loan_id)
            .ok_or(BillingError::LoanNotFound(loan_id))?;
        loan.is_finished = true;
        loan.audit.touch(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{AuditStamp, PaymentStatus};
    use rust_decimal_macros::dec;

    fn customer(email: &str) -> Customer {
        Customer {
            customer_id: CustomerId::new(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: email.into(),
            phone_number: "1".into(),
            audit: AuditStamp::default(),
        }
    }

    fn loan(customer_id: CustomerId, start: DateTime<Utc>, entries: u32) -> Loan {
        let loan_id = LoanId::new();
        let schedules = (1..=entries)
            .map(|no| Schedule {
                schedule_id: ScheduleId::new(),
                loan_id,
                payment_no: no,
                payment_due_date: start + Duration::days(30 * i64::from(no)),
                payment_amount: dec!(100),
                payment_status: PaymentStatus::Pending,
                is_missed_payment: false,
                audit: AuditStamp::at(start),
            })
            .collect();
        Loan {
            loan_id,
            customer_id,
            principal_amount: dec!(100),
            interest_rate: dec!(0.1),
            start_date: start,
            end_date: start,
            is_finished: false,
            schedules,
            audit: AuditStamp::at(start),
        }
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let repo = InMemoryBillingRepository::new();
        repo.create_customer(&customer("a@b.c")).await.unwrap();

        let err = repo.create_customer(&customer("a@b.c")).await.unwrap_err();
        assert!(matches!(err, BillingError::CustomerAlreadyExists(_)));
        assert_eq!(repo.list_customers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_loan_checks_owner() {
        let repo = InMemoryBillingRepository::new();
        let owner = CustomerId::new();
        let loan = loan(owner, Utc::now(), 3);
        repo.create_loan(&loan).await.unwrap();

        assert!(repo.get_loan(loan.loan_id, owner).await.unwrap().is_some());
        assert!(
            repo.get_loan(loan.loan_id, CustomerId::new())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn active_loan_is_latest_unfinished() {
        let repo = InMemoryBillingRepository::new();
        let owner = CustomerId::new();
        let now = Utc::now();
        let older = loan(owner, now - Duration::days(10), 1);
        let newer = loan(owner, now, 1);
        repo.create_loan(&older).await.unwrap();
        repo.create_loan(&newer).await.unwrap();

        let active = repo.active_loan(owner).await.unwrap().unwrap();
        assert_eq!(active.loan_id, newer.loan_id);

        repo.mark_loan_finished(newer.loan_id, now).await.unwrap();
        let active = repo.active_loan(owner).await.unwrap().unwrap();
        assert_eq!(active.loan_id, older.loan_id);
    }

    #[tokio::test]
    async fn overdue_excludes_paid_and_future_entries() {
        let repo = InMemoryBillingRepository::new();
        let start = Utc::now() - Duration::days(200);
        let loan = loan(CustomerId::new(), start, 6);
        repo.create_loan(&loan).await.unwrap();

        let mut paid = loan.schedules[1].clone();
        paid.mark_paid(Utc::now());
        repo.update_schedule(&paid).await.unwrap();

        // Entries 1..=6 fall due every 30 days; cut off after the 4th.
        let until = start + Duration::days(125);
        let overdue = repo.overdue_schedules(loan.loan_id, until).await.unwrap();
        let numbers: Vec<u32> = overdue.iter().map(|s| s.payment_no).collect();
        assert_eq!(numbers, vec![1, 3, 4]);

        assert_eq!(repo.outstanding_amount(loan.loan_id).await.unwrap(), dec!(500));
        assert!(repo.has_unpaid_schedules(loan.loan_id).await.unwrap());
    }
}
