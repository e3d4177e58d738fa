//! Billing aggregate operations.

use std::sync::Arc;
use std::time::Duration;

use cache::{Cache, CacheNamespace};
use common::{
    AMOUNT_SCALE, AuditStamp, Clock, CustomerId, LoanId, PaymentStatus, ScheduleId, SystemClock,
    fits_amount_scale,
};
use event_bus::{EventPublisher, LendingEvent, LoanCreatedData, PaymentPaidData, ScheduleSnapshot};
use rust_decimal::Decimal;

use crate::amortization::{LoanPolicy, generate_schedule};
use crate::customer::{Customer, NewCustomer};
use crate::delinquency::is_delinquent;
use crate::loan::{Loan, Schedule};
use crate::model::{DelinquencyStatus, LoanView, OutstandingBalance, ScheduleView};
use crate::repository::BillingRepository;
use crate::{BillingError, Result};

/// Key prefix of cached delinquency flags.
pub const DELINQUENCY_PREFIX: &str = "delinquency";

/// Key prefix of cached outstanding balances.
pub const OUTSTANDING_PREFIX: &str = "outstanding";

/// Owns customers, loans and schedules.
///
/// Loan creation publishes `LoanCreated`; `PaymentPaid` events coming back
/// from the payment service are applied by [`BillingService::on_payment_paid`].
/// Derived per-customer values are served cache-aside and invalidated
/// whenever a mutation changes them.
pub struct BillingService<R, C, P> {
    repo: R,
    delinquency: CacheNamespace<C, DelinquencyStatus>,
    outstanding: CacheNamespace<C, OutstandingBalance>,
    publisher: P,
    clock: Arc<dyn Clock>,
    policy: LoanPolicy,
}

impl<R, C, P> BillingService<R, C, P>
where
    R: BillingRepository,
    C: Cache + Clone,
    P: EventPublisher,
{
    /// Creates a service with the default policy, wall-clock time and no cache expiry.
    pub fn new(repo: R, cache: C, publisher: P) -> Self {
        Self {
            repo,
            delinquency: CacheNamespace::new(cache.clone(), DELINQUENCY_PREFIX),
            outstanding: CacheNamespace::new(cache, OUTSTANDING_PREFIX),
            publisher,
            clock: Arc::new(SystemClock),
            policy: LoanPolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: LoanPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Expiry applied to cached values. `None` keeps them until invalidated.
    pub fn with_cache_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.delinquency = self.delinquency.with_ttl(ttl);
        self.outstanding = self.outstanding.with_ttl(ttl);
        self
    }

    pub fn policy(&self) -> &LoanPolicy {
        &self.policy
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    #[tracing::instrument(skip(self, request), fields(email = %request.email))]
    pub async fn create_customer(&self, request: NewCustomer) -> Result<Customer> {
        let request = request.normalized()?;
        let customer = Customer {
            customer_id: CustomerId::new(),
            first_name: request.first_name,
            last_name: request.last_name,
            email: request.email,
            phone_number: request.phone_number,
            audit: AuditStamp::at(self.clock.now()),
        };

        self.repo.create_customer(&customer).await?;

        tracing::info!(customer_id = %customer.customer_id, "Customer created");
        Ok(customer)
    }

    pub async fn list_customers(&self) -> Result<Vec<Customer>> {
        self.repo.list_customers().await
    }

    /// Creates a loan with its full schedule and announces it.
    ///
    /// If publishing fails the loan stays persisted and the publish error is
    /// returned.
    #[tracing::instrument(skip(self))]
    pub async fn create_loan(&self, customer_id: CustomerId, amount: Decimal) -> Result<LoanView> {
        if amount <= Decimal::ZERO {
            return Err(BillingError::InvalidInput(
                "loan_amount must be positive".into(),
            ));
        }
        if !fits_amount_scale(amount) {
            return Err(BillingError::InvalidInput(format!(
                "loan_amount has more than {AMOUNT_SCALE} decimal places"
            )));
        }

        self.repo
            .get_customer(customer_id)
            .await?
            .ok_or(BillingError::CustomerNotFound(customer_id))?;

        let now = self.clock.now();
        let (total, installments) = generate_schedule(amount, &self.policy, now);

        let loan_id = LoanId::new();
        let schedules: Vec<Schedule> = installments
            .iter()
            .map(|installment| Schedule {
                schedule_id: ScheduleId::new(),
                loan_id,
                payment_no: installment.payment_no,
                payment_due_date: installment.due_date,
                payment_amount: installment.amount,
                payment_status: PaymentStatus::Pending,
                is_missed_payment: false,
                audit: AuditStamp::at(now),
            })
            .collect();
        let end_date = schedules.last().map_or(now, |s| s.payment_due_date);

        let loan = Loan {
            loan_id,
            customer_id,
            principal_amount: amount,
            interest_rate: self.policy.interest_rate,
            start_date: now,
            end_date,
            is_finished: false,
            schedules,
            audit: AuditStamp::at(now),
        };

        self.repo.create_loan(&loan).await?;
        metrics::counter!("billing_loans_created_total").increment(1);

        // A new loan becomes the active one.
        self.invalidate_customer(customer_id).await?;

        let event = LendingEvent::LoanCreated(LoanCreatedData {
            loan_id,
            customer_id,
            schedules: loan
                .schedules
                .iter()
                .map(|s| ScheduleSnapshot {
                    schedule_id: s.schedule_id,
                    payment_no: s.payment_no,
                    payment_due_date: s.payment_due_date,
                    payment_amount: s.payment_amount,
                    payment_status: s.payment_status,
                })
                .collect(),
        });

        if let Err(e) = self.publisher.publish(&event).await {
            tracing::error!(%loan_id, error = %e, "Loan persisted but LoanCreated was not published");
            return Err(e.into());
        }

        tracing::info!(%loan_id, %total, installments = loan.schedules.len(), "Loan created");
        Ok(LoanView::new(&loan, total))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_schedule(
        &self,
        loan_id: LoanId,
        customer_id: CustomerId,
    ) -> Result<Vec<ScheduleView>> {
        let loan = self
            .repo
            .get_loan(loan_id, customer_id)
            .await?
            .ok_or(BillingError::LoanNotFound(loan_id))?;

        Ok(loan.schedules.iter().map(ScheduleView::from).collect())
    }

    /// Whether the customer's active loan has two consecutive overdue installments.
    #[tracing::instrument(skip(self))]
    pub async fn is_customer_delinquent(&self, customer_id: CustomerId) -> Result<DelinquencyStatus> {
        self.delinquency
            .get_or_compute(customer_id, || self.compute_delinquency(customer_id))
            .await
    }

    /// Sum of the pending installments of the customer's active loan.
    #[tracing::instrument(skip(self))]
    pub async fn get_outstanding_balance(
        &self,
        customer_id: CustomerId,
    ) -> Result<OutstandingBalance> {
        self.outstanding
            .get_or_compute(customer_id, || self.compute_outstanding(customer_id))
            .await
    }

    /// Applies a `PaymentPaid` event.
    ///
    /// A replayed event never re-applies the payment; it only finishes the
    /// loan if an earlier delivery failed before doing so.
    #[tracing::instrument(skip(self, event), fields(loan_id = %event.loan_id, schedule_id = %event.schedule_id))]
    pub async fn on_payment_paid(&self, event: &PaymentPaidData) -> Result<()> {
        let mut schedule = self
            .repo
            .get_schedule(event.schedule_id)
            .await?
            .ok_or(BillingError::ScheduleNotFound(event.schedule_id))?;

        let loan = self
            .repo
            .find_loan(schedule.loan_id)
            .await?
            .ok_or(BillingError::LoanNotFound(schedule.loan_id))?;

        let now = self.clock.now();
        let applied = schedule.mark_paid(now);
        if applied {
            self.repo.update_schedule(&schedule).await?;
            metrics::counter!("billing_payments_applied_total").increment(1);
            tracing::info!(payment_no = schedule.payment_no, "Payment applied");
        } else {
            tracing::debug!("Schedule already paid");
        }

        // Runs on redelivery too, so a completion that failed earlier is retried.
        let finished = !loan.is_finished && !self.repo.has_unpaid_schedules(loan.loan_id).await?;
        if finished {
            self.repo.mark_loan_finished(loan.loan_id, now).await?;
            tracing::info!(loan_id = %loan.loan_id, "Loan fully paid");
        }

        if applied || finished {
            self.invalidate_customer(loan.customer_id).await?;
        }
        Ok(())
    }

    async fn compute_delinquency(&self, customer_id: CustomerId) -> Result<DelinquencyStatus> {
        let Some(loan) = self.active_loan(customer_id).await? else {
            return Ok(DelinquencyStatus {
                is_delinquent: false,
            });
        };

        let overdue = self
            .repo
            .overdue_schedules(loan.loan_id, self.clock.now())
            .await?;

        Ok(DelinquencyStatus {
            is_delinquent: is_delinquent(&overdue),
        })
    }

    async fn compute_outstanding(&self, customer_id: CustomerId) -> Result<OutstandingBalance> {
        let outstanding_balance = match self.active_loan(customer_id).await? {
            Some(loan) => self.repo.outstanding_amount(loan.loan_id).await?,
            None => Decimal::ZERO,
        };
        Ok(OutstandingBalance {
            outstanding_balance,
        })
    }

    /// Active loan of an existing customer.
    async fn active_loan(&self, customer_id: CustomerId) -> Result<Option<Loan>> {
        self.repo
            .get_customer(customer_id)
            .await?
            .ok_or(BillingError::CustomerNotFound(customer_id))?;
        self.repo.active_loan(customer_id).await
    }

    /// Drops every cached value derived from the customer's loans.
    async fn invalidate_customer(&self, customer_id: CustomerId) -> Result<()> {
        self.outstanding.invalidate(customer_id).await?;
        self.delinquency.invalidate(customer_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBillingRepository;
    use cache::InMemoryCache;
    use chrono::{Duration, TimeZone, Utc};
    use common::{ErrorKind, FixedClock, PaymentId};
    use event_bus::{InMemoryEventLog, LogPublisher};
    use rust_decimal_macros::dec;

    type TestService = BillingService<
        InMemoryBillingRepository,
        InMemoryCache,
        LogPublisher<InMemoryEventLog>,
    >;

    struct Harness {
        service: TestService,
        cache: InMemoryCache,
        log: InMemoryEventLog,
        clock: FixedClock,
    }

    fn harness() -> Harness {
        let cache = InMemoryCache::new();
        let log = InMemoryEventLog::new();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let service = BillingService::new(
            InMemoryBillingRepository::new(),
            cache.clone(),
            LogPublisher::new(log.clone(), "loans"),
        )
        .with_clock(Arc::new(clock.clone()));
        Harness {
            service,
            cache,
            log,
            clock,
        }
    }

    async fn customer(service: &TestService) -> CustomerId {
        service
            .create_customer(NewCustomer {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: format!("{}@example.com", CustomerId::new()),
                phone_number: "555".into(),
            })
            .await
            .unwrap()
            .customer_id
    }

    fn paid_event(schedule: &ScheduleView) -> PaymentPaidData {
        PaymentPaidData {
            loan_id: schedule.loan_id,
            schedule_id: schedule.schedule_id,
            payment_id: PaymentId::new(),
            payment_status: PaymentStatus::Paid,
            payment_date: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_loan_builds_schedule_and_publishes() {
        let h = harness();
        let customer_id = customer(&h.service).await;

        let view = h
            .service
            .create_loan(customer_id, dec!(5000000))
            .await
            .unwrap();

        assert_eq!(view.loan_amount, dec!(5500000));
        assert_eq!(view.schedules.len(), 50);
        assert!(view.schedules.iter().all(|s| s.payment_amount == dec!(110000)));
        assert_eq!(view.end_date, view.schedules[49].payment_due_date);
        assert_eq!(h.log.record_count("loans").await, 1);
    }

    #[tokio::test]
    async fn create_loan_for_unknown_customer_is_not_found() {
        let h = harness();

        let err = h
            .service
            .create_loan(CustomerId::new(), dec!(1000))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(h.log.record_count("loans").await, 0);
    }

    #[tokio::test]
    async fn create_loan_rejects_non_positive_amount() {
        let h = harness();
        let customer_id = customer(&h.service).await;

        let err = h
            .service
            .create_loan(customer_id, dec!(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn create_loan_rejects_sub_cent_amount() {
        let h = harness();
        let customer_id = customer(&h.service).await;

        let err = h
            .service
            .create_loan(customer_id, dec!(1000.005))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let active = h.service.repository().active_loan(customer_id).await.unwrap();
        assert!(active.is_none());
        assert_eq!(h.log.record_count("loans").await, 0);
    }

    #[tokio::test]
    async fn publish_failure_keeps_loan_and_surfaces_error() {
        let h = harness();
        let customer_id = customer(&h.service).await;
        h.log.set_fail_on_append(true);

        let err = h
            .service
            .create_loan(customer_id, dec!(1000))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::Publish(_)));
        assert_eq!(h.service.repository().loan_count().await, 1);
    }

    #[tokio::test]
    async fn get_schedule_checks_owner() {
        let h = harness();
        let customer_id = customer(&h.service).await;
        let view = h
            .service
            .create_loan(customer_id, dec!(1000))
            .await
            .unwrap();

        let schedule = h
            .service
            .get_schedule(view.loan_id, customer_id)
            .await
            .unwrap();
        assert_eq!(schedule.len(), 50);

        let err = h
            .service
            .get_schedule(view.loan_id, CustomerId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::LoanNotFound(_)));
    }

    #[tokio::test]
    async fn outstanding_is_cached_until_payment_applied() {
        let h = harness();
        let customer_id = customer(&h.service).await;
        let view = h
            .service
            .create_loan(customer_id, dec!(5000000))
            .await
            .unwrap();

        let before = h.service.get_outstanding_balance(customer_id).await.unwrap();
        assert_eq!(before.outstanding_balance, dec!(5500000));
        assert!(h.cache.contains(&format!("outstanding:{customer_id}")).await);

        h.service
            .on_payment_paid(&paid_event(&view.schedules[0]))
            .await
            .unwrap();
        assert!(!h.cache.contains(&format!("outstanding:{customer_id}")).await);
        assert!(!h.cache.contains(&format!("delinquency:{customer_id}")).await);

        let after = h.service.get_outstanding_balance(customer_id).await.unwrap();
        assert_eq!(after.outstanding_balance, dec!(5390000));
    }

    #[tokio::test]
    async fn payment_paid_is_idempotent() {
        let h = harness();
        let customer_id = customer(&h.service).await;
        let view = h
            .service
            .create_loan(customer_id, dec!(5000000))
            .await
            .unwrap();
        let event = paid_event(&view.schedules[3]);

        h.service.on_payment_paid(&event).await.unwrap();
        h.service.get_outstanding_balance(customer_id).await.unwrap();

        // Replay: no state change, cached value survives.
        h.service.on_payment_paid(&event).await.unwrap();
        assert!(h.cache.contains(&format!("outstanding:{customer_id}")).await);
        assert_eq!(
            h.service
                .get_outstanding_balance(customer_id)
                .await
                .unwrap()
                .outstanding_balance,
            dec!(5390000)
        );
    }

    #[tokio::test]
    async fn payment_paid_for_unknown_schedule_is_not_found() {
        let h = harness();
        let event = PaymentPaidData {
            loan_id: LoanId::new(),
            schedule_id: ScheduleId::new(),
            payment_id: PaymentId::new(),
            payment_status: PaymentStatus::Paid,
            payment_date: Utc::now(),
        };

        let err = h.service.on_payment_paid(&event).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn invalidation_failure_is_surfaced() {
        let h = harness();
        let customer_id = customer(&h.service).await;
        let view = h
            .service
            .create_loan(customer_id, dec!(1000))
            .await
            .unwrap();
        h.cache.set_fail_on_delete(true);

        let err = h
            .service
            .on_payment_paid(&paid_event(&view.schedules[0]))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Cache(_)));
    }

    #[tokio::test]
    async fn cache_read_failure_is_surfaced() {
        let h = harness();
        let customer_id = customer(&h.service).await;
        h.cache.set_fail_on_get(true);

        let err = h
            .service
            .get_outstanding_balance(customer_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn delinquency_needs_two_consecutive_overdue_installments() {
        let h = harness();
        let customer_id = customer(&h.service).await;
        let view = h
            .service
            .create_loan(customer_id, dec!(1000))
            .await
            .unwrap();

        // Nothing is due yet.
        assert!(
            !h.service
                .is_customer_delinquent(customer_id)
                .await
                .unwrap()
                .is_delinquent
        );

        // First installment overdue only.
        h.clock
            .set(view.schedules[0].payment_due_date + Duration::days(1));
        h.cache.delete(&format!("delinquency:{customer_id}")).await.unwrap();
        assert!(
            !h.service
                .is_customer_delinquent(customer_id)
                .await
                .unwrap()
                .is_delinquent
        );

        // Installments 1 and 2 overdue.
        h.clock
            .set(view.schedules[1].payment_due_date + Duration::days(1));
        h.cache.delete(&format!("delinquency:{customer_id}")).await.unwrap();
        assert!(
            h.service
                .is_customer_delinquent(customer_id)
                .await
                .unwrap()
                .is_delinquent
        );
    }

    #[tokio::test]
    async fn paid_gap_hides_adjacency() {
        let h = harness();
        let customer_id = customer(&h.service).await;
        let view = h
            .service
            .create_loan(customer_id, dec!(1000))
            .await
            .unwrap();

        // 1 and 3 overdue, 2 paid: not consecutive.
        h.service
            .on_payment_paid(&paid_event(&view.schedules[1]))
            .await
            .unwrap();
        h.clock
            .set(view.schedules[2].payment_due_date + Duration::days(1));

        assert!(
            !h.service
                .is_customer_delinquent(customer_id)
                .await
                .unwrap()
                .is_delinquent
        );
    }

    #[tokio::test]
    async fn customer_without_loan_has_zero_balance() {
        let h = harness();
        let customer_id = customer(&h.service).await;

        let balance = h.service.get_outstanding_balance(customer_id).await.unwrap();
        assert_eq!(balance.outstanding_balance, Decimal::ZERO);
        assert!(
            !h.service
                .is_customer_delinquent(customer_id)
                .await
                .unwrap()
                .is_delinquent
        );
    }

    #[tokio::test]
    async fn derived_values_for_unknown_customer_are_not_found() {
        let h = harness();
        let err = h
            .service
            .get_outstanding_balance(CustomerId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::CustomerNotFound(_)));
        assert!(h.cache.is_empty().await);
    }

    #[tokio::test]
    async fn paying_every_installment_finishes_loan() {
        let h = harness();
        let customer_id = customer(&h.service).await;
        let service = h.service.with_policy(LoanPolicy::new(dec!(0.1), 2));
        let view = service.create_loan(customer_id, dec!(1000)).await.unwrap();

        for schedule in &view.schedules {
            service.on_payment_paid(&paid_event(schedule)).await.unwrap();
        }

        let loan = service
            .repository()
            .find_loan(view.loan_id)
            .await
            .unwrap()
            .unwrap();
        assert!(loan.is_finished);
        assert_eq!(
            service
                .get_outstanding_balance(customer_id)
                .await
                .unwrap()
                .outstanding_balance,
            Decimal::ZERO
        );
    }

    #[tokio::test]
    async fn duplicate_customer_email_already_exists() {
        let h = harness();
        let request = NewCustomer {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            phone_number: "555".into(),
        };
        h.service.create_customer(request.clone()).await.unwrap();

        let err = h.service.create_customer(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(h.service.list_customers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn redelivery_finishes_loan_after_failed_completion() {
        let h = harness();
        let customer_id = customer(&h.service).await;
        let service = h.service.with_policy(LoanPolicy::new(dec!(0.1), 1));
        let view = service.create_loan(customer_id, dec!(1000)).await.unwrap();
        let event = paid_event(&view.schedules[0]);

        service.repository().set_fail_on_finish(true);
        let err = service.on_payment_paid(&event).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);

        service.repository().set_fail_on_finish(false);
        service.on_payment_paid(&event).await.unwrap();

        let loan = service
            .repository()
            .find_loan(view.loan_id)
            .await
            .unwrap()
            .unwrap();
        assert!(loan.is_finished);
        assert!(
            service
                .repository()
                .active_loan(customer_id)
                .await
                .unwrap()
                .is_none()
        );
    }
}
