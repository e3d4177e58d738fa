//! Payment aggregate operations.

use std::sync::Arc;

use common::{
    AMOUNT_SCALE, AuditStamp, Clock, PaymentId, PaymentStatus, SystemClock, fits_amount_scale,
};
use event_bus::{EventPublisher, LendingEvent, LoanCreatedData, PaymentPaidData};
use rust_decimal::Decimal;

use crate::model::{
    DEFAULT_PAYMENT_METHOD, LoanMirror, Payment, PaymentReceipt, PaymentRequest, ScheduleMirror,
};
use crate::repository::PaymentRepository;
use crate::{PaymentError, Result};

/// Owns loan mirrors and payments.
///
/// Mirrors are built from `LoanCreated`; every accepted payment is announced
/// with `PaymentPaid` so billing can mark the installment paid.
pub struct PaymentService<R, P> {
    repo: R,
    publisher: P,
    clock: Arc<dyn Clock>,
}

impl<R, P> PaymentService<R, P>
where
    R: PaymentRepository,
    P: EventPublisher,
{
    pub fn new(repo: R, publisher: P) -> Self {
        Self {
            repo,
            publisher,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Mirrors a newly created loan. Redelivered events are no-ops.
    #[tracing::instrument(skip(self, event), fields(loan_id = %event.loan_id))]
    pub async fn on_loan_created(&self, event: &LoanCreatedData) -> Result<()> {
        let now = self.clock.now();
        let loan = LoanMirror {
            loan_id: event.loan_id,
            customer_id: event.customer_id,
            audit: AuditStamp::at(now),
        };
        let schedules: Vec<ScheduleMirror> = event
            .schedules
            .iter()
            .map(|s| ScheduleMirror {
                schedule_id: s.schedule_id,
                loan_id: event.loan_id,
                payment_no: s.payment_no,
                payment_due_date: s.payment_due_date,
                payment_amount: s.payment_amount,
                payment_status: s.payment_status,
                audit: AuditStamp::at(now),
            })
            .collect();

        if !self.repo.create_loan_mirror(&loan, &schedules).await? {
            tracing::debug!("Loan already mirrored, skipping");
            return Ok(());
        }

        metrics::counter!("payment_mirrors_created_total").increment(1);
        tracing::info!(installments = schedules.len(), "Loan mirrored");
        Ok(())
    }

    /// Pays one installment and announces it.
    ///
    /// Paying an installment that already has a payment returns that payment
    /// and announces it again, so a publish failure can be retried by the caller.
    #[tracing::instrument(
        skip(self, request),
        fields(loan_id = %request.loan_id, schedule_id = %request.schedule_id)
    )]
    pub async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentReceipt> {
        if request.amount <= Decimal::ZERO {
            return Err(PaymentError::InvalidInput("amount must be positive".into()));
        }
        if !fits_amount_scale(request.amount) {
            return Err(PaymentError::InvalidInput(format!(
                "amount has more than {AMOUNT_SCALE} decimal places"
            )));
        }

        if !self
            .repo
            .customer_has_loan(request.customer_id, request.loan_id)
            .await?
        {
            return Err(PaymentError::LoanNotFound {
                customer_id: request.customer_id,
                loan_id: request.loan_id,
            });
        }

        let schedule = self
            .repo
            .find_schedule(request.loan_id, request.schedule_id)
            .await?
            .ok_or(PaymentError::ScheduleNotFound {
                loan_id: request.loan_id,
                schedule_id: request.schedule_id,
            })?;

        let payment = if schedule.payment_status.can_pay() {
            let now = self.clock.now();
            let payment = Payment {
                payment_id: PaymentId::new(),
                loan_id: request.loan_id,
                schedule_id: request.schedule_id,
                payment_date: now,
                amount_paid: request.amount,
                payment_method: request
                    .payment_method
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string()),
                payment_status: PaymentStatus::Paid,
                audit: AuditStamp::at(now),
            };

            if self.repo.record_payment(&payment).await? {
                metrics::counter!("payments_processed_total").increment(1);
                tracing::info!(payment_id = %payment.payment_id, "Payment recorded");
                payment
            } else {
                // Lost a race with a concurrent payment for the same entry.
                self.existing_payment(&schedule).await?
            }
        } else {
            self.existing_payment(&schedule).await?
        };

        let event = LendingEvent::PaymentPaid(PaymentPaidData {
            loan_id: payment.loan_id,
            schedule_id: payment.schedule_id,
            payment_id: payment.payment_id,
            payment_status: payment.payment_status,
            payment_date: payment.payment_date,
        });

        if let Err(e) = self.publisher.publish(&event).await {
            tracing::error!(
                payment_id = %payment.payment_id,
                error = %e,
                "Payment recorded but PaymentPaid was not published"
            );
            return Err(e.into());
        }

        Ok(PaymentReceipt::from(&payment))
    }

    async fn existing_payment(&self, schedule: &ScheduleMirror) -> Result<Payment> {
        let payment = self
            .repo
            .payment_for_schedule(schedule.schedule_id)
            .await?
            .ok_or(PaymentError::AlreadyPaid(schedule.schedule_id))?;

        tracing::debug!(payment_id = %payment.payment_id, "Installment already paid, replaying");
        Ok(payment)
    }
}
