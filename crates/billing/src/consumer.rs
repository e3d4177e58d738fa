use async_trait::async_trait;
use cache::Cache;
use event_bus::{EventHandler, EventPublisher, HandlerError, LendingEvent};

use crate::repository::BillingRepository;
use crate::service::BillingService;

/// Billing reacts to payments made through the payment service.
#[async_trait]
impl<R, C, P> EventHandler for BillingService<R, C, P>
where
    R: BillingRepository,
    C: Cache + Clone,
    P: EventPublisher,
{
    fn name(&self) -> &'static str {
        "billing"
    }

    async fn handle(&self, event: LendingEvent) -> Result<(), HandlerError> {
        match event {
            LendingEvent::PaymentPaid(data) => self.on_payment_paid(&data).await?,
            LendingEvent::LoanCreated(data) => {
                tracing::debug!(loan_id = %data.loan_id, "Ignoring own LoanCreated event");
            }
        }
        Ok(())
    }
}
