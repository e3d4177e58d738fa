use async_trait::async_trait;
use event_bus::{EventHandler, EventPublisher, HandlerError, LendingEvent};

use crate::repository::PaymentRepository;
use crate::service::PaymentService;

/// Payment mirrors loans announced by the billing service.
#[async_trait]
impl<R, P> EventHandler for PaymentService<R, P>
where
    R: PaymentRepository,
    P: EventPublisher,
{
    fn name(&self) -> &'static str {
        "payment"
    }

    async fn handle(&self, event: LendingEvent) -> Result<(), HandlerError> {
        match event {
            LendingEvent::LoanCreated(data) => self.on_loan_created(&data).await?,
            LendingEvent::PaymentPaid(data) => {
                tracing::debug!(payment_id = %data.payment_id, "Ignoring own PaymentPaid event");
            }
        }
        Ok(())
    }
}
