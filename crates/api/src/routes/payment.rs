//! Payment service endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use event_bus::EventPublisher;
use payment::{PaymentReceipt, PaymentRepository, PaymentRequest, PaymentService};

use crate::error::ApiError;

/// Shared payment state accessible from all handlers.
pub type PaymentState<R, P> = Arc<PaymentService<R, P>>;

/// POST /payment: Pay one installment.
#[tracing::instrument(skip(service, payload))]
pub async fn create_payment<R, P>(
    State(service): State<PaymentState<R, P>>,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Json<PaymentReceipt>, ApiError>
where
    R: PaymentRepository + 'static,
    P: EventPublisher + 'static,
{
    let Json(request) = payload?;
    Ok(Json(service.process_payment(request).await?))
}

/// Payment routes bound to `service`.
pub fn router<R, P>(service: PaymentState<R, P>) -> Router
where
    R: PaymentRepository + 'static,
    P: EventPublisher + 'static,
{
    Router::new()
        .route("/payment", post(create_payment::<R, P>))
        .with_state(service)
}
