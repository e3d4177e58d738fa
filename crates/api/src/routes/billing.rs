//! Billing service endpoints: customers, loans, schedules and derived balances.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use billing::{
    BillingRepository, BillingService, Customer, DelinquencyStatus, LoanView, NewCustomer,
    OutstandingBalance, ScheduleView,
};
use cache::Cache;
use common::{CustomerId, LoanId};
use event_bus::EventPublisher;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ApiError;

/// Shared billing state accessible from all handlers.
pub type BillingState<R, C, P> = Arc<BillingService<R, C, P>>;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateLoanRequest {
    pub customer_id: CustomerId,
    pub loan_amount: Decimal,
}

#[derive(Deserialize)]
pub struct ScheduleQuery {
    pub loan_id: LoanId,
    pub customer_id: CustomerId,
}

// -- Handlers --

/// POST /customer: Onboard a customer.
#[tracing::instrument(skip(service, payload))]
pub async fn create_customer<R, C, P>(
    State(service): State<BillingState<R, C, P>>,
    payload: Result<Json<NewCustomer>, JsonRejection>,
) -> Result<(StatusCode, Json<Customer>), ApiError>
where
    R: BillingRepository + 'static,
    C: Cache + Clone + 'static,
    P: EventPublisher + 'static,
{
    let Json(request) = payload?;
    let customer = service.create_customer(request).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

/// GET /customer: List customers.
#[tracing::instrument(skip(service))]
pub async fn list_customers<R, C, P>(
    State(service): State<BillingState<R, C, P>>,
) -> Result<Json<Vec<Customer>>, ApiError>
where
    R: BillingRepository + 'static,
    C: Cache + Clone + 'static,
    P: EventPublisher + 'static,
{
    Ok(Json(service.list_customers().await?))
}

/// POST /loan: Create a loan with its schedule.
#[tracing::instrument(skip(service, payload))]
pub async fn create_loan<R, C, P>(
    State(service): State<BillingState<R, C, P>>,
    payload: Result<Json<CreateLoanRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LoanView>), ApiError>
where
    R: BillingRepository + 'static,
    C: Cache + Clone + 'static,
    P: EventPublisher + 'static,
{
    let Json(request) = payload?;
    let loan = service
        .create_loan(request.customer_id, request.loan_amount)
        .await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// GET /loan/schedule?loan_id&customer_id: Schedule of a customer's loan.
#[tracing::instrument(skip(service, query))]
pub async fn get_schedule<R, C, P>(
    State(service): State<BillingState<R, C, P>>,
    query: Result<Query<ScheduleQuery>, QueryRejection>,
) -> Result<Json<Vec<ScheduleView>>, ApiError>
where
    R: BillingRepository + 'static,
    C: Cache + Clone + 'static,
    P: EventPublisher + 'static,
{
    let Query(query) = query?;
    let schedule = service
        .get_schedule(query.loan_id, query.customer_id)
        .await?;
    Ok(Json(schedule))
}

/// GET /customer/{id}/delinquent
#[tracing::instrument(skip(service))]
pub async fn delinquent<R, C, P>(
    State(service): State<BillingState<R, C, P>>,
    Path(id): Path<String>,
) -> Result<Json<DelinquencyStatus>, ApiError>
where
    R: BillingRepository + 'static,
    C: Cache + Clone + 'static,
    P: EventPublisher + 'static,
{
    let customer_id = parse_customer_id(&id)?;
    Ok(Json(service.is_customer_delinquent(customer_id).await?))
}

/// GET /customer/{id}/outstanding
#[tracing::instrument(skip(service))]
pub async fn outstanding<R, C, P>(
    State(service): State<BillingState<R, C, P>>,
    Path(id): Path<String>,
) -> Result<Json<OutstandingBalance>, ApiError>
where
    R: BillingRepository + 'static,
    C: Cache + Clone + 'static,
    P: EventPublisher + 'static,
{
    let customer_id = parse_customer_id(&id)?;
    Ok(Json(service.get_outstanding_balance(customer_id).await?))
}

/// Billing routes bound to `service`.
pub fn router<R, C, P>(service: BillingState<R, C, P>) -> Router
where
    R: BillingRepository + 'static,
    C: Cache + Clone + 'static,
    P: EventPublisher + 'static,
{
    Router::new()
        .route(
            "/customer",
            post(create_customer::<R, C, P>).get(list_customers::<R, C, P>),
        )
        .route("/customer/{id}/delinquent", get(delinquent::<R, C, P>))
        .route("/customer/{id}/outstanding", get(outstanding::<R, C, P>))
        .route("/loan", post(create_loan::<R, C, P>))
        .route("/loan/schedule", get(get_schedule::<R, C, P>))
        .with_state(service)
}

fn parse_customer_id(id: &str) -> Result<CustomerId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid customer id: {e}")))
}
