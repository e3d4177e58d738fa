//! HTTP services for the lending platform.
//!
//! The billing service exposes customers, loans and derived balances; the
//! payment service accepts installment payments. Both expose `/health` and
//! Prometheus `/metrics`, with structured logging through tracing.

pub mod config;
pub mod error;
pub mod routes;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use billing::{BillingRepository, BillingService};
use cache::Cache;
use event_bus::EventPublisher;
use metrics_exporter_prometheus::PrometheusHandle;
use payment::{PaymentRepository, PaymentService};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::ApiError;
pub use telemetry::{init_tracing, shutdown_signal};

/// Creates the billing service router with all routes and shared state.
pub fn create_billing_app<R, C, P>(
    service: Arc<BillingService<R, C, P>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    R: BillingRepository + 'static,
    C: Cache + Clone + 'static,
    P: EventPublisher + 'static,
{
    with_layers(
        routes::billing::router(service)
            .merge(routes::health::router("billing"))
            .merge(routes::metrics::router(metrics_handle)),
    )
}

/// Creates the payment service router with all routes and shared state.
pub fn create_payment_app<R, P>(
    service: Arc<PaymentService<R, P>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    R: PaymentRepository + 'static,
    P: EventPublisher + 'static,
{
    with_layers(
        routes::payment::router(service)
            .merge(routes::health::router("payment"))
            .merge(routes::metrics::router(metrics_handle)),
    )
}

fn with_layers(router: Router) -> Router {
    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
