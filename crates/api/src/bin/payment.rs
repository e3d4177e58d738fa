//! Payment service entry point.

use std::sync::Arc;

use api::config::{Config, PAYMENT_PORT};
use event_bus::{EventConsumer, LogPublisher, PostgresEventLog};
use payment::{PaymentService, PostgresPaymentRepository};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let config = Config::from_env(PAYMENT_PORT);

    api::init_tracing(&config);

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to payment database");
    let repo = PostgresPaymentRepository::new(pool);
    repo.run_migrations()
        .await
        .expect("payment migrations failed");

    let log_pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.event_log_database_url)
        .await
        .expect("failed to connect to event log database");
    let log = PostgresEventLog::new(log_pool, config.event_partitions);
    log.run_migrations()
        .await
        .expect("event log migrations failed");

    let publisher = LogPublisher::new(log.clone(), config.payment_topic.as_str())
        .with_timeout(config.publish_timeout);
    let service = Arc::new(PaymentService::new(repo, publisher));

    // Mirror loans from LoanCreated events until shutdown.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = EventConsumer::new(log, config.consumer_config("payment", &config.loan_topic));
    let handler = service.clone();
    let consumer_task = tokio::spawn(async move {
        if let Err(e) = consumer.run(&handler, shutdown_rx).await {
            tracing::error!(error = %e, "payment consumer stopped");
        }
    });

    let app = api::create_payment_app(service, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting payment service");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(api::shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    if let Err(e) = consumer_task.await {
        tracing::error!(error = %e, "payment consumer task panicked");
    }

    tracing::info!("payment service shut down gracefully");
}
