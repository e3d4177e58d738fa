//! Billing service entry point.

use std::sync::Arc;

use api::config::{BILLING_PORT, Config};
use billing::{BillingService, PostgresBillingRepository};
use cache::InMemoryCache;
use event_bus::{EventConsumer, LogPublisher, PostgresEventLog};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let config = Config::from_env(BILLING_PORT);

    // 1. Initialize tracing
    api::init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Connect stores and run migrations
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to billing database");
    let repo = PostgresBillingRepository::new(pool);
    repo.run_migrations()
        .await
        .expect("billing migrations failed");

    let log_pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.event_log_database_url)
        .await
        .expect("failed to connect to event log database");
    let log = PostgresEventLog::new(log_pool, config.event_partitions);
    log.run_migrations()
        .await
        .expect("event log migrations failed");

    // 4. Wire the service
    let publisher =
        LogPublisher::new(log.clone(), config.loan_topic.as_str()).with_timeout(config.publish_timeout);
    let service = Arc::new(
        BillingService::new(repo, InMemoryCache::new(), publisher)
            .with_policy(config.loan_policy)
            .with_cache_ttl(config.cache_ttl),
    );

    // 5. Consume PaymentPaid events until shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = EventConsumer::new(
        log,
        config.consumer_config("billing", &config.payment_topic),
    );
    let handler = service.clone();
    let consumer_task = tokio::spawn(async move {
        if let Err(e) = consumer.run(&handler, shutdown_rx).await {
            tracing::error!(error = %e, "billing consumer stopped");
        }
    });

    // 6. Start server
    let app = api::create_billing_app(service, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting billing service");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(api::shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    if let Err(e) = consumer_task.await {
        tracing::error!(error = %e, "billing consumer task panicked");
    }

    tracing::info!("billing service shut down gracefully");
}
