//! PostgreSQL integration tests for the payment store.
//!
//! These tests need Docker and are ignored by default. Run with:
//!
//! ```bash
//! cargo test -p payment --test postgres_integration -- --ignored
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{AuditStamp, CustomerId, LoanId, PaymentId, PaymentStatus, ScheduleId};
use event_bus::{InMemoryEventLog, LoanCreatedData, LogPublisher, ScheduleSnapshot};
use payment::{
    Payment, PaymentRepository, PaymentRequest, PaymentService, PostgresPaymentRepository,
};
use rust_decimal_macros::dec;
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresPaymentRepository::new(pool.clone())
                .run_migrations()
                .await
                .unwrap();
            pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_repo() -> PostgresPaymentRepository {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE payments, schedule_mirrors, loan_mirrors")
        .execute(&pool)
        .await
        .unwrap();

    PostgresPaymentRepository::new(pool)
}

fn loan_created(entries: u32) -> LoanCreatedData {
    LoanCreatedData {
        loan_id: LoanId::new(),
        customer_id: CustomerId::new(),
        schedules: (1..=entries)
            .map(|no| ScheduleSnapshot {
                schedule_id: ScheduleId::new(),
                payment_no: no,
                payment_due_date: Utc::now(),
                payment_amount: dec!(110000),
                payment_status: PaymentStatus::Pending,
            })
            .collect(),
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn redelivered_loan_created_is_mirrored_once() {
    let repo = get_test_repo().await;
    let service = PaymentService::new(
        repo.clone(),
        LogPublisher::new(InMemoryEventLog::new(), "loan-lifecycle"),
    );
    let event = loan_created(3);

    service.on_loan_created(&event).await.unwrap();
    service.on_loan_created(&event).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schedule_mirrors")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(count, 3);
    assert!(
        repo.customer_has_loan(event.customer_id, event.loan_id)
            .await
            .unwrap()
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn payment_round_trips_and_replays() {
    let repo = get_test_repo().await;
    let service = PaymentService::new(
        repo.clone(),
        LogPublisher::new(InMemoryEventLog::new(), "loan-lifecycle"),
    );
    let event = loan_created(2);
    service.on_loan_created(&event).await.unwrap();

    let request = PaymentRequest {
        customer_id: event.customer_id,
        loan_id: event.loan_id,
        schedule_id: event.schedules[0].schedule_id,
        amount: dec!(110000),
        payment_method: Some("card".into()),
    };
    let first = service.process_payment(request.clone()).await.unwrap();
    let second = service.process_payment(request).await.unwrap();
    assert_eq!(first.payment_id, second.payment_id);

    let stored = repo
        .payment_for_schedule(event.schedules[0].schedule_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.amount_paid, dec!(110000));
    assert_eq!(stored.payment_method, "card");

    let schedule = repo
        .find_schedule(event.loan_id, event.schedules[0].schedule_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(schedule.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn concurrent_payment_loses_atomically() {
    let repo = get_test_repo().await;
    let event = loan_created(1);
    PaymentService::new(
        repo.clone(),
        LogPublisher::new(InMemoryEventLog::new(), "loan-lifecycle"),
    )
    .on_loan_created(&event)
    .await
    .unwrap();

    let payment = |method: &str| Payment {
        payment_id: PaymentId::new(),
        loan_id: event.loan_id,
        schedule_id: event.schedules[0].schedule_id,
        payment_date: Utc::now(),
        amount_paid: dec!(110000),
        payment_method: method.into(),
        payment_status: PaymentStatus::Paid,
        audit: AuditStamp::default(),
    };

    let (first, second) = (payment("a"), payment("b"));
    let (a, b) = tokio::join!(repo.record_payment(&first), repo.record_payment(&second));
    let wins = [a.unwrap(), b.unwrap()].iter().filter(|w| **w).count();
    assert_eq!(wins, 1);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}
