use async_trait::async_trait;
use common::{AuditStamp, CustomerId, LoanId, PaymentId, PaymentStatus, ScheduleId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::Result;
use crate::model::{LoanMirror, Payment, ScheduleMirror};
use crate::repository::PaymentRepository;

const SCHEDULE_COLUMNS: &str = "schedule_id, loan_id, payment_no, payment_due_date, payment_amount, payment_status, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "payment_id, loan_id, schedule_id, payment_date, amount_paid, payment_method, payment_status, created_at, updated_at";

/// PostgreSQL-backed payment store.
#[derive(Clone)]
pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the payment schema migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        let mut migrator = sqlx::migrate!("../../migrations/payment");
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await
    }

    fn parse_status(row: &PgRow) -> Result<PaymentStatus> {
        let status: String = row.try_get("payment_status")?;
        let parsed = status
            .parse::<PaymentStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(parsed)
    }

    fn row_to_schedule(row: PgRow) -> Result<ScheduleMirror> {
        let payment_status = Self::parse_status(&row)?;
        let payment_no: i32 = row.try_get("payment_no")?;

        Ok(ScheduleMirror {
            schedule_id: ScheduleId::from_uuid(row.try_get::<Uuid, _>("schedule_id")?),
            loan_id: LoanId::from_uuid(row.try_get::<Uuid, _>("loan_id")?),
            payment_no: payment_no as u32,
            payment_due_date: row.try_get("payment_due_date")?,
            payment_amount: row.try_get("payment_amount")?,
            payment_status,
            audit: AuditStamp {
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            },
        })
    }

    fn row_to_payment(row: PgRow) -> Result<Payment> {
        let payment_status = Self::parse_status(&row)?;

        Ok(Payment {
            payment_id: PaymentId::from_uuid(row.try_get::<Uuid, _>("payment_id")?),
            loan_id: LoanId::from_uuid(row.try_get::<Uuid, _>("loan_id")?),
            schedule_id: ScheduleId::from_uuid(row.try_get::<Uuid, _>("schedule_id")?),
            payment_date: row.try_get("payment_date")?,
            amount_paid: row.try_get("amount_paid")?,
            payment_method: row.try_get("payment_method")?,
            payment_status,
            audit: AuditStamp {
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            },
        })
    }
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn create_loan_mirror(
        &self,
        loan: &LoanMirror,
        schedules: &[ScheduleMirror],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO loan_mirrors (loan_id, customer_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (loan_id) DO NOTHING
            "#,
        )
        .bind(loan.loan_id.as_uuid())
        .bind(loan.customer_id.as_uuid())
        .bind(loan.audit.created_at)
        .bind(loan.audit.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for schedule in schedules {
            sqlx::query(
                r#"
                INSERT INTO schedule_mirrors (schedule_id, loan_id, payment_no, payment_due_date, payment_amount, payment_status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(schedule.schedule_id.as_uuid())
            .bind(loan.loan_id.as_uuid())
            .bind(schedule.payment_no as i32)
            .bind(schedule.payment_due_date)
            .bind(schedule.payment_amount)
            .bind(schedule.payment_status.as_str())
            .bind(schedule.audit.created_at)
            .bind(schedule.audit.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn customer_has_loan(&self, customer_id: CustomerId, loan_id: LoanId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM loan_mirrors WHERE loan_id = $1 AND customer_id = $2)",
        )
        .bind(loan_id.as_uuid())
        .bind(customer_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn find_schedule(
        &self,
        loan_id: LoanId,
        schedule_id: ScheduleId,
    ) -> Result<Option<ScheduleMirror>> {
        let row = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedule_mirrors WHERE schedule_id = $1 AND loan_id = $2"
        ))
        .bind(schedule_id.as_uuid())
        .bind(loan_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_schedule).transpose()
    }

    async fn record_payment(&self, payment: &Payment) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE schedule_mirrors
            SET payment_status = 'PAID', updated_at = $2
            WHERE schedule_id = $1 AND payment_status = 'PENDING'
            "#,
        )
        .bind(payment.schedule_id.as_uuid())
        .bind(payment.audit.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO payments (payment_id, loan_id, schedule_id, payment_date, amount_paid, payment_method, payment_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(payment.payment_id.as_uuid())
        .bind(payment.loan_id.as_uuid())
        .bind(payment.schedule_id.as_uuid())
        .bind(payment.payment_date)
        .bind(payment.amount_paid)
        .bind(&payment.payment_method)
        .bind(payment.payment_status.as_str())
        .bind(payment.audit.created_at)
        .bind(payment.audit.updated_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(ref db_err))
                if db_err.constraint() == Some("unique_payment_schedule") =>
            {
                tx.rollback().await?;
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn payment_for_schedule(&self, schedule_id: ScheduleId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE schedule_id = $1"
        ))
        .bind(schedule_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }
}
