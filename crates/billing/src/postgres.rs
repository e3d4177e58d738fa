use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AuditStamp, CustomerId, LoanId, PaymentStatus, ScheduleId};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::customer::Customer;
use crate::loan::{Loan, Schedule};
use crate::repository::BillingRepository;
use crate::{BillingError, Result};

const LOAN_COLUMNS: &str = "loan_id, customer_id, principal_amount, interest_rate, start_date, end_date, is_finished, created_at, updated_at";

const SCHEDULE_COLUMNS: &str = "schedule_id, loan_id, payment_no, payment_due_date, payment_amount, payment_status, is_missed_payment, created_at, updated_at";

/// PostgreSQL-backed billing store.
#[derive(Clone)]
pub struct PostgresBillingRepository {
    pool: PgPool,
}

impl PostgresBillingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the billing schema migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        let mut migrator = sqlx::migrate!("../../migrations/billing");
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await
    }

    fn row_to_customer(row: PgRow) -> Result<Customer> {
        Ok(Customer {
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            phone_number: row.try_get("phone_number")?,
            audit: AuditStamp {
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            },
        })
    }

    fn row_to_loan(row: PgRow, schedules: Vec<Schedule>) -> Result<Loan> {
        Ok(Loan {
            loan_id: LoanId::from_uuid(row.try_get::<Uuid, _>("loan_id")?),
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            principal_amount: row.try_get("principal_amount")?,
            interest_rate: row.try_get("interest_rate")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            is_finished: row.try_get("is_finished")?,
            schedules,
            audit: AuditStamp {
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            },
        })
    }

    fn row_to_schedule(row: PgRow) -> Result<Schedule> {
        let status: String = row.try_get("payment_status")?;
        let payment_status: PaymentStatus = status
            .parse()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let payment_no: i32 = row.try_get("payment_no")?;

        Ok(Schedule {
            schedule_id: ScheduleId::from_uuid(row.try_get::<Uuid, _>("schedule_id")?),
            loan_id: LoanId::from_uuid(row.try_get::<Uuid, _>("loan_id")?),
            payment_no: payment_no as u32,
            payment_due_date: row.try_get("payment_due_date")?,
            payment_amount: row.try_get("payment_amount")?,
            payment_status,
            is_missed_payment: row.try_get("is_missed_payment")?,
            audit: AuditStamp {
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            },
        })
    }

    async fn load_schedules(&self, loan_id: LoanId) -> Result<Vec<Schedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM loan_schedules WHERE loan_id = $1 ORDER BY payment_no ASC"
        ))
        .bind(loan_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_schedule).collect()
    }

    async fn with_schedules(&self, row: Option<PgRow>) -> Result<Option<Loan>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let loan_id = LoanId::from_uuid(row.try_get::<Uuid, _>("loan_id")?);
        let schedules = self.load_schedules(loan_id).await?;
        Self::row_to_loan(row, schedules).map(Some)
    }
}

#[async_trait]
impl BillingRepository for PostgresBillingRepository {
    async fn create_customer(&self, customer: &Customer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (customer_id, first_name, last_name, email, phone_number, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(customer.customer_id.as_uuid())
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(&customer.email)
        .bind(&customer.phone_number)
        .bind(customer.audit.created_at)
        .bind(customer.audit.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_customer_email")
            {
                return BillingError::CustomerAlreadyExists(customer.email.clone());
            }
            BillingError::Database(e)
        })?;

        Ok(())
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        let rows = sqlx::query(
            r#"
            SELECT customer_id, first_name, last_name, email, phone_number, created_at, updated_at
            FROM customers
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_customer).collect()
    }

    async fn get_customer(&self, customer_id: CustomerId) -> Result<Option<Customer>> {
        let row = sqlx::query(
            r#"
            SELECT customer_id, first_name, last_name, email, phone_number, created_at, updated_at
            FROM customers
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_customer).transpose()
    }

    async fn create_loan(&self, loan: &Loan) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO loans (loan_id, customer_id, principal_amount, interest_rate, start_date, end_date, is_finished, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(loan.loan_id.as_uuid())
        .bind(loan.customer_id.as_uuid())
        .bind(loan.principal_amount)
        .bind(loan.interest_rate)
        .bind(loan.start_date)
        .bind(loan.end_date)
        .bind(loan.is_finished)
        .bind(loan.audit.created_at)
        .bind(loan.audit.updated_at)
        .execute(&mut *tx)
        .await?;

        for schedule in &loan.schedules {
            sqlx::query(
                r#"
                INSERT INTO loan_schedules (schedule_id, loan_id, payment_no, payment_due_date, payment_amount, payment_status, is_missed_payment, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(schedule.schedule_id.as_uuid())
            .bind(loan.loan_id.as_uuid())
            .bind(schedule.payment_no as i32)
            .bind(schedule.payment_due_date)
            .bind(schedule.payment_amount)
            .bind(schedule.payment_status.as_str())
            .bind(schedule.is_missed_payment)
            .bind(schedule.audit.created_at)
            .bind(schedule.audit.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_loan(&self, loan_id: LoanId, customer_id: CustomerId) -> Result<Option<Loan>> {
        let row = sqlx::query(&format!(
            "SELECT {LOAN_COLUMNS} FROM loans WHERE loan_id = $1 AND customer_id = $2"
        ))
        .bind(loan_id.as_uuid())
        .bind(customer_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        self.with_schedules(row).await
    }

    async fn find_loan(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        let row = sqlx::query(&format!("SELECT {LOAN_COLUMNS} FROM loans WHERE loan_id = $1"))
            .bind(loan_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        self.with_schedules(row).await
    }

    async fn active_loan(&self, customer_id: CustomerId) -> Result<Option<Loan>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {LOAN_COLUMNS}
            FROM loans
            WHERE customer_id = $1 AND is_finished = FALSE
            ORDER BY start_date DESC, created_at DESC
            LIMIT 1
            "#
        ))
        .bind(customer_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        self.with_schedules(row).await
    }

    async fn overdue_schedules(
        &self,
        loan_id: LoanId,
        until: DateTime<Utc>,
    ) -> Result<Vec<Schedule>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SCHEDULE_COLUMNS}
            FROM loan_schedules
            WHERE loan_id = $1
              AND (payment_status = 'PENDING' OR is_missed_payment = TRUE)
              AND payment_due_date < $2
            ORDER BY payment_no ASC
            "#
        ))
        .bind(loan_id.as_uuid())
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_schedule).collect()
    }

    async fn outstanding_amount(&self, loan_id: LoanId) -> Result<Decimal> {
        let amount: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(payment_amount), 0) FROM loan_schedules WHERE loan_id = $1 AND payment_status = 'PENDING'",
        )
        .bind(loan_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(amount)
    }

    async fn has_unpaid_schedules(&self, loan_id: LoanId) -> Result<bool> {
        let unpaid: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM loan_schedules WHERE loan_id = $1 AND payment_status = 'PENDING')",
        )
        .bind(loan_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(unpaid)
    }

    async fn get_schedule(&self, schedule_id: ScheduleId) -> Result<Option<Schedule>> {
        let row = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM loan_schedules WHERE schedule_id = $1"
        ))
        .bind(schedule_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_schedule).transpose()
    }

    async fn update_schedule(&self, schedule: &Schedule) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE loan_schedules
            SET payment_status = $2, is_missed_payment = $3, updated_at = $4
            WHERE schedule_id = $1
            "#,
        )
        .bind(schedule.schedule_id.as_uuid())
        .bind(schedule.payment_status.as_str())
        .bind(schedule.is_missed_payment)
        .bind(schedule.audit.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::ScheduleNotFound(schedule.schedule_id));
        }
        Ok(())
    }

    async fn mark_loan_finished(&self, loan_id: LoanId, now: DateTime<Utc>) -> Result<()> {
        let result =
            sqlx::query("UPDATE loans SET is_finished = TRUE, updated_at = $2 WHERE loan_id = $1")
                .bind(loan_id.as_uuid())
                .bind(now)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::LoanNotFound(loan_id));
        }
        Ok(())
    }
}
