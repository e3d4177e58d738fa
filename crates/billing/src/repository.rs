use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, LoanId, ScheduleId};
use rust_decimal::Decimal;

use crate::Result;
use crate::customer::Customer;
use crate::loan::{Loan, Schedule};

/// Storage port of the billing aggregate.
///
/// Implementations maintain `updated_at` on every update and never delete
/// schedule entries.
#[async_trait]
pub trait BillingRepository: Send + Sync {
    /// Inserts a customer. Fails with `CustomerAlreadyExists` on a duplicate email.
    async fn create_customer(&self, customer: &Customer) -> Result<()>;

    /// All customers, oldest first.
    async fn list_customers(&self) -> Result<Vec<Customer>>;

    async fn get_customer(&self, customer_id: CustomerId) -> Result<Option<Customer>>;

    /// Inserts a loan and all of its schedule entries atomically.
    async fn create_loan(&self, loan: &Loan) -> Result<()>;

    /// Loan with its schedule, only if it belongs to `customer_id`.
    async fn get_loan(&self, loan_id: LoanId, customer_id: CustomerId) -> Result<Option<Loan>>;

    /// Loan with its schedule, regardless of owner.
    async fn find_loan(&self, loan_id: LoanId) -> Result<Option<Loan>>;

    /// The most recently started loan of the customer that is not finished.
    async fn active_loan(&self, customer_id: CustomerId) -> Result<Option<Loan>>;

    /// Entries of a loan that are pending or flagged as missed and due
    /// strictly before `until`, ordered by `payment_no`.
    async fn overdue_schedules(&self, loan_id: LoanId, until: DateTime<Utc>)
    -> Result<Vec<Schedule>>;

    /// Sum of the amounts of the loan's pending entries.
    async fn outstanding_amount(&self, loan_id: LoanId) -> Result<Decimal>;

    /// Whether the loan still has pending entries.
    async fn has_unpaid_schedules(&self, loan_id: LoanId) -> Result<bool>;

    async fn get_schedule(&self, schedule_id: ScheduleId) -> Result<Option<Schedule>>;

    /// Persists the status and missed flag of an existing entry.
    async fn update_schedule(&self, schedule: &Schedule) -> Result<()>;

    async fn mark_loan_finished(&self, loan_id: LoanId, now: DateTime<Utc>) -> Result<()>;
}
