//! Billing error types.

use cache::CacheError;
use common::{CustomerId, ErrorKind, LoanId, ScheduleId};
use event_bus::BusError;
use thiserror::Error;

/// Errors that can occur during billing operations.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Customer not found.
    #[error("Customer not found: {0}")]
    CustomerNotFound(CustomerId),

    /// Loan not found.
    #[error("Loan not found: {0}")]
    LoanNotFound(LoanId),

    /// Schedule entry not found.
    #[error("Schedule not found: {0}")]
    ScheduleNotFound(ScheduleId),

    /// A customer with this email already exists.
    #[error("Customer with email {0} already exists")]
    CustomerAlreadyExists(String),

    /// The request was rejected before touching any state.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Cache error.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// The local write succeeded but the event could not be published.
    #[error("Event publish error: {0}")]
    Publish(#[from] BusError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BillingError {
    /// Classifies the error for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BillingError::CustomerNotFound(_)
            | BillingError::LoanNotFound(_)
            | BillingError::ScheduleNotFound(_) => ErrorKind::NotFound,
            BillingError::CustomerAlreadyExists(_) => ErrorKind::AlreadyExists,
            BillingError::InvalidInput(_) => ErrorKind::InvalidInput,
            BillingError::Database(_)
            | BillingError::Cache(_)
            | BillingError::Publish(_)
            | BillingError::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// Convenience type alias for billing results.
pub type Result<T> = std::result::Result<T, BillingError>;
