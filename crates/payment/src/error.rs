//! Payment error types.

use common::{CustomerId, ErrorKind, LoanId, ScheduleId};
use event_bus::BusError;
use thiserror::Error;

/// Errors that can occur during payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// No mirrored loan matches the customer and loan.
    #[error("Loan {loan_id} not found for customer {customer_id}")]
    LoanNotFound {
        customer_id: CustomerId,
        loan_id: LoanId,
    },

    /// No mirrored schedule entry matches the loan and schedule.
    #[error("Schedule {schedule_id} not found for loan {loan_id}")]
    ScheduleNotFound {
        loan_id: LoanId,
        schedule_id: ScheduleId,
    },

    /// The schedule entry is paid but no payment record exists for it.
    #[error("Schedule {0} is already paid")]
    AlreadyPaid(ScheduleId),

    /// The request was rejected before touching any state.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The local write succeeded but the event could not be published.
    #[error("Event publish error: {0}")]
    Publish(#[from] BusError),
}

impl PaymentError {
    /// Classifies the error for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::LoanNotFound { .. } | PaymentError::ScheduleNotFound { .. } => {
                ErrorKind::NotFound
            }
            PaymentError::AlreadyPaid(_) => ErrorKind::AlreadyExists,
            PaymentError::InvalidInput(_) => ErrorKind::InvalidInput,
            PaymentError::Database(_) | PaymentError::Publish(_) => ErrorKind::Internal,
        }
    }
}

/// Convenience type alias for payment results.
pub type Result<T> = std::result::Result<T, PaymentError>;
